//! Filesystem helpers shared by the pipeline stages.
//!
//! Anything a reader could observe half-written (manifest, readme, lists, archives,
//! the container) goes through a temp file in the destination directory that is
//! persisted over the final path in one rename.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Write};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Directory a file lives in, `.` for bare file names.
pub fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

/// `path` expressed relative to `base`, climbing with `..` when it lies outside.
///
/// The external tool only accepts paths relative to the game root.
pub fn relative_to(path: &Utf8Path, base: &Utf8Path) -> Utf8PathBuf {
    if let Ok(stripped) = path.strip_prefix(base) {
        return stripped.to_path_buf();
    }

    let path_parts: Vec<_> = path.components().collect();
    let base_parts: Vec<_> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = Utf8PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_str());
    }
    relative
}

/// Write `contents` to a temp file next to `path` without touching `path` itself.
///
/// Dropping the returned file discards it; `persist(path)` publishes it.
pub fn stage_file(path: &Utf8Path, contents: &[u8]) -> io::Result<NamedTempFile> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Write `contents` to `path` via a sibling temp file.
pub fn write_atomic(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    stage_file(path, contents)?
        .persist(path)
        .map_err(|e| e.error)?;
    Ok(())
}

/// Move `src` over `dst`, replacing it.
///
/// Falls back to copy-then-persist when a plain rename is refused (another volume,
/// or an existing target on Windows), so `dst` is never seen partially written.
pub fn move_into_place(src: &Utf8Path, dst: &Utf8Path) -> io::Result<()> {
    let dir = parent_dir(dst);
    fs::create_dir_all(dir)?;

    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let mut temp = NamedTempFile::new_in(dir)?;
    let mut reader = fs::File::open(src)?;
    io::copy(&mut reader, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(dst).map_err(|e| e.error)?;
    fs::remove_file(src)
}

/// Fresh, not yet created, scratch directory path under `root`.
pub fn unique_scratch_dir(root: &Utf8Path, prefix: &str, base: &str) -> Utf8PathBuf {
    root.join(format!("{}_{}_{}", prefix, base, Uuid::new_v4().simple()))
}

/// Remove a directory tree, logging instead of failing.
pub fn remove_dir_logged(dir: &Utf8Path) {
    if !dir.exists() {
        return;
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => tracing::debug!("Removed scratch directory {}", dir),
        Err(e) => tracing::warn!("Could not remove scratch directory {}: {}", dir, e),
    }
}

/// Remove `dir` if it exists and holds nothing.
pub fn remove_dir_if_empty(dir: &Utf8Path) -> io::Result<bool> {
    if !dir.is_dir() || fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir)?;
    Ok(true)
}

/// Regular files directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty list. Names that are not valid UTF-8 are
/// skipped with a warning, since they could not be passed to the tool anyway.
pub fn list_files(dir: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match Utf8PathBuf::try_from(entry.path()) {
            Ok(path) => files.push(path),
            Err(e) => tracing::warn!("Skipping non UTF-8 file name in {}: {}", dir, e),
        }
    }
    files.sort();
    Ok(files)
}
