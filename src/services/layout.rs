use crate::models::{LogicalFolder, ModMetadata, ProjectPaths};
use crate::services::{fs_ops, manifest};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("starter.exe not found at {0}; check the game root directory")]
    PathInvalid(Utf8PathBuf),

    #[error("filesystem error at {path}: {source}")]
    IoFailure {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown logical folder name: {0}")]
    UnknownLogicalName(String),
}

/// What [`initialize`] actually had to create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub created_dirs: Vec<Utf8PathBuf>,
    pub readme_created: bool,
}

impl InitReport {
    pub fn is_noop(&self) -> bool {
        self.created_dirs.is_empty() && !self.readme_created
    }
}

/// Provision the project skeleton with a default readme.
pub fn initialize(paths: &ProjectPaths) -> Result<InitReport, LayoutError> {
    initialize_with(paths, &ModMetadata::default())
}

/// Provision the project skeleton; `metadata` only seeds a readme that does not exist yet.
///
/// Safe to repeat: existing folders are left alone and an existing readme is never rewritten.
pub fn initialize_with(paths: &ProjectPaths, metadata: &ModMetadata) -> Result<InitReport, LayoutError> {
    let starter = paths.starter_exe();
    if !starter.is_file() {
        return Err(LayoutError::PathInvalid(starter));
    }

    let mut report = InitReport::default();

    for folder in LogicalFolder::DIRECTORIES {
        let dir = paths.folder(folder);
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(&dir).map_err(|source| LayoutError::IoFailure {
            path: dir.clone(),
            source,
        })?;
        tracing::debug!("Created project folder {}", dir);
        report.created_dirs.push(dir);
    }

    let readme = paths.folder(LogicalFolder::Readme);
    if !readme.exists() {
        let content = manifest::render_readme(metadata, manifest::DEFAULT_DESCRIPTION);
        fs_ops::write_atomic(&readme, content.as_bytes()).map_err(|source| {
            LayoutError::IoFailure {
                path: readme.clone(),
                source,
            }
        })?;
        report.readme_created = true;
        tracing::info!("Created template readme at {}", readme);
    }

    if report.is_noop() {
        tracing::info!("Project at {} already initialized", paths.mod_project_dir());
    } else {
        tracing::info!(
            "Initialized project at {} ({} folders created)",
            paths.mod_project_dir(),
            report.created_dirs.len()
        );
    }

    Ok(report)
}

/// Absolute path for a logical folder name such as `prepared_textures`.
pub fn resolve(paths: &ProjectPaths, logical_name: &str) -> Result<Utf8PathBuf, LayoutError> {
    logical_name
        .parse::<LogicalFolder>()
        .map(|folder| paths.folder(folder))
        .map_err(LayoutError::UnknownLogicalName)
}

/// Make sure the tool's scratch area under the game root exists.
pub fn ensure_game_workdir(paths: &ProjectPaths) -> Result<Utf8PathBuf, LayoutError> {
    let workdir = paths.game_modwork();
    ensure_dir(&workdir)?;
    Ok(workdir)
}

pub(crate) fn ensure_dir(dir: &Utf8Path) -> Result<(), LayoutError> {
    fs::create_dir_all(dir).map_err(|source| LayoutError::IoFailure {
        path: dir.to_path_buf(),
        source,
    })
}
