use crate::models::assets::{
    AAF_EXT, DDS_EXT, LOC_DEF_SOUND_SUFFIX, SOUND_EXT, TEXTURE_EXT, has_suffix_ignore_case,
    strip_suffix_ignore_case,
};
use crate::models::{AssetKind, ExtractedAsset, ProjectPaths};
use crate::services::fs_ops;
use crate::services::gateway::{ProcessRunner, StarterCommand, ToolError, ToolRunner};
use crate::services::layout::{self, LayoutError};
use crate::services::report::{ItemError, ItemFailure};
use crate::services::PipelineContext;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use std::fs;
use std::io;
use thiserror::Error;

/// Localisation folders searched after `shared/`, in order.
const LOCALIZATION_FOLDERS: [&str; 4] = ["loc_eng", "loc_rus", "loc_ger", "loc_def"];
const SPEECH_LANGUAGES: [&str; 3] = ["eng", "rus", "ger"];

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("no archives selected")]
    EmptySelection,

    #[error("none of the {} selected archives could be extracted", failures.len())]
    AllArchivesFailed { failures: Vec<ItemFailure> },

    #[error("extraction cancelled before any archive finished")]
    Cancelled,

    #[error("external tool is unavailable: {0}")]
    ToolUnavailable(#[source] ToolError),

    #[error(transparent)]
    Workspace(#[from] LayoutError),
}

/// Outcome of one extraction batch.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Files recorded in the project, in processing order.
    pub assets: Vec<ExtractedAsset>,
    /// Archives that unpacked successfully.
    pub succeeded: Vec<String>,
    /// Archives that failed as a whole.
    pub failures: Vec<ItemFailure>,
    /// Individual files that failed inside otherwise successful archives.
    pub file_failures: Vec<ItemFailure>,
    /// Archives never started because of cancellation.
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl ExtractionReport {
    fn into_result(self) -> Result<Self, ExtractionError> {
        if !self.succeeded.is_empty() {
            return Ok(self);
        }
        if self.cancelled {
            Err(ExtractionError::Cancelled)
        } else {
            Err(ExtractionError::AllArchivesFailed {
                failures: self.failures,
            })
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ArchiveJob {
    Textures { delete_originals: bool },
    Sounds { delete_temp_folders: bool },
}

/// Replace a trailing `.loc_def.sound` (any case) with `.aaf`, keeping the rest of the name.
pub fn rename_loc_def_sound(name: &str) -> String {
    match strip_suffix_ignore_case(name, LOC_DEF_SOUND_SUFFIX) {
        Some(prefix) => format!("{}{}", prefix, AAF_EXT),
        None => name.to_string(),
    }
}

fn is_sound_file(name: &str) -> bool {
    [LOC_DEF_SOUND_SUFFIX, SOUND_EXT, AAF_EXT]
        .iter()
        .any(|ext| has_suffix_ignore_case(name, ext))
}

/// `tex_main` for `tex_main.flatdata`.
pub fn archive_base_name(archive: &str) -> &str {
    Utf8Path::new(archive).file_stem().unwrap_or(archive)
}

/// Where an archive may live, most preferred first.
///
/// `shared/packed_data` always comes first. Speech archives then try their own
/// language folder (`speech_eng` tries `loc_eng`) and `loc_def` before the others.
pub fn archive_candidates(paths: &ProjectPaths, archive: &str) -> Vec<Utf8PathBuf> {
    let mut folders: Vec<String> = Vec::new();

    let lower = archive_base_name(archive).to_ascii_lowercase();
    if lower.contains("speech") {
        let language = lower.replace("speech_", "");
        if SPEECH_LANGUAGES.contains(&language.as_str()) {
            folders.push(format!("loc_{}", language));
        }
        folders.push("loc_def".to_string());
    }
    for folder in LOCALIZATION_FOLDERS {
        if !folders.iter().any(|f| f == folder) {
            folders.push(folder.to_string());
        }
    }

    let data = paths.game_data();
    std::iter::once(paths.game_shared_packed_data().join(archive))
        .chain(
            folders
                .iter()
                .map(|folder| data.join(folder).join("packed_data").join(archive)),
        )
        .collect()
}

fn locate_archive(paths: &ProjectPaths, archive: &str) -> Result<Utf8PathBuf, ItemError> {
    let candidates = archive_candidates(paths, archive);
    match candidates.iter().find(|candidate| candidate.is_file()) {
        Some(found) => {
            tracing::debug!("Found {} at {}", archive, found);
            Ok(found.clone())
        }
        None => Err(ItemError::ArchiveNotFound {
            searched: candidates,
        }),
    }
}

/// Save the displayable inventory (one `<archive>/<file>` per line).
pub fn write_inventory(assets: &[ExtractedAsset], path: &Utf8Path) -> io::Result<()> {
    let mut content = String::new();
    for asset in assets {
        content.push_str(&asset.relative_path);
        content.push('\n');
    }
    fs_ops::write_atomic(path, content.as_bytes())?;
    tracing::info!("Saved {} inventory entries to {}", assets.len(), path);
    Ok(())
}

/// Unpacks game archives into the project's `extracted_game_*` folders.
pub struct AssetExtractor<R = ProcessRunner> {
    ctx: PipelineContext<R>,
}

impl<R: ToolRunner> AssetExtractor<R> {
    pub fn new(ctx: PipelineContext<R>) -> Self {
        Self { ctx }
    }

    /// Unpack each archive, copy its `.texture` files to `atf/<archive>/` and
    /// convert them to `dds/<archive>/`.
    ///
    /// With `delete_originals`, the `.texture` copies whose conversion succeeded are
    /// removed again (and an emptied `atf/<archive>/` with them).
    pub async fn extract_textures(
        &self,
        archive_names: &[String],
        delete_originals: bool,
    ) -> Result<ExtractionReport, ExtractionError> {
        self.run(archive_names, ArchiveJob::Textures { delete_originals })
            .await
    }

    /// Unpack each archive and copy its sound files to `extracted_game_sounds/<archive>/`,
    /// storing every `.loc_def.sound` as `.aaf`.
    ///
    /// The unpack directory of a successful archive is removed when
    /// `delete_temp_folders` is set; a failed archive always keeps it for inspection.
    pub async fn extract_sounds(
        &self,
        archive_names: &[String],
        delete_temp_folders: bool,
    ) -> Result<ExtractionReport, ExtractionError> {
        self.run(archive_names, ArchiveJob::Sounds { delete_temp_folders })
            .await
    }

    async fn run(
        &self,
        archive_names: &[String],
        job: ArchiveJob,
    ) -> Result<ExtractionReport, ExtractionError> {
        let selection: IndexSet<&str> = archive_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect();
        if selection.is_empty() {
            return Err(ExtractionError::EmptySelection);
        }

        layout::ensure_game_workdir(&self.ctx.paths)?;
        tracing::info!("Extracting {} archive(s): {:?}", selection.len(), selection);

        let mut report = ExtractionReport::default();
        for (index, &archive) in selection.iter().enumerate() {
            if self.ctx.cancel.is_cancelled() {
                report.cancelled = true;
                for &rest in selection.iter().skip(index) {
                    self.ctx.record_skipped(rest);
                    report.skipped.push(rest.to_string());
                }
                break;
            }

            self.ctx.state.set_current_item(archive);
            let result = match job {
                ArchiveJob::Textures { delete_originals } => {
                    self.extract_texture_archive(archive, delete_originals, &mut report.file_failures)
                        .await
                }
                ArchiveJob::Sounds { delete_temp_folders } => {
                    self.extract_sound_archive(archive, delete_temp_folders, &mut report.file_failures)
                        .await
                }
            };

            match result {
                Ok(assets) => {
                    self.ctx
                        .record_success(archive, format!("{} file(s) extracted", assets.len()));
                    report.succeeded.push(archive.to_string());
                    report.assets.extend(assets);
                }
                Err(ItemError::Tool(error)) if error.is_unreachable() => {
                    tracing::error!("Aborting extraction: {}", error);
                    return Err(ExtractionError::ToolUnavailable(error));
                }
                Err(error) => {
                    self.ctx.record_failure(archive, &error);
                    report.failures.push(ItemFailure::new(archive, error));
                }
            }
        }

        tracing::info!(
            "Extraction finished: {} archive(s) ok, {} failed, {} file failure(s), {} asset(s)",
            report.succeeded.len(),
            report.failures.len(),
            report.file_failures.len(),
            report.assets.len()
        );
        report.into_result()
    }

    async fn extract_texture_archive(
        &self,
        archive: &str,
        delete_originals: bool,
        file_failures: &mut Vec<ItemFailure>,
    ) -> Result<Vec<ExtractedAsset>, ItemError> {
        let source = locate_archive(&self.ctx.paths, archive)?;
        let base = archive_base_name(archive);
        let scratch =
            fs_ops::unique_scratch_dir(&self.ctx.paths.game_modwork(), "_temp_unflat_tex", base);

        let result = self
            .convert_unpacked_textures(archive, base, &source, &scratch, delete_originals, file_failures)
            .await;
        fs_ops::remove_dir_logged(&scratch);
        result
    }

    async fn convert_unpacked_textures(
        &self,
        archive: &str,
        base: &str,
        source: &Utf8Path,
        scratch: &Utf8Path,
        delete_originals: bool,
        file_failures: &mut Vec<ItemFailure>,
    ) -> Result<Vec<ExtractedAsset>, ItemError> {
        let paths = &self.ctx.paths;
        self.unflat(source, scratch).await?;

        let atf_dir = paths.extracted_atf_dir(base);
        let dds_dir = paths.extracted_dds_dir(base);
        for dir in [&atf_dir, &dds_dir] {
            fs::create_dir_all(dir).map_err(|e| ItemError::io(dir.as_path(), e))?;
        }

        let textures: Vec<Utf8PathBuf> = fs_ops::list_files(scratch)
            .map_err(|e| ItemError::io(scratch, e))?
            .into_iter()
            .filter(|path| path.file_name().is_some_and(|n| has_suffix_ignore_case(n, TEXTURE_EXT)))
            .collect();
        if textures.is_empty() {
            tracing::info!("No .texture files found in {}", archive);
        }

        let mut assets = Vec::new();
        let mut converted_copies = Vec::new();

        for texture in textures {
            let name = texture.file_name().unwrap_or(texture.as_str()).to_string();
            let item = format!("{}/{}", base, name);

            let atf_copy = atf_dir.join(&name);
            if let Err(e) = fs::copy(&texture, &atf_copy) {
                tracing::warn!("Could not copy {} into the project: {}", item, e);
                file_failures.push(ItemFailure::new(item, ItemError::io(atf_copy, e)));
                continue;
            }

            let stem = strip_suffix_ignore_case(&name, TEXTURE_EXT).unwrap_or(&name);
            let dds_name = format!("{}{}", stem, DDS_EXT);
            let scratch_dds = scratch.join(&dds_name);
            let command = StarterCommand::Atf2Dds {
                source: texture.clone(),
                target: scratch_dds.clone(),
            };
            match self.ctx.gateway.run_starter(paths, &command).await {
                Ok(_) => {}
                Err(error) if error.is_unreachable() => return Err(error.into()),
                Err(error) => {
                    tracing::warn!("Converting {} failed: {}", item, error);
                    file_failures.push(ItemFailure::new(item, error.into()));
                    continue;
                }
            }

            let dds_target = dds_dir.join(&dds_name);
            if let Err(e) = fs::copy(&scratch_dds, &dds_target) {
                tracing::warn!("Could not copy converted {} into the project: {}", dds_name, e);
                file_failures.push(ItemFailure::new(item, ItemError::io(dds_target, e)));
                continue;
            }

            assets.push(ExtractedAsset {
                relative_path: format!("{}/{}", base, dds_name),
                kind: AssetKind::Texture,
                source_archive: archive.to_string(),
            });
            converted_copies.push(atf_copy);
        }

        if delete_originals {
            for copy in &converted_copies {
                if let Err(e) = fs::remove_file(copy) {
                    tracing::warn!("Could not delete {}: {}", copy, e);
                }
            }
            match fs_ops::remove_dir_if_empty(&atf_dir) {
                Ok(true) => tracing::debug!("Removed empty {}", atf_dir),
                Ok(false) => {}
                Err(e) => tracing::warn!("Could not remove {}: {}", atf_dir, e),
            }
        }

        Ok(assets)
    }

    async fn extract_sound_archive(
        &self,
        archive: &str,
        delete_temp_folders: bool,
        file_failures: &mut Vec<ItemFailure>,
    ) -> Result<Vec<ExtractedAsset>, ItemError> {
        let source = locate_archive(&self.ctx.paths, archive)?;
        let base = archive_base_name(archive);
        let scratch =
            fs_ops::unique_scratch_dir(&self.ctx.paths.game_modwork(), "_temp_unflat_sound", base);

        let result = self
            .copy_unpacked_sounds(archive, base, &source, &scratch, file_failures)
            .await;

        match (&result, delete_temp_folders) {
            (Ok(_), true) => fs_ops::remove_dir_logged(&scratch),
            (Ok(_), false) => tracing::info!("Kept temporary unpack directory {}", scratch),
            (Err(_), _) if scratch.exists() => {
                tracing::warn!("Left unpack directory {} for inspection", scratch)
            }
            (Err(_), _) => {}
        }
        result
    }

    async fn copy_unpacked_sounds(
        &self,
        archive: &str,
        base: &str,
        source: &Utf8Path,
        scratch: &Utf8Path,
        file_failures: &mut Vec<ItemFailure>,
    ) -> Result<Vec<ExtractedAsset>, ItemError> {
        self.unflat(source, scratch).await?;

        let target_dir = self.ctx.paths.extracted_sounds_dir(base);
        fs::create_dir_all(&target_dir).map_err(|e| ItemError::io(target_dir.as_path(), e))?;

        let mut assets = Vec::new();
        for file in fs_ops::list_files(scratch).map_err(|e| ItemError::io(scratch, e))? {
            let Some(name) = file.file_name() else { continue };
            if !is_sound_file(name) {
                continue;
            }

            let stored_name = rename_loc_def_sound(name);
            let target = target_dir.join(&stored_name);
            if let Err(e) = fs::copy(&file, &target) {
                tracing::warn!("Could not copy {}/{} into the project: {}", base, name, e);
                file_failures.push(ItemFailure::new(
                    format!("{}/{}", base, name),
                    ItemError::io(target, e),
                ));
                continue;
            }
            if stored_name != name {
                tracing::debug!("Stored {} as {}", name, stored_name);
            }

            assets.push(ExtractedAsset {
                relative_path: format!("{}/{}", base, stored_name),
                kind: AssetKind::Sound,
                source_archive: archive.to_string(),
            });
        }

        if assets.is_empty() && file_failures.is_empty() {
            tracing::info!("No sound files found in {}", archive);
        }
        Ok(assets)
    }

    async fn unflat(&self, archive: &Utf8Path, output_dir: &Utf8Path) -> Result<(), ItemError> {
        let command = StarterCommand::Unflat {
            archive: archive.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
        };
        self.ctx.gateway.run_starter(&self.ctx.paths, &command).await?;
        if !output_dir.is_dir() {
            return Err(ItemError::io(
                output_dir,
                io::Error::new(io::ErrorKind::NotADirectory, "unpack output is not a directory"),
            ));
        }
        Ok(())
    }
}
