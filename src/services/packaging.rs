//! Mod packaging: `.flatdata` archives, `desc.addpack`, `readme.txt` and the
//! `.gt2extension` container.
//!
//! Packaging is a small state machine kept in the shared [`StateManager`]:
//!
//! ```text
//! Idle --generate_mod_files--> FilesGenerated --create_distributable--> ArchiveCreated
//! ```
//!
//! Archive building is all-or-nothing: every archive is built in staging and the
//! manifest and readme are staged next to their targets before anything in the
//! project changes. Only then are the manifest, the readme and the archives put in
//! place, in that order.
//!
//! [`StateManager`]: crate::state::StateManager

use crate::models::assets::{
    AAF_EXT, LOC_DEF_SOUND_SUFFIX, TEXTURE_EXT, strip_suffix_ignore_case,
};
use crate::models::project::README_FILE_NAME;
use crate::models::{
    ArchiveCategory, LogicalFolder, PackagingJob, PackagingStage, PreparedAsset, PreparedKind,
    ProjectPaths,
};
use crate::services::PipelineContext;
use crate::services::fs_ops;
use crate::services::gateway::{ProcessRunner, StarterCommand, ToolRunner};
use crate::services::layout::{self, LayoutError};
use crate::services::manifest;
use crate::services::report::ItemError;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};
use std::fs;
use std::io;
use tempfile::NamedTempFile;
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DISTRIBUTABLE_EXT: &str = "gt2extension";

#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("no prepared assets selected")]
    EmptySelection,

    #[error("mod {field} must not be empty")]
    InvalidMetadata { field: &'static str },

    #[error("required input is missing: {0}")]
    MissingInputs(Utf8PathBuf),

    #[error("{path} is not a {kind} asset: {kind} assets come from {folder}")]
    KindMismatch {
        path: Utf8PathBuf,
        kind: PreparedKind,
        folder: LogicalFolder,
    },

    #[error("building {category} archive failed: {source}")]
    ArchiveBuildFailed {
        category: ArchiveCategory,
        #[source]
        source: ItemError,
    },

    #[error("two selected {category} assets would both be packed as {name}")]
    DuplicateAssetName {
        category: ArchiveCategory,
        name: String,
    },

    #[error("cannot {operation} while packaging is {stage}")]
    WrongState {
        operation: &'static str,
        stage: PackagingStage,
    },

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write container {path}: {source}")]
    Container {
        path: Utf8PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error(transparent)]
    Workspace(#[from] LayoutError),
}

impl PackagingError {
    fn io(path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        PackagingError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Files written by [`PackagingEngine::generate_mod_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub manifest: Utf8PathBuf,
    pub readme: Utf8PathBuf,
    pub archives: Vec<Utf8PathBuf>,
    /// The game install had no manifest stencil and the built-in one was used.
    pub used_builtin_template: bool,
}

/// One asset as it is copied into a staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedAsset {
    source: Utf8PathBuf,
    staged_name: String,
}

impl StagedAsset {
    /// `.aaf` files go back to the `.loc_def.sound` name the archive format expects.
    fn from_prepared(asset: &PreparedAsset) -> Self {
        let name = asset.file_name();
        let staged_name = match strip_suffix_ignore_case(name, AAF_EXT) {
            Some(base) => format!("{}{}", base, LOC_DEF_SOUND_SUFFIX),
            None => name.to_string(),
        };
        Self {
            source: asset.path().to_path_buf(),
            staged_name,
        }
    }

    fn flatlist_entry(&self) -> &str {
        let name = self.staged_name.as_str();
        strip_suffix_ignore_case(name, LOC_DEF_SOUND_SUFFIX)
            .or_else(|| strip_suffix_ignore_case(name, TEXTURE_EXT))
            .unwrap_or(name)
    }
}

/// `.!flatlist` content for one archive.
fn render_flatlist(category: ArchiveCategory, assets: &[StagedAsset]) -> String {
    let mut content = String::from("i_unflat:unflat()\n{\n");
    for asset in assets {
        content.push_str(&format!(
            "    {}\t, {}\t, loc_def ;\n",
            asset.flatlist_entry(),
            category.flatlist_type()
        ));
    }
    content.push_str("}\n");
    content
}

/// Archive built in staging, not yet moved into the project.
struct BuiltArchive {
    category: ArchiveCategory,
    staging_dir: Utf8PathBuf,
    output: Utf8PathBuf,
}

/// `dest` with the container extension, or a default file name inside `dest` when it is a directory.
pub fn distributable_path(dest: &Utf8Path, mod_name: &str) -> Utf8PathBuf {
    if dest.is_dir() {
        return dest.join(format!(
            "{}.{}",
            manifest::sanitize_mod_name(mod_name),
            DISTRIBUTABLE_EXT
        ));
    }
    let has_ext = dest
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DISTRIBUTABLE_EXT));
    if has_ext {
        dest.to_path_buf()
    } else {
        dest.with_extension(DISTRIBUTABLE_EXT)
    }
}

/// The asset's kind must match the prepared folder it sits in, and its name must be
/// packable as that kind.
fn check_kind(paths: &ProjectPaths, asset: &PreparedAsset) -> Result<(), PackagingError> {
    let folder = asset.kind.folder();
    let in_folder = asset.path().parent() == Some(paths.folder(folder).as_path());
    if in_folder && asset.kind.accepts(asset.file_name()) {
        Ok(())
    } else {
        Err(PackagingError::KindMismatch {
            path: asset.path().to_path_buf(),
            kind: asset.kind,
            folder,
        })
    }
}

pub struct PackagingEngine<R = ProcessRunner> {
    ctx: PipelineContext<R>,
}

impl<R: ToolRunner> PackagingEngine<R> {
    pub fn new(ctx: PipelineContext<R>) -> Self {
        Self { ctx }
    }

    pub fn stage(&self) -> PackagingStage {
        self.ctx.state.packaging_stage()
    }

    /// Build the archives for the selected assets, then write the manifest and readme.
    pub async fn generate_mod_files(
        &mut self,
        job: &PackagingJob,
    ) -> Result<GeneratedFiles, PackagingError> {
        if job.selected_assets.is_empty() {
            return Err(PackagingError::EmptySelection);
        }
        if let Some(field) = job.metadata.blank_field() {
            return Err(PackagingError::InvalidMetadata { field });
        }
        let metadata = job.metadata.trimmed();

        for asset in &job.selected_assets {
            check_kind(&self.ctx.paths, asset)?;
        }
        if let Some(missing) = job.selected_assets.iter().find(|a| !a.path().is_file()) {
            return Err(PackagingError::MissingInputs(missing.path().to_path_buf()));
        }

        let groups = group_by_category(&job.selected_assets)?;
        let paths = &self.ctx.paths;
        let packed_data = paths.folder(LogicalFolder::PackedData);
        layout::ensure_dir(&packed_data)?;
        layout::ensure_game_workdir(paths)?;

        tracing::info!(
            "Packaging {} asset(s) into {} archive(s) for '{}'",
            job.selected_assets.len(),
            groups.len(),
            metadata.name
        );

        let mut built = Vec::new();
        for (category, assets) in &groups {
            self.ctx.state.set_current_item(category.archive_file_name());
            match self.build_archive(*category, assets).await {
                Ok(archive) => built.push(archive),
                Err(source) => {
                    tracing::error!("Building {} failed: {}", category.archive_file_name(), source);
                    self.ctx.record_failure(&category.archive_file_name(), &source);
                    discard_built(&built);
                    return Err(PackagingError::ArchiveBuildFailed {
                        category: *category,
                        source,
                    });
                }
            }
        }

        let manifest_path = paths.folder(LogicalFolder::Manifest);
        let (template, used_builtin_template) = match manifest::load_template(&paths.manifest_template()) {
            Ok(Some(template)) => (template, false),
            Ok(None) => {
                tracing::info!("No manifest stencil in the game install, using the built-in one");
                (manifest::BUILTIN_MANIFEST_TEMPLATE.to_string(), true)
            }
            Err(e) => {
                tracing::warn!("Could not read manifest stencil, using the built-in one: {}", e);
                (manifest::BUILTIN_MANIFEST_TEMPLATE.to_string(), true)
            }
        };
        let content = manifest::render_manifest(&template, &metadata);
        let readme_path = paths.folder(LogicalFolder::Readme);
        let readme = manifest::readme_for(&readme_path, &metadata);

        let staged = fs_ops::stage_file(&manifest_path, content.as_bytes())
            .map_err(|e| PackagingError::io(manifest_path.as_path(), e))
            .and_then(|manifest_file| {
                fs_ops::stage_file(&readme_path, readme.as_bytes())
                    .map(|readme_file| (manifest_file, readme_file))
                    .map_err(|e| PackagingError::io(readme_path.as_path(), e))
            });
        let (manifest_file, readme_file) = match staged {
            Ok(files) => files,
            Err(e) => {
                discard_built(&built);
                return Err(e);
            }
        };

        let published = manifest_file
            .persist(&manifest_path)
            .map_err(|e| PackagingError::io(manifest_path.as_path(), e.error))
            .and_then(|_| {
                tracing::info!("Wrote {}", manifest_path);
                readme_file
                    .persist(&readme_path)
                    .map_err(|e| PackagingError::io(readme_path.as_path(), e.error))
            });
        if let Err(e) = published {
            tracing::error!("Could not write the mod files: {}", e);
            discard_built(&built);
            return Err(e);
        }
        tracing::info!("Wrote {}", readme_path);

        let archives = self.install_archives(built, &packed_data)?;
        remove_stale_archives(&packed_data, &groups);

        self.ctx.state.mark_files_generated(metadata);

        Ok(GeneratedFiles {
            manifest: manifest_path,
            readme: readme_path,
            archives,
            used_builtin_template,
        })
    }

    async fn build_archive(
        &self,
        category: ArchiveCategory,
        assets: &[StagedAsset],
    ) -> Result<BuiltArchive, ItemError> {
        let staging_dir = fs_ops::unique_scratch_dir(
            &self.ctx.paths.game_modwork(),
            "_mkflat_stage",
            category.stem(),
        );
        fs::create_dir_all(&staging_dir).map_err(|e| ItemError::io(staging_dir.as_path(), e))?;

        match self.stage_and_mkflat(category, assets, &staging_dir).await {
            Ok(output) => Ok(BuiltArchive {
                category,
                staging_dir,
                output,
            }),
            Err(e) => {
                fs_ops::remove_dir_logged(&staging_dir);
                Err(e)
            }
        }
    }

    async fn stage_and_mkflat(
        &self,
        category: ArchiveCategory,
        assets: &[StagedAsset],
        staging_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ItemError> {
        for asset in assets {
            let target = staging_dir.join(&asset.staged_name);
            fs::copy(&asset.source, &target).map_err(|e| ItemError::io(target, e))?;
        }

        let flatlist = staging_dir.join(format!("{}.!flatlist", category.stem()));
        fs::write(&flatlist, render_flatlist(category, assets))
            .map_err(|e| ItemError::io(flatlist.as_path(), e))?;

        let output = staging_dir.join(category.archive_file_name());
        let command = StarterCommand::Mkflat {
            output: output.clone(),
            flatlist,
        };
        self.ctx.gateway.run_starter(&self.ctx.paths, &command).await?;
        Ok(output)
    }

    fn install_archives(
        &self,
        built: Vec<BuiltArchive>,
        packed_data: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, PackagingError> {
        let mut installed = Vec::new();
        let mut failure = None;

        for archive in &built {
            if failure.is_none() {
                let target = packed_data.join(archive.category.archive_file_name());
                match fs_ops::move_into_place(&archive.output, &target) {
                    Ok(()) => {
                        self.ctx.record_success(
                            &archive.category.archive_file_name(),
                            format!("archive written to {}", target),
                        );
                        installed.push(target);
                    }
                    Err(e) => failure = Some(PackagingError::io(target, e)),
                }
            }
            fs_ops::remove_dir_logged(&archive.staging_dir);
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(installed),
        }
    }

    /// Bundle `CORE/` and `readme.txt` into a `.gt2extension` container at `dest`.
    ///
    /// `dest` may be a directory, in which case the file is named after the mod.
    /// Allowed again after a container was created, to export a second copy.
    pub fn create_distributable(&mut self, dest: &Utf8Path) -> Result<Utf8PathBuf, PackagingError> {
        let stage = self.stage();
        if stage == PackagingStage::Idle {
            return Err(PackagingError::WrongState {
                operation: "create the distributable",
                stage,
            });
        }

        let paths = &self.ctx.paths;
        let manifest_path = paths.folder(LogicalFolder::Manifest);
        if !manifest_path.is_file() {
            tracing::error!("{} is missing; generate the mod files again", manifest_path);
            return Err(PackagingError::MissingInputs(manifest_path));
        }

        let Some(metadata) = self.ctx.state.packaging_metadata() else {
            return Err(PackagingError::WrongState {
                operation: "create the distributable without generated mod files",
                stage,
            });
        };
        let destination = distributable_path(dest, &metadata.name);

        let readme_path = paths.folder(LogicalFolder::Readme);
        if !readme_path.is_file() {
            tracing::warn!("{} disappeared, writing it again", readme_path);
            let readme = manifest::readme_for(&readme_path, &metadata);
            fs_ops::write_atomic(&readme_path, readme.as_bytes())
                .map_err(|e| PackagingError::io(readme_path.as_path(), e))?;
        }

        write_container(
            &destination,
            paths.mod_project_dir(),
            &paths.folder(LogicalFolder::Core),
            &readme_path,
        )?;

        tracing::info!("Mod container created: {}", destination);
        self.ctx.record_success(destination.as_str(), "container written".to_string());
        self.ctx.state.set_packaging_stage(PackagingStage::ArchiveCreated);
        Ok(destination)
    }
}

fn discard_built(built: &[BuiltArchive]) {
    for archive in built {
        fs_ops::remove_dir_logged(&archive.staging_dir);
    }
}

/// Drop archives left by earlier runs for categories this job did not build, so
/// the container only carries what was selected.
fn remove_stale_archives(
    packed_data: &Utf8Path,
    built: &IndexMap<ArchiveCategory, Vec<StagedAsset>>,
) {
    for category in ArchiveCategory::ALL {
        if built.contains_key(&category) {
            continue;
        }
        let stale = packed_data.join(category.archive_file_name());
        if !stale.is_file() {
            continue;
        }
        match fs::remove_file(&stale) {
            Ok(()) => tracing::info!("Removed {} from an earlier build", stale),
            Err(e) => tracing::warn!("Could not remove old archive {}: {}", stale, e),
        }
    }
}

fn group_by_category(
    assets: &[PreparedAsset],
) -> Result<IndexMap<ArchiveCategory, Vec<StagedAsset>>, PackagingError> {
    let unique: IndexSet<&PreparedAsset> = assets.iter().collect();
    let mut groups: IndexMap<ArchiveCategory, Vec<StagedAsset>> = IndexMap::new();

    for asset in unique {
        let category = asset.kind.category();
        let staged = StagedAsset::from_prepared(asset);
        let group = groups.entry(category).or_default();
        if group
            .iter()
            .any(|other| other.staged_name.eq_ignore_ascii_case(&staged.staged_name))
        {
            return Err(PackagingError::DuplicateAssetName {
                category,
                name: staged.staged_name,
            });
        }
        group.push(staged);
    }

    Ok(groups)
}

/// Zip `core_dir` (as `CORE/...`) and the readme into `destination` through a sibling temp file.
fn write_container(
    destination: &Utf8Path,
    project_dir: &Utf8Path,
    core_dir: &Utf8Path,
    readme: &Utf8Path,
) -> Result<(), PackagingError> {
    let dir = fs_ops::parent_dir(destination);
    fs::create_dir_all(dir).map_err(|e| PackagingError::io(dir, e))?;
    let temp = NamedTempFile::new_in(dir).map_err(|e| PackagingError::io(dir, e))?;

    let container_err = |source| PackagingError::Container {
        path: destination.to_path_buf(),
        source,
    };
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(temp);

    for entry in WalkDir::new(core_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PackagingError::io(core_dir, e.into()))?;
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            tracing::warn!("Skipping non UTF-8 path {}", entry.path().display());
            continue;
        };
        let name = archive_entry_name(path, project_dir);

        if entry.file_type().is_dir() {
            writer.add_directory(name, options).map_err(container_err)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options).map_err(container_err)?;
            let mut file = fs::File::open(path).map_err(|e| PackagingError::io(path, e))?;
            io::copy(&mut file, &mut writer).map_err(|e| PackagingError::io(path, e))?;
        }
    }

    writer
        .start_file(README_FILE_NAME, options)
        .map_err(container_err)?;
    let mut file = fs::File::open(readme).map_err(|e| PackagingError::io(readme, e))?;
    io::copy(&mut file, &mut writer).map_err(|e| PackagingError::io(readme, e))?;

    let temp = writer.finish().map_err(container_err)?;
    temp.as_file()
        .sync_all()
        .map_err(|e| PackagingError::io(destination, e))?;
    temp.persist(destination)
        .map_err(|e| PackagingError::io(destination, e.error))?;
    Ok(())
}

/// Forward-slash entry name of `path` relative to the project directory.
fn archive_entry_name(path: &Utf8Path, project_dir: &Utf8Path) -> String {
    let relative = fs_ops::relative_to(path, project_dir);
    relative
        .components()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("/")
}
