//! GraviPack - asset pipeline and mod packager for Graviteam games
//!
//! Main entry point for the command-line front end.
//!
//! # Overview
//!
//! Every subcommand runs one pipeline operation. The binary initializes:
//! - Configuration ([`ConfigManager`]): `gravipack.yaml` + `GRAVIPACK_*` overrides
//! - Logging (daily rotated file + console)
//! - A tokio runtime driving a [`PipelineWorker`]
//! - A state listener printing progress from [`StateChange`] events
//!
//! Ctrl-C asks the running operation to stop before its next archive or file; a
//! `starter.exe` call already in flight always finishes.
//!
//! # Execution Flow
//!
//! 1. Load settings, apply `--game-root` / `--project` / `--debug`
//! 2. Initialize logging -> logs/gravipack.<date>
//! 3. Create the tokio runtime, worker and state listener
//! 4. Run the subcommand on the worker
//! 5. Log the metrics summary and shut the runtime down

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use gravipack::config::project_paths;
use gravipack::logging::{LogOptions, setup_logging};
use gravipack::models::assets::{DDS_EXT, TEXTURE_EXT, WAV_EXT};
use gravipack::models::{AssetKind, ModMetadata, Operation, SoundRole, archive_selection};
use gravipack::services::converter::accepts_input;
use gravipack::services::gateway::ToolTimeouts;
use gravipack::services::{
    ConversionReport, ExtractionReport, ItemFailure, PackagingError, fs_ops, layout,
    write_inventory,
};
use gravipack::{
    APP_NAME, AssetConverter, AssetExtractor, AssetRegistry, ConfigManager, PackagingEngine,
    PackagingJob, PipelineContext, PipelineWorker, ProjectPaths, Settings, StateChange,
    StateManager, ToolGateway, VERSION,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gravipack", version)]
#[command(about = "Extract, convert and package mods for Graviteam games", long_about = None)]
struct Cli {
    /// Directory holding gravipack.yaml
    #[arg(long, global = true, env = "GRAVIPACK_CONFIG_DIR", default_value = "GraviPack Data")]
    config_dir: Utf8PathBuf,

    /// Game installation directory (contains starter.exe)
    #[arg(long, global = true)]
    game_root: Option<Utf8PathBuf>,

    /// Mod project directory
    #[arg(long, global = true)]
    project: Option<Utf8PathBuf>,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the given paths and mod defaults to the settings file
    Configure {
        /// Default mod name
        #[arg(long)]
        name: Option<String>,

        /// Default mod author
        #[arg(long)]
        author: Option<String>,

        /// Default mod version
        #[arg(long)]
        mod_version: Option<String>,

        /// Print the resulting settings
        #[arg(long)]
        show: bool,
    },

    /// Create the mod project folders and a template readme
    Init,

    /// Print the known game archives, marking the default selections
    ListArchives,

    /// Unpack texture archives and convert their textures to DDS
    ExtractTextures {
        /// Archive names, e.g. tex_main or tex_main.flatdata (default: tex_main, tex_objects)
        archives: Vec<String>,

        /// Keep the .texture copies after conversion
        #[arg(long)]
        keep_textures: bool,

        /// Save the list of extracted files here
        #[arg(long)]
        list: Option<Utf8PathBuf>,
    },

    /// Unpack sound archives into extracted_game_sounds
    ExtractSounds {
        /// Archive names, e.g. speech_eng or sounds.flatdata (default: sounds, speech)
        archives: Vec<String>,

        /// Keep the temporary unpack directories
        #[arg(long)]
        keep_temp: bool,

        /// Save the list of extracted files here
        #[arg(long)]
        list: Option<Utf8PathBuf>,
    },

    /// Convert .texture files (or folders of them) to .dds in dds_work
    TextureToDds {
        #[arg(required = true)]
        inputs: Vec<Utf8PathBuf>,
    },

    /// Convert .dds files (or folders of them) to .texture in prepared_textures
    DdsToTexture {
        #[arg(required = true)]
        inputs: Vec<Utf8PathBuf>,
    },

    /// Convert .wav files (or folders of them) to .loc_def.sound in prepared_sounds
    WavToSound {
        /// Which prepared folder receives the output
        #[arg(long, value_enum, default_value_t = RoleArg::Sfx)]
        role: RoleArg,

        #[arg(required = true)]
        inputs: Vec<Utf8PathBuf>,
    },

    /// List assets ready for packaging
    ListPrepared,

    /// Build the archives, manifest and readme, then the .gt2extension container
    Package {
        /// Assets to include by file name or label; all prepared assets when omitted
        #[arg(long = "asset")]
        assets: Vec<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        mod_version: Option<String>,

        /// Container path or directory (defaults to the project's parent directory)
        #[arg(long)]
        output: Option<Utf8PathBuf>,

        /// Stop after generating the mod files
        #[arg(long)]
        files_only: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Sfx,
    Speech,
}

impl From<RoleArg> for SoundRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Sfx => SoundRole::Sfx,
            RoleArg::Speech => SoundRole::Speech,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut settings = config_manager.load_settings()?;
    if let Some(game_root) = &cli.game_root {
        settings.paths.game_root = Some(game_root.clone());
    }
    if let Some(project) = &cli.project {
        settings.paths.mod_project_dir = Some(project.clone());
    }
    settings.logging.debug |= cli.debug;

    let _guard = setup_logging(&LogOptions::from_settings(&settings.logging, "gravipack"))?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gravipack-worker")
        .build()?;

    let state = StateManager::new();
    let worker = Arc::new(PipelineWorker::new(runtime.handle().clone(), state.clone()));
    let gateway = ToolGateway::new(ToolTimeouts::from(&settings.tool));
    let metrics = Arc::clone(gateway.metrics());

    let listener = runtime.spawn(print_progress(state.clone()));
    let cancel_worker = Arc::clone(&worker);
    let interrupt = runtime.spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !cancel_worker.request_cancel() {
                tracing::info!("Ctrl-C received with nothing running");
            }
        }
    });

    let result = runtime.block_on(run(
        cli.command,
        settings,
        &config_manager,
        &worker,
        gateway,
    ));

    listener.abort();
    interrupt.abort();
    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    tracing::info!("Shutdown complete");
    result
}

async fn run(
    command: Commands,
    settings: Settings,
    config_manager: &ConfigManager,
    worker: &PipelineWorker,
    gateway: ToolGateway,
) -> Result<()> {
    let context = |paths: ProjectPaths| {
        PipelineContext::new(paths, gateway.clone())
            .with_state(worker.state().clone())
            .with_cancel(worker.cancel_signal())
    };

    match command {
        Commands::Configure {
            name,
            author,
            mod_version,
            show,
        } => {
            let mut updated = settings;
            override_metadata(&mut updated.mod_defaults, name, author, mod_version);
            config_manager.save_settings(&updated)?;
            if show {
                print!("{}", serde_yaml_ng::to_string(&updated)?);
            }
            println!("Settings saved to {}", config_manager.settings_path());
        }

        Commands::Init => {
            let paths = project_paths(&settings)?;
            let report = layout::initialize_with(&paths, &settings.mod_defaults)?;
            if report.is_noop() {
                println!("Project already initialized at {}", paths.mod_project_dir());
            } else {
                println!(
                    "Initialized {} ({} folder(s) created)",
                    paths.mod_project_dir(),
                    report.created_dirs.len()
                );
            }
        }

        Commands::ListPrepared => {
            for asset in AssetRegistry::new(project_paths(&settings)?).scan_prepared() {
                println!("{}", asset);
            }
        }

        Commands::ListArchives => {
            for kind in [AssetKind::Texture, AssetKind::Sound] {
                println!("{} archives:", kind);
                for name in kind.known_archives() {
                    let marker = if kind.default_archives().contains(name) {
                        " (default)"
                    } else {
                        ""
                    };
                    println!("  {}{}", name, marker);
                }
            }
        }

        Commands::ExtractTextures {
            archives,
            keep_textures,
            list,
        } => {
            let archives = archive_selection(AssetKind::Texture, &archives);
            let delete = settings.extraction.delete_textures_after_conversion && !keep_textures;
            let extractor = AssetExtractor::new(context(project_paths(&settings)?));
            let report = worker
                .spawn(Operation::ExtractTextures, archives.len(), async move {
                    extractor.extract_textures(&archives, delete).await
                })?
                .await??;
            finish_extraction(&report, list.as_deref())?;
        }

        Commands::ExtractSounds {
            archives,
            keep_temp,
            list,
        } => {
            let archives = archive_selection(AssetKind::Sound, &archives);
            let delete = settings.extraction.delete_temp_sound_folders && !keep_temp;
            let extractor = AssetExtractor::new(context(project_paths(&settings)?));
            let report = worker
                .spawn(Operation::ExtractSounds, archives.len(), async move {
                    extractor.extract_sounds(&archives, delete).await
                })?
                .await??;
            finish_extraction(&report, list.as_deref())?;
        }

        Commands::TextureToDds { inputs } => {
            let inputs = expand_inputs(&inputs, TEXTURE_EXT)?;
            let converter = AssetConverter::new(context(project_paths(&settings)?));
            let report = worker
                .spawn(Operation::TextureToDds, inputs.len(), async move {
                    converter.texture_to_dds(&inputs).await
                })?
                .await??;
            print_conversion(&report);
        }

        Commands::DdsToTexture { inputs } => {
            let inputs = expand_inputs(&inputs, DDS_EXT)?;
            let converter = AssetConverter::new(context(project_paths(&settings)?));
            let report = worker
                .spawn(Operation::DdsToTexture, inputs.len(), async move {
                    converter.dds_to_texture(&inputs).await
                })?
                .await??;
            print_conversion(&report);
        }

        Commands::WavToSound { role, inputs } => {
            let inputs = expand_inputs(&inputs, WAV_EXT)?;
            let converter = AssetConverter::new(context(project_paths(&settings)?));
            let report = worker
                .spawn(Operation::WavToSound, inputs.len(), async move {
                    converter.wav_to_sound(&inputs, role.into()).await
                })?
                .await??;
            print_conversion(&report);
        }

        Commands::Package {
            assets,
            name,
            author,
            mod_version,
            output,
            files_only,
        } => {
            let paths = project_paths(&settings)?;
            let registry = AssetRegistry::new(paths.clone());
            let selected = if assets.is_empty() {
                registry.scan_prepared()
            } else {
                let (selected, unmatched) = registry.select(&assets);
                if !unmatched.is_empty() {
                    bail!("No prepared asset matches: {}", unmatched.join(", "));
                }
                selected
            };

            let mut metadata = settings.mod_defaults.clone();
            override_metadata(&mut metadata, name, author, mod_version);
            let job = PackagingJob::new(metadata, selected);
            let output = output.unwrap_or_else(|| default_output_dir(&paths));
            let ctx = context(paths);

            let (files, container) = worker
                .spawn(Operation::Packaging, job.selected_assets.len(), async move {
                    let mut engine = PackagingEngine::new(ctx);
                    let files = engine.generate_mod_files(&job).await?;
                    let container = if files_only {
                        None
                    } else {
                        Some(engine.create_distributable(&output)?)
                    };
                    Ok::<_, PackagingError>((files, container))
                })?
                .await??;

            println!("Manifest: {}", files.manifest);
            println!("Readme:   {}", files.readme);
            for archive in &files.archives {
                println!("Archive:  {}", archive);
            }
            if files.used_builtin_template {
                println!("Note: the game has no manifest stencil, the built-in one was used");
            }
            if let Some(container) = container {
                println!("Container: {}", container);
            }
        }
    }

    Ok(())
}

fn override_metadata(
    metadata: &mut ModMetadata,
    name: Option<String>,
    author: Option<String>,
    version: Option<String>,
) {
    if let Some(name) = name {
        metadata.name = name;
    }
    if let Some(author) = author {
        metadata.author = author;
    }
    if let Some(version) = version {
        metadata.version = version;
    }
}

/// The project's parent directory, where the container is saved by default.
fn default_output_dir(paths: &ProjectPaths) -> Utf8PathBuf {
    paths
        .mod_project_dir()
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(paths.mod_project_dir())
        .to_path_buf()
}

/// Files as given, with directories replaced by their files carrying `ext`.
fn expand_inputs(inputs: &[Utf8PathBuf], ext: &str) -> Result<Vec<Utf8PathBuf>> {
    let mut expanded = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let files = fs_ops::list_files(input)
                .with_context(|| format!("Failed to list {}", input))?;
            expanded.extend(files.into_iter().filter(|file| accepts_input(file, ext)));
        } else {
            expanded.push(input.clone());
        }
    }
    if expanded.is_empty() {
        bail!("No {} files found in the given inputs", ext);
    }
    Ok(expanded)
}

fn finish_extraction(report: &ExtractionReport, list: Option<&Utf8Path>) -> Result<()> {
    println!(
        "{} archive(s) extracted, {} failed, {} file(s) recorded",
        report.succeeded.len(),
        report.failures.len(),
        report.assets.len()
    );
    print_failures(&report.failures);
    print_failures(&report.file_failures);
    if report.cancelled {
        println!("Cancelled; not started: {}", report.skipped.join(", "));
    }
    if let Some(list) = list {
        write_inventory(&report.assets, list)
            .with_context(|| format!("Failed to save file list to {}", list))?;
        println!("File list saved to {}", list);
    }
    Ok(())
}

fn print_conversion(report: &ConversionReport) {
    for output in &report.outputs {
        println!("Converted: {}", output);
    }
    print_failures(&report.failures);
    if report.cancelled {
        println!("Cancelled; {} file(s) not started", report.skipped.len());
    }
}

fn print_failures(failures: &[ItemFailure]) {
    for failure in failures {
        println!("Failed: {}", failure);
    }
}

/// Print progress lines until the runtime shuts down.
async fn print_progress(state: StateManager) {
    let mut rx = state.subscribe();
    loop {
        match rx.recv().await {
            Ok(StateChange::ProgressUpdated {
                current,
                total,
                current_item: Some(item),
            }) => println!("[{}/{}] {}", current, total, item),
            Ok(StateChange::CancelRequested) => {
                println!("Cancelling after the current item...")
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Progress listener skipped {} events", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
