use crate::models::{LegacyIniConfig, ProjectPaths, Settings};
use crate::services::fs_ops;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

pub const SETTINGS_FILE_NAME: &str = "gravipack.yaml";
pub const LEGACY_INI_FILE_NAME: &str = "gt_texture_mod_tool_config.ini";
pub const ENV_PREFIX: &str = "GRAVIPACK";

/// Configuration manager for loading and saving settings.
///
/// Settings are layered: `gravipack.yaml` first, then `GRAVIPACK_*` environment
/// variables (`GRAVIPACK_PATHS__GAME_ROOT`, `GRAVIPACK_TOOL__TIMEOUT_SECS`, ...).
/// When no YAML exists yet, paths are picked up from the legacy ini file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    legacy_ini_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` when needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE_NAME),
            legacy_ini_path: config_dir.join(LEGACY_INI_FILE_NAME),
            config_dir,
        })
    }

    /// Load settings from the YAML file and the process environment.
    pub fn load_settings(&self) -> Result<Settings> {
        self.load_settings_from(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Load settings with an explicit environment source.
    pub fn load_settings_from(&self, environment: Environment) -> Result<Settings> {
        let yaml_exists = self.settings_path.is_file();
        if !yaml_exists {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let merged = Config::builder()
            .add_source(File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let mut settings: Settings = merged
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        if !yaml_exists && self.legacy_ini_path.is_file() {
            self.merge_legacy_paths(&mut settings)?;
        }

        tracing::debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Fill paths still unset from the legacy ini file.
    fn merge_legacy_paths(&self, settings: &mut Settings) -> Result<()> {
        let legacy: LegacyIniConfig = Config::builder()
            .add_source(File::new(self.legacy_ini_path.as_str(), FileFormat::Ini))
            .build()
            .and_then(|merged| merged.try_deserialize::<LegacyIniConfig>())
            .with_context(|| format!("Failed to parse legacy config: {}", self.legacy_ini_path))?;

        let legacy_paths = legacy.paths.into_path_settings();
        if settings.paths.game_root.is_none() {
            settings.paths.game_root = legacy_paths.game_root;
        }
        if settings.paths.mod_project_dir.is_none() {
            settings.paths.mod_project_dir = legacy_paths.mod_project_dir;
        }

        tracing::info!("Using paths from legacy config file: {}", self.legacy_ini_path);
        Ok(())
    }

    /// Save settings as YAML.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs_ops::write_atomic(&self.settings_path, yaml_string.as_bytes())
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

/// Both project roots from `settings`, or an error naming the one that is unset.
pub fn project_paths(settings: &Settings) -> Result<ProjectPaths> {
    let game_root = settings
        .paths
        .game_root
        .clone()
        .context("Game root directory is not configured (paths.game_root)")?;
    let mod_project_dir = settings
        .paths
        .mod_project_dir
        .clone()
        .context("Mod project directory is not configured (paths.mod_project_dir)")?;
    Ok(ProjectPaths::new(game_root, mod_project_dir))
}
