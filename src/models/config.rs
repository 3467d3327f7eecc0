use super::metadata::ModMetadata;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Persisted settings from `gravipack.yaml`, overridable through `GRAVIPACK_*` variables.
///
/// Every section and field falls back to its default when absent, so a partial file
/// (or none at all) always loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub mod_defaults: ModMetadata,
    pub tool: ToolSettings,
    pub extraction: ExtractionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub game_root: Option<Utf8PathBuf>,
    pub mod_project_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Ceiling for conversions and archive builds.
    pub timeout_secs: u64,
    /// Ceiling for unpacking, which is much slower on large archives.
    pub unpack_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            unpack_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub delete_textures_after_conversion: bool,
    pub delete_temp_sound_folders: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            delete_textures_after_conversion: true,
            delete_temp_sound_folders: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub debug: bool,
    pub console: bool,
    pub json: bool,
    pub directory: Utf8PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            debug: false,
            console: true,
            json: false,
            directory: Utf8PathBuf::from("logs"),
        }
    }
}

/// `[Paths]` section of the legacy `gt_texture_mod_tool_config.ini`.
///
/// The ini reader may hand keys back lowercased, so both spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyIniConfig {
    #[serde(rename = "Paths", alias = "paths", default)]
    pub paths: LegacyPaths,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyPaths {
    #[serde(rename = "GameRootDir", alias = "gamerootdir", default)]
    pub game_root_dir: Option<String>,

    #[serde(rename = "ModProjectDir", alias = "modprojectdir", default)]
    pub mod_project_dir: Option<String>,
}

impl LegacyPaths {
    /// Non-empty legacy values as typed paths.
    pub fn into_path_settings(self) -> PathSettings {
        let non_empty = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(Utf8PathBuf::from)
        };
        PathSettings {
            game_root: non_empty(self.game_root_dir),
            mod_project_dir: non_empty(self.mod_project_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.tool.timeout_secs, 120);
        assert_eq!(settings.tool.unpack_timeout_secs, 300);
        assert!(settings.extraction.delete_textures_after_conversion);
        assert!(settings.logging.console);
        assert!(settings.paths.game_root.is_none());
        assert_eq!(settings.mod_defaults.name, "MyMod");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "paths:\n  game_root: /games/gt\ntool:\n  timeout_secs: 30\n";
        let settings: Settings = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(settings.paths.game_root, Some(Utf8PathBuf::from("/games/gt")));
        assert_eq!(settings.tool.timeout_secs, 30);
        assert_eq!(settings.tool.unpack_timeout_secs, 300);
        assert_eq!(settings.mod_defaults.version, "100");
    }

    #[test]
    fn test_legacy_blank_paths_ignored() {
        let legacy = LegacyPaths {
            game_root_dir: Some("C:/Games/Graviteam".to_string()),
            mod_project_dir: Some("   ".to_string()),
        };
        let paths = legacy.into_path_settings();
        assert_eq!(paths.game_root, Some(Utf8PathBuf::from("C:/Games/Graviteam")));
        assert!(paths.mod_project_dir.is_none());
    }
}
