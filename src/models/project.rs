use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::str::FromStr;

/// File name of the game's command-line utility, located directly under the game root.
pub const STARTER_EXE_NAME: &str = "starter.exe";

/// Readme written at the mod project root and bundled into the distributable.
pub const README_FILE_NAME: &str = "readme.txt";

/// Manifest file consumed by the game's mod installer, located under `CORE/`.
pub const MANIFEST_FILE_NAME: &str = "desc.addpack";

/// Manifest template shipped with the game (relative to the game root).
const MANIFEST_TEMPLATE_REL: &str = "docs/modwork/stencil/desc_example.addpack.engcfg2";

/// Scratch area the external tool writes into (relative to the game root).
const GAME_MODWORK_REL: &str = "users/modwork";

/// Game data root holding `shared/` and the `loc_*` localisation folders.
const GAME_DATA_REL: &str = "data/k43t";

/// The two roots a mod project is defined by.
///
/// Every other folder is derived on demand from one of these roots, so a derived
/// path can never drift from the root it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    game_root: Utf8PathBuf,
    mod_project_dir: Utf8PathBuf,
}

impl ProjectPaths {
    pub fn new(game_root: impl Into<Utf8PathBuf>, mod_project_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            game_root: game_root.into(),
            mod_project_dir: mod_project_dir.into(),
        }
    }

    pub fn game_root(&self) -> &Utf8Path {
        &self.game_root
    }

    pub fn mod_project_dir(&self) -> &Utf8Path {
        &self.mod_project_dir
    }

    /// Absolute path of a fixed project folder or file.
    pub fn folder(&self, folder: LogicalFolder) -> Utf8PathBuf {
        self.mod_project_dir.join(folder.relative_path())
    }

    pub fn starter_exe(&self) -> Utf8PathBuf {
        self.game_root.join(STARTER_EXE_NAME)
    }

    pub fn game_modwork(&self) -> Utf8PathBuf {
        self.game_root.join(GAME_MODWORK_REL)
    }

    pub fn game_data(&self) -> Utf8PathBuf {
        self.game_root.join(GAME_DATA_REL)
    }

    /// Where the game keeps its shared (non-localised) archives.
    pub fn game_shared_packed_data(&self) -> Utf8PathBuf {
        self.game_data().join("shared").join("packed_data")
    }

    pub fn manifest_template(&self) -> Utf8PathBuf {
        self.game_root.join(MANIFEST_TEMPLATE_REL)
    }

    pub fn extracted_atf_dir(&self, archive_base: &str) -> Utf8PathBuf {
        self.folder(LogicalFolder::ExtractedAtf).join(archive_base)
    }

    pub fn extracted_dds_dir(&self, archive_base: &str) -> Utf8PathBuf {
        self.folder(LogicalFolder::ExtractedDds).join(archive_base)
    }

    pub fn extracted_sounds_dir(&self, archive_base: &str) -> Utf8PathBuf {
        self.folder(LogicalFolder::ExtractedSounds).join(archive_base)
    }
}

/// Fixed set of folders (and the two well-known files) inside a mod project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalFolder {
    DdsWork,
    PreparedTextures,
    PreparedSoundsSfx,
    PreparedSoundsSpeech,
    Core,
    PackedData,
    ExtractedAtf,
    ExtractedDds,
    ExtractedSounds,
    WavSfxWork,
    WavSpeechWork,
    Readme,
    Manifest,
}

impl LogicalFolder {
    /// Directories created by project initialisation, parents before children.
    pub const DIRECTORIES: [LogicalFolder; 11] = [
        LogicalFolder::DdsWork,
        LogicalFolder::PreparedTextures,
        LogicalFolder::Core,
        LogicalFolder::PackedData,
        LogicalFolder::ExtractedAtf,
        LogicalFolder::ExtractedDds,
        LogicalFolder::ExtractedSounds,
        LogicalFolder::WavSfxWork,
        LogicalFolder::WavSpeechWork,
        LogicalFolder::PreparedSoundsSfx,
        LogicalFolder::PreparedSoundsSpeech,
    ];

    pub fn relative_path(self) -> &'static str {
        match self {
            LogicalFolder::DdsWork => "dds_work",
            LogicalFolder::PreparedTextures => "prepared_textures",
            LogicalFolder::PreparedSoundsSfx => "prepared_sounds/sfx",
            LogicalFolder::PreparedSoundsSpeech => "prepared_sounds/speech",
            LogicalFolder::Core => "CORE",
            LogicalFolder::PackedData => "CORE/shared/packed_data",
            LogicalFolder::ExtractedAtf => "extracted_game_textures/atf",
            LogicalFolder::ExtractedDds => "extracted_game_textures/dds",
            LogicalFolder::ExtractedSounds => "extracted_game_sounds",
            LogicalFolder::WavSfxWork => "wav_sfx_work",
            LogicalFolder::WavSpeechWork => "wav_speech_work",
            LogicalFolder::Readme => README_FILE_NAME,
            LogicalFolder::Manifest => "CORE/desc.addpack",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            LogicalFolder::DdsWork => "dds_work",
            LogicalFolder::PreparedTextures => "prepared_textures",
            LogicalFolder::PreparedSoundsSfx => "prepared_sounds_sfx",
            LogicalFolder::PreparedSoundsSpeech => "prepared_sounds_speech",
            LogicalFolder::Core => "core",
            LogicalFolder::PackedData => "packed_data",
            LogicalFolder::ExtractedAtf => "extracted_atf",
            LogicalFolder::ExtractedDds => "extracted_dds",
            LogicalFolder::ExtractedSounds => "extracted_sounds",
            LogicalFolder::WavSfxWork => "wav_sfx_work",
            LogicalFolder::WavSpeechWork => "wav_speech_work",
            LogicalFolder::Readme => "readme",
            LogicalFolder::Manifest => "manifest",
        }
    }
}

impl fmt::Display for LogicalFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for LogicalFolder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folder = match s {
            "dds_work" => LogicalFolder::DdsWork,
            "prepared_textures" => LogicalFolder::PreparedTextures,
            "prepared_sounds_sfx" => LogicalFolder::PreparedSoundsSfx,
            "prepared_sounds_speech" => LogicalFolder::PreparedSoundsSpeech,
            "core" => LogicalFolder::Core,
            "packed_data" => LogicalFolder::PackedData,
            "extracted_atf" => LogicalFolder::ExtractedAtf,
            "extracted_dds" => LogicalFolder::ExtractedDds,
            "extracted_sounds" => LogicalFolder::ExtractedSounds,
            "wav_sfx_work" => LogicalFolder::WavSfxWork,
            "wav_speech_work" => LogicalFolder::WavSpeechWork,
            "readme" => LogicalFolder::Readme,
            "manifest" => LogicalFolder::Manifest,
            other => return Err(other.to_string()),
        };
        Ok(folder)
    }
}
