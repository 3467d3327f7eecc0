use crate::models::project::LogicalFolder;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TEXTURE_EXT: &str = ".texture";
pub const DDS_EXT: &str = ".dds";
pub const WAV_EXT: &str = ".wav";
pub const LOC_DEF_SOUND_SUFFIX: &str = ".loc_def.sound";
pub const SOUND_EXT: &str = ".sound";
pub const AAF_EXT: &str = ".aaf";
pub const FLATDATA_EXT: &str = ".flatdata";

/// Case-insensitive suffix test on a file name.
///
/// Compares bytes, so a suffix landing inside a multi-byte character never matches
/// and never panics.
pub fn has_suffix_ignore_case(name: &str, suffix: &str) -> bool {
    let (name, suffix) = (name.as_bytes(), suffix.as_bytes());
    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Strips `suffix` (case-insensitive) and returns the untouched prefix.
pub fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if has_suffix_ignore_case(name, suffix) {
        // The suffix is ASCII, so the split point is a char boundary.
        name.get(..name.len() - suffix.len())
    } else {
        None
    }
}

/// Kind of a raw file pulled out of a game archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Texture,
    Sound,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Texture => f.write_str("texture"),
            AssetKind::Sound => f.write_str("sound"),
        }
    }
}

/// One file recorded during an extraction session.
///
/// `relative_path` is `<archive base>/<file name>`, relative to the extraction root
/// of its kind, which is also the line written to an inventory list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedAsset {
    pub relative_path: String,
    pub kind: AssetKind,
    pub source_archive: String,
}

/// Role of a converted sound, deciding which prepared folder it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundRole {
    Sfx,
    Speech,
}

impl fmt::Display for SoundRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundRole::Sfx => f.write_str("sfx"),
            SoundRole::Speech => f.write_str("speech"),
        }
    }
}

/// Classification tag of a prepared asset, always derived from its folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PreparedKind {
    #[serde(rename = "TEX")]
    Tex,
    #[serde(rename = "SFX")]
    Sfx,
    #[serde(rename = "SPE")]
    Spe,
}

impl PreparedKind {
    pub fn label(self) -> &'static str {
        match self {
            PreparedKind::Tex => "TEX",
            PreparedKind::Sfx => "SFX",
            PreparedKind::Spe => "SPE",
        }
    }

    /// Prepared folder assets of this kind live in.
    pub fn folder(self) -> LogicalFolder {
        match self {
            PreparedKind::Tex => LogicalFolder::PreparedTextures,
            PreparedKind::Sfx => LogicalFolder::PreparedSoundsSfx,
            PreparedKind::Spe => LogicalFolder::PreparedSoundsSpeech,
        }
    }

    /// Whether a file with this name is packable as this kind.
    pub fn accepts(self, name: &str) -> bool {
        match self {
            PreparedKind::Tex => has_suffix_ignore_case(name, TEXTURE_EXT),
            PreparedKind::Sfx | PreparedKind::Spe => {
                has_suffix_ignore_case(name, LOC_DEF_SOUND_SUFFIX)
                    || has_suffix_ignore_case(name, AAF_EXT)
            }
        }
    }

    /// Archive this kind of asset is packed into.
    pub fn category(self) -> ArchiveCategory {
        match self {
            PreparedKind::Tex => ArchiveCategory::Textures,
            PreparedKind::Sfx | PreparedKind::Spe => ArchiveCategory::Sounds,
        }
    }
}

impl fmt::Display for PreparedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<SoundRole> for PreparedKind {
    fn from(role: SoundRole) -> Self {
        match role {
            SoundRole::Sfx => PreparedKind::Sfx,
            SoundRole::Speech => PreparedKind::Spe,
        }
    }
}

/// A game-format file sitting in one of the prepared folders, ready to be packed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreparedAsset {
    pub path: Utf8PathBuf,
    pub kind: PreparedKind,
}

impl PreparedAsset {
    pub fn new(path: impl Into<Utf8PathBuf>, kind: PreparedKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl fmt::Display for PreparedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.file_name())
    }
}

/// Game texture archives known to hold moddable textures.
pub const KNOWN_TEXTURE_ARCHIVES: &[&str] = &[
    "tex_main",
    "tex_main_01",
    "tex_misc",
    "tex_objects",
    "tex_humans",
    "tex_techns",
    "tex_dummy",
    "textures_loc",
];
pub const DEFAULT_TEXTURE_ARCHIVES: &[&str] = &["tex_main", "tex_objects"];

/// Game sound archives, generic and per speech language.
pub const KNOWN_SOUND_ARCHIVES: &[&str] = &["sounds", "speech", "speech_eng", "speech_rus", "speech_ger"];
pub const DEFAULT_SOUND_ARCHIVES: &[&str] = &["sounds", "speech"];

impl AssetKind {
    pub fn known_archives(self) -> &'static [&'static str] {
        match self {
            AssetKind::Texture => KNOWN_TEXTURE_ARCHIVES,
            AssetKind::Sound => KNOWN_SOUND_ARCHIVES,
        }
    }

    pub fn default_archives(self) -> &'static [&'static str] {
        match self {
            AssetKind::Texture => DEFAULT_TEXTURE_ARCHIVES,
            AssetKind::Sound => DEFAULT_SOUND_ARCHIVES,
        }
    }
}

/// Archive file names to extract: the requested ones, or the defaults for `kind`
/// when nothing (or only blanks) was requested. Bare names get `.flatdata` appended.
pub fn archive_selection(kind: AssetKind, requested: &[String]) -> Vec<String> {
    let requested: Vec<&str> = requested
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .collect();
    let names = if requested.is_empty() {
        kind.default_archives().to_vec()
    } else {
        requested
    };

    names
        .into_iter()
        .map(|name| {
            if has_suffix_ignore_case(name, FLATDATA_EXT) {
                name.to_string()
            } else {
                format!("{}{}", name, FLATDATA_EXT)
            }
        })
        .collect()
}

/// One packed archive produced per category of selected assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveCategory {
    Textures,
    Sounds,
}

impl ArchiveCategory {
    /// Base name of the archive and of its `.!flatlist`.
    pub fn stem(self) -> &'static str {
        match self {
            ArchiveCategory::Textures => "textures",
            ArchiveCategory::Sounds => "sounds",
        }
    }

    /// Type column written into the flatlist entries.
    pub fn flatlist_type(self) -> &'static str {
        match self {
            ArchiveCategory::Textures => "texture",
            ArchiveCategory::Sounds => "sound",
        }
    }

    pub const ALL: [ArchiveCategory; 2] = [ArchiveCategory::Textures, ArchiveCategory::Sounds];

    pub fn archive_file_name(self) -> String {
        format!("{}.flatdata", self.stem())
    }
}

impl fmt::Display for ArchiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}
