use super::assets::PreparedAsset;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MOD_NAME: &str = "MyMod";
pub const DEFAULT_AUTHOR: &str = "Unknown Author";
pub const DEFAULT_VERSION: &str = "100";

/// Name, author and version written into the manifest and readme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModMetadata {
    pub name: String,
    pub author: String,
    pub version: String,
}

impl ModMetadata {
    pub fn new(name: impl Into<String>, author: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            version: version.into(),
        }
    }

    /// First field that is blank after trimming, if any.
    pub fn blank_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("author", &self.author),
            ("version", &self.version),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }

    /// Trimmed copy, as stored in the generated files.
    pub fn trimmed(&self) -> Self {
        Self::new(self.name.trim(), self.author.trim(), self.version.trim())
    }
}

impl Default for ModMetadata {
    fn default() -> Self {
        Self::new(DEFAULT_MOD_NAME, DEFAULT_AUTHOR, DEFAULT_VERSION)
    }
}

/// Everything one packaging run consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingJob {
    pub metadata: ModMetadata,
    pub selected_assets: Vec<PreparedAsset>,
}

impl PackagingJob {
    pub fn new(metadata: ModMetadata, selected_assets: Vec<PreparedAsset>) -> Self {
        Self {
            metadata,
            selected_assets,
        }
    }
}
