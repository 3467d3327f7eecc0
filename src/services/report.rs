use crate::services::gateway::ToolError;
use camino::Utf8PathBuf;
use std::io;
use thiserror::Error;

/// Why a single archive or file in a batch failed.
///
/// Batch operations collect these instead of aborting, so siblings keep going.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("archive not found in shared or localized packed_data folders")]
    ArchiveNotFound { searched: Vec<Utf8PathBuf> },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("expected a {expected} file")]
    UnexpectedExtension { expected: &'static str },

    #[error("input file does not exist")]
    MissingInput,
}

impl ItemError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        ItemError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failed archive or file with the reason.
#[derive(Debug)]
pub struct ItemFailure {
    pub item: String,
    pub error: ItemError,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, error: ItemError) -> Self {
        Self {
            item: item.into(),
            error,
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.item, self.error)
    }
}
