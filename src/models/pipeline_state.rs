use crate::models::metadata::ModMetadata;
use std::fmt;

/// Maximum number of concurrent `starter.exe` processes.
///
/// The tool writes into a shared scratch area under the game root and its
/// behaviour with several instances is unknown, so invocations are serialized
/// through a `tokio::sync::Semaphore` of this size in
/// [`ToolGateway`](crate::services::gateway::ToolGateway).
pub const MAX_CONCURRENT_TOOL_PROCESSES: usize = 1;

/// Long-running operation currently owning the project directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ExtractTextures,
    ExtractSounds,
    TextureToDds,
    DdsToTexture,
    WavToSound,
    Packaging,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::ExtractTextures => "extract textures",
            Operation::ExtractSounds => "extract sounds",
            Operation::TextureToDds => "texture to dds",
            Operation::DdsToTexture => "dds to texture",
            Operation::WavToSound => "wav to sound",
            Operation::Packaging => "packaging",
        };
        f.write_str(label)
    }
}

/// Stage of the packaging state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PackagingStage {
    #[default]
    Idle,
    FilesGenerated,
    ArchiveCreated,
}

impl fmt::Display for PackagingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackagingStage::Idle => f.write_str("idle"),
            PackagingStage::FilesGenerated => f.write_str("files generated"),
            PackagingStage::ArchiveCreated => f.write_str("archive created"),
        }
    }
}

/// Outcome of one item (archive or file) in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Succeeded => f.write_str("succeeded"),
            ItemStatus::Failed => f.write_str("failed"),
            ItemStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// Observable progress of the pipeline, owned by [`StateManager`](crate::state::StateManager).
///
/// Holds no asset lists: the filesystem stays the source of truth and callers
/// rescan instead of reading cached inventories from here.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineState {
    pub operation: Option<Operation>,
    pub is_running: bool,
    pub cancel_requested: bool,

    pub progress: usize,
    pub total: usize,
    pub current_item: Option<String>,

    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,

    pub packaging_stage: PackagingStage,
    /// Metadata the current mod files were generated with; `None` while idle.
    pub packaging_metadata: Option<ModMetadata>,
}

impl PipelineState {
    /// Record an item outcome and advance progress.
    pub fn add_result(&mut self, item: String, status: ItemStatus) {
        match status {
            ItemStatus::Succeeded => self.succeeded.push(item),
            ItemStatus::Failed => self.failed.push(item),
            ItemStatus::Skipped => self.skipped.push(item),
        }
        self.progress += 1;
    }

    /// Clear per-operation data; the packaging session (stage and metadata) survives.
    pub fn reset_operation(&mut self) {
        let stage = self.packaging_stage;
        let metadata = self.packaging_metadata.take();
        *self = Self {
            packaging_stage: stage,
            packaging_metadata: metadata,
            ..Self::default()
        };
    }
}
