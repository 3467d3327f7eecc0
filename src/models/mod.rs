//! Data models for the gravipack pipeline.
//!
//! - [`ProjectPaths`] and [`LogicalFolder`]: the two project roots and every folder derived from them
//! - [`ExtractedAsset`], [`PreparedAsset`] and their kind tags: files moving through the pipeline
//! - [`ModMetadata`] and [`PackagingJob`]: input of a packaging run
//! - [`Settings`]: persisted configuration loaded from `gravipack.yaml`
//! - [`PipelineState`]: observable progress, wrapped by [`StateManager`](crate::state::StateManager)
//! - [`MAX_CONCURRENT_TOOL_PROCESSES`]: the external tool is never run twice at once

pub mod assets;
pub mod config;
pub mod metadata;
pub mod pipeline_state;
pub mod project;

pub use assets::{
    ArchiveCategory, AssetKind, ExtractedAsset, PreparedAsset, PreparedKind, SoundRole,
    archive_selection,
};
pub use config::{
    ExtractionSettings, LegacyIniConfig, LoggingSettings, PathSettings, Settings, ToolSettings,
};
pub use metadata::{ModMetadata, PackagingJob};
pub use pipeline_state::{
    ItemStatus, MAX_CONCURRENT_TOOL_PROCESSES, Operation, PackagingStage, PipelineState,
};
pub use project::{LogicalFolder, ProjectPaths};
