//! Services module - the asset pipeline from game archives to a distributable mod.
//!
//! The services have no front-end dependencies. Every stage takes the project it
//! works on as an explicit [`ProjectPaths`] value and rescans the disk instead of
//! trusting in-memory lists, because `starter.exe` changes files behind our back.
//!
//! # Components
//!
//! - [`layout`]: project skeleton provisioning and logical folder resolution
//! - [`ToolGateway`]: the only way `starter.exe` is launched (timeouts, one process
//!   at a time, output verification)
//! - [`AssetExtractor`]: unpacks game archives into `extracted_game_*`
//! - [`AssetConverter`]: per-file texture/DDS/WAV conversions into the work and
//!   prepared folders
//! - [`AssetRegistry`]: classifies what is in the prepared folders
//! - [`PackagingEngine`]: builds `.flatdata` archives, the manifest and the
//!   `.gt2extension` container
//!
//! # Failure policy
//!
//! Batch operations are fail-soft: a failing archive or file is recorded in the
//! report and its siblings continue. Integrity-critical steps (empty selection,
//! missing manifest, state machine violations, a tool that cannot be launched at
//! all) fail the whole call.
//!
//! # Usage Example
//!
//! ```ignore
//! use gravipack::services::{AssetExtractor, PipelineContext, ToolGateway};
//!
//! let gateway = ToolGateway::new(ToolTimeouts::from(&settings.tool));
//! let ctx = PipelineContext::new(paths, gateway).with_state(state.clone());
//! let report = AssetExtractor::new(ctx)
//!     .extract_textures(&["tex_main.flatdata".to_string()], true)
//!     .await?;
//! ```

pub mod converter;
pub mod extractor;
pub mod fs_ops;
pub mod gateway;
pub mod layout;
pub mod manifest;
pub mod packaging;
pub mod registry;
pub mod report;

pub use converter::{AssetConverter, ConversionError, ConversionReport};
pub use extractor::{
    AssetExtractor, ExtractionError, ExtractionReport, rename_loc_def_sound, write_inventory,
};
pub use gateway::{
    ProcessOutcome, ProcessRunner, StarterCommand, ToolError, ToolGateway, ToolInvocation,
    ToolRunner, ToolTimeouts,
};
pub use layout::{InitReport, LayoutError};
pub use packaging::{GeneratedFiles, PackagingEngine, PackagingError};
pub use registry::AssetRegistry;
pub use report::{ItemError, ItemFailure};

use crate::metrics::Metrics;
use crate::models::{ItemStatus, ProjectPaths};
use crate::state::StateManager;
use crate::worker::CancelSignal;

/// Everything a pipeline stage needs: the project, the tool, progress reporting and
/// the cancellation flag.
pub struct PipelineContext<R = ProcessRunner> {
    pub paths: ProjectPaths,
    pub gateway: ToolGateway<R>,
    pub state: StateManager,
    pub cancel: CancelSignal,
}

impl<R> Clone for PipelineContext<R> {
    fn clone(&self) -> Self {
        Self {
            paths: self.paths.clone(),
            gateway: self.gateway.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<R: ToolRunner> PipelineContext<R> {
    /// Context with a private state manager and no cancellation.
    pub fn new(paths: ProjectPaths, gateway: ToolGateway<R>) -> Self {
        Self {
            paths,
            gateway,
            state: StateManager::new(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_state(mut self, state: StateManager) -> Self {
        self.state = state;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        self.gateway.metrics()
    }

    pub(crate) fn record_success(&self, item: &str, message: String) {
        tracing::info!("{}: {}", item, message);
        self.metrics().record_item_succeeded();
        self.state.add_item_result(item, ItemStatus::Succeeded, message);
    }

    pub(crate) fn record_failure(&self, item: &str, error: &ItemError) {
        tracing::warn!("{} failed: {}", item, error);
        self.metrics().record_item_failed();
        self.state
            .add_item_result(item, ItemStatus::Failed, error.to_string());
    }

    pub(crate) fn record_skipped(&self, item: &str) {
        tracing::info!("{} skipped after cancellation", item);
        self.metrics().record_item_skipped();
        self.state
            .add_item_result(item, ItemStatus::Skipped, "cancelled".to_string());
    }
}
