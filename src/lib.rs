// GraviPack - asset pipeline and mod packager for Graviteam games
//
// This is the library crate containing the pipeline services and data structures.
// The binary crate (main.rs) provides the command-line front end.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod worker;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{ModMetadata, PackagingJob, PreparedAsset, ProjectPaths, Settings};
pub use services::{
    AssetConverter, AssetExtractor, AssetRegistry, PackagingEngine, PipelineContext, ToolGateway,
};
pub use state::{StateChange, StateManager};
pub use worker::{CancelSignal, PipelineWorker};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
