use crate::models::LoggingSettings;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub directory: Utf8PathBuf,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
    pub json: bool,
}

impl LogOptions {
    pub fn from_settings(settings: &LoggingSettings, prefix: &str) -> Self {
        Self {
            directory: settings.directory.clone(),
            prefix: prefix.to_string(),
            debug: settings.debug,
            console: settings.console,
            json: settings.json,
        }
    }

    /// `RUST_LOG` when set, otherwise `debug` or `info`.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if self.debug {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            }
        })
    }
}

/// Setup logging with a daily rotating file appender and optional console output.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(options: &LogOptions) -> Result<WorkerGuard> {
    if !options.directory.exists() {
        fs::create_dir_all(&options.directory)
            .with_context(|| format!("Failed to create log directory: {}", options.directory))?;
    }

    let file_appender = rolling::daily(&options.directory, &options.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    let file_layer = if options.json {
        file_layer.json().boxed()
    } else {
        file_layer.boxed()
    };

    let console_layer = options.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(options.filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}, json={}",
        options.directory,
        options.prefix,
        options.debug,
        options.console,
        options.json
    );

    Ok(guard)
}
