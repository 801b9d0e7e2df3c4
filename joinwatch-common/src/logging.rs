//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Build the filter from `RUST_LOG`, falling back to `level`
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", level, e)))
}

/// Install the global tracing subscriber
///
/// Logs go to stderr, or are appended to `logging.file` without ANSI colours.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = build_filter(&logging.level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Tracing init failed: {}", e)))
}

/// Subscriber for the startup window before the configured one exists
///
/// Install it with `tracing::subscriber::with_default` around configuration
/// loading so warnings about the config itself are not lost.
pub fn bootstrap_subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}
