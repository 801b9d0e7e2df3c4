//! Error types for joinwatch-monitor

use crate::driver::DriverError;
use crate::notify::NotifyError;
use thiserror::Error;

/// Monitor error type
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Browser automation failure
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Operator channel failure
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Configured join pattern does not compile
    #[error("Invalid join pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Interrupted while waiting for a channel to load
    #[error("Cancelled")]
    Cancelled,

    /// Panic or abort inside one polling cycle
    #[error("Cycle aborted: {0}")]
    Cycle(String),

    /// joinwatch-common error (state file, configuration)
    #[error("Common error: {0}")]
    Common(#[from] joinwatch_common::Error),
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;
