//! Error types for the watchdog.

use std::time::Duration;
use thiserror::Error;

/// Errors that end supervision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The cycle stalled more often than allowed.
    #[error("Poll cycle restarted {restarts} times, giving up")]
    RestartLimitReached { restarts: u32 },

    /// The cycle reported an unrecoverable failure.
    #[error("Poll cycle failed: {0}")]
    CycleFailed(String),

    /// The cycle did not stop within the grace period.
    #[error("Poll cycle ignored stop request for {0:?}")]
    ShutdownTimeout(Duration),
}

impl WatchdogError {
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    #[must_use]
    pub fn cycle_failed(reason: impl Into<String>) -> Self {
        Self::CycleFailed(reason.into())
    }
}

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = std::result::Result<T, WatchdogError>;
