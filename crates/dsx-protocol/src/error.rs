//! Error types for the DSX protocol and its transports.

use std::io;
use thiserror::Error;

/// Result alias for codec operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Failure to build, encode or decode a packet.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown {kind} code {code}")]
    UnknownCode { kind: &'static str, code: u64 },

    #[error("invalid parameters for {instruction}: {reason}")]
    InvalidParameters {
        instruction: &'static str,
        reason: String,
    },

    #[error("packet of {size} bytes exceeds datagram limit of {max}")]
    DatagramTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    #[must_use]
    pub fn invalid_parameters(instruction: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            instruction,
            reason: reason.into(),
        }
    }
}

/// Failure to deliver a batch.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind UDP socket on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("send did not complete within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("partial datagram: sent {sent} of {expected} bytes")]
    Truncated { sent: usize, expected: usize },

    #[error("encoding failed: {0}")]
    Encode(#[from] ProtocolError),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Errors after which the transport cannot be used again.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }

    /// Errors worth retrying on the next tick.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal() && !matches!(self, Self::Encode(_))
    }
}
