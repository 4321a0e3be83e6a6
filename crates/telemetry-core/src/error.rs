//! Error taxonomy for telemetry acquisition.
//!
//! The three enums map onto the three failure classes the poll loop treats
//! differently: [`ConnectError`] is retried with backoff, [`ReadError`] is a
//! per-tick failure, and [`DecodeError`] describes a buffer that cannot be
//! interpreted.

use thiserror::Error;

/// Failure to attach to a telemetry source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The target process is not running.
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    /// The named shared memory segment does not exist (yet).
    #[error("Shared memory segment unavailable: {0}")]
    SegmentUnavailable(String),

    /// The OS refused access to a process or segment that does exist.
    #[error("Access denied to {target}: {reason}")]
    AccessDenied {
        /// Process or segment name.
        target: String,
        /// OS-level detail.
        reason: String,
    },

    /// The process was found but its load base could not be resolved.
    #[error("Module base address not found for {0}")]
    ModuleBaseNotFound(String),

    /// The current platform has no implementation for this source kind.
    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
}

impl ConnectError {
    /// Create a process not found error.
    #[must_use]
    pub fn process_not_found(name: impl Into<String>) -> Self {
        Self::ProcessNotFound(name.into())
    }

    /// Create a segment unavailable error.
    #[must_use]
    pub fn segment_unavailable(name: impl Into<String>) -> Self {
        Self::SegmentUnavailable(name.into())
    }

    /// Create an access denied error.
    #[must_use]
    pub fn access_denied(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AccessDenied {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Short stable label, used as a log-suppression key.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectError::ProcessNotFound(_) => "connect.process_not_found",
            ConnectError::SegmentUnavailable(_) => "connect.segment_unavailable",
            ConnectError::AccessDenied { .. } => "connect.access_denied",
            ConnectError::ModuleBaseNotFound(_) => "connect.module_base",
            ConnectError::Unsupported(_) => "connect.unsupported",
        }
    }
}

/// Failure while polling a connected source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// `poll` was called before a successful `connect`.
    #[error("Telemetry source not connected")]
    NotConnected,

    /// The process handle is no longer valid; the source must reconnect.
    #[error("Process exited: {0}")]
    ProcessExited(String),

    /// A memory read failed at the given address.
    #[error("Memory read failed at {address:#x} ({len} bytes)")]
    MemoryRead {
        /// Absolute address in the target process.
        address: u64,
        /// Requested length.
        len: usize,
    },

    /// The bytes were read but could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ReadError {
    /// Whether this failure invalidates the connection rather than the tick.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ReadError::NotConnected | ReadError::ProcessExited(_))
    }

    /// Short stable label, used as a log-suppression key.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadError::NotConnected => "read.not_connected",
            ReadError::ProcessExited(_) => "read.process_exited",
            ReadError::MemoryRead { .. } => "read.memory",
            ReadError::Decode(_) => "read.decode",
        }
    }
}

/// Failure to interpret a fixed-layout byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer is shorter than the layout requires.
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall {
        /// Minimum length implied by the field descriptors.
        required: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// The discriminator field is zero or negative: no frame has been published yet.
    #[error("No valid frame (discriminator {discriminator})")]
    NoValidFrame {
        /// Raw discriminator value.
        discriminator: i32,
    },
}

impl DecodeError {
    /// `true` for the "retry next tick" case that is not a real failure.
    pub fn is_no_frame(&self) -> bool {
        matches!(self, DecodeError::NoValidFrame { .. })
    }
}

/// A specialized `Result` type for telemetry reads.
pub type TelemetryResult<T> = std::result::Result<T, ReadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectError::process_not_found("RichardBurnsRally_SSE.exe");
        assert!(err.to_string().contains("RichardBurnsRally_SSE.exe"));

        let err = ReadError::MemoryRead {
            address: 0x0165_FC68,
            len: 4,
        };
        assert!(err.to_string().contains("0x165fc68"));
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(ReadError::ProcessExited("rbr".into()).is_disconnect());
        assert!(ReadError::NotConnected.is_disconnect());
        assert!(!ReadError::MemoryRead { address: 0, len: 4 }.is_disconnect());
        let decode: ReadError = DecodeError::BufferTooSmall {
            required: 256,
            actual: 12,
        }
        .into();
        assert!(!decode.is_disconnect());
    }

    #[test]
    fn test_no_frame_is_distinguished() {
        assert!(DecodeError::NoValidFrame { discriminator: 0 }.is_no_frame());
        assert!(
            !DecodeError::BufferTooSmall {
                required: 8,
                actual: 4
            }
            .is_no_frame()
        );
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            ConnectError::process_not_found("x").kind(),
            ConnectError::segment_unavailable("x").kind(),
            ConnectError::access_denied("x", "y").kind(),
            ReadError::NotConnected.kind(),
            ReadError::MemoryRead { address: 0, len: 0 }.kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
