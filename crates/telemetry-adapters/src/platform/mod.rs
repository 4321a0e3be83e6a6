//! OS capabilities used by the telemetry sources.
//!
//! Sources never touch raw handles or addresses directly; they go through the
//! traits below. The `System*` types are the real implementations for the
//! current target, and [`crate::mock`] provides in-memory ones for tests.

use adaptive_trigger_telemetry_core::{ConnectError, ReadError};

#[cfg(not(windows))]
mod procfs;
#[cfg(windows)]
mod windows;

#[cfg(not(windows))]
pub use procfs::{MappedView, ProcessHandle, SystemProcessAttacher, SystemProcessProbe, SystemSharedMemory};
#[cfg(windows)]
pub use windows::{MappedView, ProcessHandle, SystemProcessAttacher, SystemProcessProbe, SystemSharedMemory};

/// Linux truncates `/proc/<pid>/comm` to this many bytes.
pub const COMM_NAME_LEN: usize = 15;

/// Answers "is one of these executables running?".
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, names: &[&str]) -> bool;
}

/// A read-only mapping of a named shared memory segment.
pub trait SharedMemoryView: Send {
    /// Mapped length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the start of the mapping into `buf`, returning the bytes copied.
    fn read_into(&self, buf: &mut [u8]) -> usize;
}

/// Opens named shared memory segments.
pub trait SharedMemoryProvider: Send {
    type View: SharedMemoryView;

    /// Map `size` bytes of the segment called `name`.
    ///
    /// # Errors
    ///
    /// [`ConnectError::SegmentUnavailable`] when no such segment exists.
    fn open(&self, name: &str, size: usize) -> Result<Self::View, ConnectError>;
}

/// Read access to another process's address space.
pub trait ProcessMemory: Send {
    fn pid(&self) -> u32;

    /// Load address of the main executable module.
    fn module_base(&self) -> u64;

    /// Fill `buf` from `address`.
    ///
    /// # Errors
    ///
    /// [`ReadError::MemoryRead`] when the range is not readable,
    /// [`ReadError::ProcessExited`] when the process is gone.
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), ReadError>;

    fn is_alive(&self) -> bool;

    /// Read a 32-bit little-endian pointer or integer.
    ///
    /// # Errors
    ///
    /// Same as [`read_bytes`](Self::read_bytes).
    fn read_u32(&self, address: u64) -> Result<u32, ReadError> {
        let mut raw = [0u8; 4];
        self.read_bytes(address, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }
}

/// Attaches to a running process by executable name.
pub trait ProcessAttacher: Send {
    type Memory: ProcessMemory;

    /// # Errors
    ///
    /// [`ConnectError::ProcessNotFound`] when no process matches,
    /// [`ConnectError::AccessDenied`] when it cannot be opened for reading.
    fn attach(&self, process_name: &str) -> Result<Self::Memory, ConnectError>;
}

/// Case-insensitive executable name match.
///
/// `observed` may be a `comm` name truncated to [`COMM_NAME_LEN`] bytes, in
/// which case it matches any candidate with the same prefix.
pub fn matches_process_name(observed: &str, candidate: &str) -> bool {
    let observed = observed.trim();
    if observed.is_empty() {
        return false;
    }
    if observed.eq_ignore_ascii_case(candidate) {
        return true;
    }
    observed.len() == COMM_NAME_LEN
        && candidate
            .get(..COMM_NAME_LEN)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(observed))
}
