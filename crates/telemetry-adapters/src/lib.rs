//! # adaptive-trigger-telemetry-adapters
//!
//! Game telemetry sources behind one [`TelemetrySource`] interface.
//!
//! Two acquisition strategies are supported:
//! - [`SharedMemorySource`] maps a named segment the simulator publishes
//!   (Assetto Corsa family).
//! - [`ProcessMemorySource`] attaches to the simulator process and follows
//!   fixed [`PointerChain`]s (Richard Burns Rally).
//!
//! Each game contributes only a layout (segment names or pointer chains, field
//! descriptors) and a pure normalizer function; see [`assetto_corsa`] and
//! [`rbr`]. OS access goes through the [`platform`] traits so that sources can
//! be driven by [`mock`] implementations in tests.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod assetto_corsa;
pub mod mock;
pub mod platform;
pub mod process_memory;
pub mod rbr;
pub mod shared_memory;

pub use adaptive_trigger_telemetry_core::{
    ConnectError, ConnectionState, DecodedRecord, GameId, ReadError, TelemetryFrame,
    TelemetryResult,
};
pub use process_memory::{
    ChainRoot, GatherField, PointerBlock, PointerChain, ProcessMemoryLayout, ProcessMemorySource,
};
pub use shared_memory::{AuxiliarySegment, SegmentSpec, SharedMemoryLayout, SharedMemorySource};

use platform::{SystemProcessAttacher, SystemProcessProbe, SystemSharedMemory};

/// Per-poll inputs a normalizer needs besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub timestamp_ns: u64,
    pub sequence: u64,
    /// Slow-changing companion record (car constants), when the layout has one.
    pub auxiliary: Option<&'a DecodedRecord>,
}

/// Pure mapping from a source record to the canonical frame.
pub type Normalizer = fn(&DecodedRecord, &NormalizeContext<'_>) -> TelemetryFrame;

/// A telemetry source for one game.
///
/// All calls are synchronous and bounded: no call waits on the game.
pub trait TelemetrySource: Send {
    fn game(&self) -> GameId;

    fn state(&self) -> ConnectionState;

    /// Whether one of the game's executables is currently running.
    fn is_game_running(&self) -> bool;

    /// Open the segment or attach to the process.
    ///
    /// # Errors
    ///
    /// Any [`ConnectError`]; the caller retries with backoff.
    fn connect(&mut self) -> Result<(), ConnectError>;

    /// Read one record.
    ///
    /// `Ok(None)` means no fresh frame this tick (not yet published, paused,
    /// pointer chain mid-update).
    ///
    /// # Errors
    ///
    /// Errors for which [`ReadError::is_disconnect`] holds require a
    /// reconnect; the rest are per-tick failures.
    fn poll(&mut self) -> TelemetryResult<Option<DecodedRecord>>;

    /// Map a record returned by [`poll`](Self::poll) to a frame.
    fn normalize(&self, record: &DecodedRecord, timestamp_ns: u64) -> TelemetryFrame;

    /// Release OS resources. Safe to call repeatedly.
    fn close(&mut self);
}

/// Build the platform-backed source for `game`.
pub fn create_source(game: GameId) -> Box<dyn TelemetrySource> {
    match game {
        GameId::AssettoCorsa => Box::new(SharedMemorySource::new(
            assetto_corsa::layout(),
            SystemSharedMemory,
            SystemProcessProbe,
        )),
        GameId::RichardBurnsRally => Box::new(ProcessMemorySource::new(
            rbr::layout(),
            SystemProcessAttacher,
            SystemProcessProbe,
        )),
    }
}

/// Executable names that identify `game`.
pub fn process_names(game: GameId) -> &'static [&'static str] {
    match game {
        GameId::AssettoCorsa => assetto_corsa::PROCESS_NAMES,
        GameId::RichardBurnsRally => rbr::PROCESS_NAMES,
    }
}
