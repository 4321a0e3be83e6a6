//! # adaptive-trigger-telemetry-core
//!
//! Core telemetry types shared by every stage of the feedback pipeline.
//!
//! ## Modules
//! - [`frame`] - the canonical [`TelemetryFrame`] produced once per tick
//! - [`decoder`] - fixed-layout little-endian record decoding
//! - [`error`] - connect/read/decode error taxonomy
//! - [`connection`] - per-source [`ConnectionState`]
//! - [`log_limiter`] - cooldown-based suppression of repeated failure logs
//!
//! Frames are built once by a normalizer and then only handed on by value or
//! shared reference; nothing downstream mutates them.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod connection;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod log_limiter;

pub mod prelude;

use std::sync::OnceLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use connection::ConnectionState;
pub use decoder::{BinaryTelemetryDecoder, DecodedRecord, FieldDescriptor, FieldValue, NumericKind};
pub use error::{ConnectError, DecodeError, ReadError, TelemetryResult};
pub use frame::{TelemetryFrame, TelemetryFrameBuilder, WheelPosition};
pub use log_limiter::{DEFAULT_LOG_COOLDOWN, ErrorLogLimiter};

static TELEMETRY_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic nanoseconds since the first call in this process.
pub fn telemetry_now_ns() -> u64 {
    let epoch = TELEMETRY_EPOCH.get_or_init(Instant::now);
    u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Simulators with a supported telemetry layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    /// Assetto Corsa family, read from named shared memory.
    #[default]
    AssettoCorsa,
    /// Richard Burns Rally, read from process memory.
    RichardBurnsRally,
}

impl GameId {
    /// Stable identifier used in config files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameId::AssettoCorsa => "assetto_corsa",
            GameId::RichardBurnsRally => "richard_burns_rally",
        }
    }

    /// Every supported game.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::AssettoCorsa, Self::RichardBurnsRally].into_iter()
    }
}

impl std::fmt::Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GameId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "assetto_corsa" | "ac" => Ok(GameId::AssettoCorsa),
            "richard_burns_rally" | "rbr" => Ok(GameId::RichardBurnsRally),
            other => Err(format!("unsupported game: {other}")),
        }
    }
}
