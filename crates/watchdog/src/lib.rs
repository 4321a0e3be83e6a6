//! # adaptive-trigger-watchdog
//!
//! Keeps the telemetry poll cycle alive.
//!
//! The poll cycle stamps a [`Heartbeat`] after every iteration. A
//! [`PollWatchdog`] runs the cycle as a task and checks the stamp on its own
//! cadence. When the stamp stops advancing for longer than the configured
//! timeout, the watchdog raises the cycle's [`StopFlag`], waits for it to
//! finish, and only then starts a fresh cycle.
//!
//! ## Modules
//!
//! - [`heartbeat`] - monotonic last-tick stamp and the cooperative stop flag
//! - [`health`] - health status derived from heartbeat checks
//! - [`watchdog`] - configuration and the supervising loop
//! - [`error`] - watchdog error types
//!
//! ## Example
//!
//! ```rust
//! use adaptive_trigger_watchdog::prelude::*;
//! use std::time::Duration;
//!
//! let heartbeat = Heartbeat::new();
//! heartbeat.beat();
//! assert!(!heartbeat.is_stalled(Duration::from_secs(2)));
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_debug_implementations
)]

pub mod error;
pub mod health;
pub mod heartbeat;
pub mod watchdog;

pub mod prelude;

pub use error::{WatchdogError, WatchdogResult};
pub use health::{HealthCheck, HealthStatus};
pub use heartbeat::{Heartbeat, StopFlag};
pub use watchdog::{CycleContext, CycleExit, PollWatchdog, WatchdogConfig, WatchdogConfigBuilder};
