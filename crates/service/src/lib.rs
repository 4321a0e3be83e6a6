//! # adaptive-trigger-service
//!
//! The poll/transmit loop that ties telemetry acquisition, slip analysis,
//! feedback mapping and the DSX transport together.
//!
//! - [`supervisor`] - `WaitingForGame → Connecting → Polling → Disconnecting`
//!   state machine, one step per tick
//! - [`runner`] - runs the supervisor under a [`PollWatchdog`] with
//!   cooperative stop, plus the status display task
//! - [`config`] - YAML service configuration and its hot-reload watcher
//! - [`slot`] - single-slot latest-frame hand-off to display consumers
//! - [`probe`] - controller link check without a game
//!
//! [`PollWatchdog`]: adaptive_trigger_watchdog::PollWatchdog

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod probe;
pub mod runner;
pub mod slot;
pub mod supervisor;

pub use config::{
    ConfigWatcher, DEFAULT_CONFIG_FILE, DsxEndpoint, ServiceConfig, ServiceConfigError,
    ServiceConfigResult, TimingConfig,
};
pub use probe::{PROBE_STRENGTHS, ProbeReport, ProbeStep, probe_sequence, run_probe};
pub use runner::{resolve_endpoint, run_poll_cycle, run_service, run_status_display};
pub use slot::LatestFrameSlot;
pub use supervisor::{ConnectBackoff, Supervisor, SupervisorState, SupervisorStats};
