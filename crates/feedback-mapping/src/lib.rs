//! # adaptive-trigger-feedback-mapping
//!
//! Turns a [`TelemetryFrame`](adaptive_trigger_telemetry_core::TelemetryFrame)
//! into the controller instructions for one tick.
//!
//! ## Pipeline
//!
//! 1. [`SlipAnalyzer`] derives per-wheel slip with a hard low-speed gate.
//! 2. [`FeedbackMapper`] applies the trigger rules, the RPM LED gradient and
//!    rumble planning, producing an
//!    [`InstructionBatch`](adaptive_trigger_dsx_protocol::InstructionBatch)
//!    and the [`FeedbackState`] to carry into the next tick.
//!
//! Everything here is pure: no I/O, no clocks. Time enters only through the
//! frame's timestamp, so identical inputs always give identical batches.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod haptics;
pub mod led;
pub mod mapper;
pub mod slip;
pub mod state;

pub mod prelude;

pub use config::{
    ConfigError, ConfigResult, FeedbackConfig, FeedbackConfigBuilder, LedThresholds, VibrationMode,
};
pub use mapper::{FeedbackMapper, MappedTick, quantize_strength};
pub use slip::{SlipAnalyzer, SlipMetrics};
pub use state::{FeedbackState, RumbleState, TriggerSetting, TriggerState};
