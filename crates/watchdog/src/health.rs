//! Poll cycle health status.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Health of the supervised poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HealthStatus {
    /// Heartbeats are arriving.
    Healthy,
    /// The cycle stalled recently and was restarted.
    Degraded,
    /// The cycle keeps stalling.
    Faulted,
    /// No check has run yet.
    #[default]
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Faulted => write!(f, "Faulted"),
            HealthStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Consecutive stalls at which the status becomes [`HealthStatus::Faulted`].
pub const FAULTED_AFTER_STALLS: u32 = 3;

/// Result of the watchdog's checks so far.
#[derive(Debug, Clone, Default)]
pub struct HealthCheck {
    pub status: HealthStatus,
    /// When the watchdog last saw the cycle alive.
    pub last_heartbeat: Option<Instant>,
    /// Beats counted at the last healthy check.
    pub beats_observed: u64,
    /// Stalls since the last healthy check.
    pub consecutive_stalls: u32,
    pub total_restarts: u32,
    pub last_error: Option<String>,
}

impl HealthCheck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check that found the cycle alive.
    pub fn heartbeat(&mut self, beats: u64) {
        self.last_heartbeat = Some(Instant::now());
        self.beats_observed = beats;
        self.status = HealthStatus::Healthy;
        self.consecutive_stalls = 0;
        self.last_error = None;
    }

    /// Record a stall of `silent_for`.
    ///
    /// - 1-2 consecutive stalls: Degraded
    /// - 3+: Faulted
    pub fn report_stall(&mut self, silent_for: Duration) {
        self.consecutive_stalls = self.consecutive_stalls.saturating_add(1);
        self.last_error = Some(format!("no heartbeat for {silent_for:?}"));
        self.status = if self.consecutive_stalls >= FAULTED_AFTER_STALLS {
            HealthStatus::Faulted
        } else {
            HealthStatus::Degraded
        };
    }

    pub fn record_restart(&mut self) {
        self.total_restarts = self.total_restarts.saturating_add(1);
    }

    #[must_use]
    pub fn time_since_heartbeat(&self) -> Option<Duration> {
        self.last_heartbeat.as_ref().map(Instant::elapsed)
    }
}
