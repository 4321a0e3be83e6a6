//! Poll-loop state machine.
//!
//! ```text
//! WaitingForGame -> Connecting -> Polling -> Disconnecting -> WaitingForGame
//! ```
//!
//! [`Supervisor::tick`] runs one step and returns how long the caller should
//! wait before the next one. The supervisor is the only place that decides
//! between retrying, changing state, and logging a failure and carrying on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use adaptive_trigger_dsx_protocol::{ControllerTransport, InstructionBatch};
use adaptive_trigger_feedback_mapping::{FeedbackConfig, FeedbackMapper, FeedbackState, SlipAnalyzer};
use adaptive_trigger_telemetry_adapters::TelemetrySource;
use adaptive_trigger_telemetry_core::{ErrorLogLimiter, TelemetryFrame, telemetry_now_ns};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::slot::LatestFrameSlot;

const SEND_FAILURE_KIND: &str = "transport.send";

/// Where the poll loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SupervisorState {
    /// No game process; the controller is held in its reset state.
    #[default]
    WaitingForGame,
    /// Game found; opening the telemetry source.
    Connecting,
    /// Running poll, normalize, analyze, map and transmit every tick.
    Polling,
    /// Game exited mid-session; releasing the source.
    Disconnecting,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::WaitingForGame => write!(f, "WaitingForGame"),
            SupervisorState::Connecting => write!(f, "Connecting"),
            SupervisorState::Polling => write!(f, "Polling"),
            SupervisorState::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Counters since the supervisor was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupervisorStats {
    pub frames: u64,
    pub soft_misses: u64,
    pub batches_sent: u64,
    pub send_failures: u64,
    pub force_stops: u64,
    /// Source reopened after too many consecutive misses.
    pub reconnects: u64,
}

/// Bounded exponential connect retry delay.
#[derive(Debug, Clone)]
pub struct ConnectBackoff {
    base: Duration,
    max: Duration,
    next: Duration,
    attempts: u32,
}

impl ConnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            next: base,
            attempts: 0,
        }
    }

    /// Delay before the next attempt; doubles up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.next = self.base;
        self.attempts = 0;
    }
}

/// Drives one telemetry source and one controller transport.
pub struct Supervisor<T> {
    source: Box<dyn TelemetrySource>,
    transport: T,
    timing: TimingConfig,
    feedback: FeedbackConfig,
    analyzer: SlipAnalyzer,
    mapper: FeedbackMapper,
    state: SupervisorState,
    feedback_state: FeedbackState,
    backoff: ConnectBackoff,
    retry_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    force_stopped: bool,
    consecutive_misses: u32,
    next_process_check: Option<Instant>,
    limiter: ErrorLogLimiter,
    slot: Option<Arc<LatestFrameSlot>>,
    stats: SupervisorStats,
}

impl<T> std::fmt::Debug for Supervisor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("game", &self.source.game())
            .field("state", &self.state)
            .field("force_stopped", &self.force_stopped)
            .field("consecutive_misses", &self.consecutive_misses)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T: ControllerTransport> Supervisor<T> {
    pub fn new(
        source: Box<dyn TelemetrySource>,
        transport: T,
        timing: TimingConfig,
        feedback: FeedbackConfig,
    ) -> Self {
        let feedback = feedback.sanitized();
        Self {
            source,
            transport,
            backoff: ConnectBackoff::new(timing.connect_backoff(), timing.connect_backoff_max()),
            timing,
            analyzer: SlipAnalyzer::new(feedback.gate_speed_kmh),
            feedback,
            mapper: FeedbackMapper::new(),
            state: SupervisorState::WaitingForGame,
            feedback_state: FeedbackState::released(),
            retry_at: None,
            last_frame_at: None,
            force_stopped: false,
            consecutive_misses: 0,
            next_process_check: None,
            limiter: ErrorLogLimiter::default(),
            slot: None,
            stats: SupervisorStats::default(),
        }
    }

    /// Publish every normalized frame into `slot` for a display consumer.
    #[must_use]
    pub fn with_frame_slot(mut self, slot: Arc<LatestFrameSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }

    pub fn feedback_state(&self) -> &FeedbackState {
        &self.feedback_state
    }

    pub fn feedback_config(&self) -> &FeedbackConfig {
        &self.feedback
    }

    pub fn is_force_stopped(&self) -> bool {
        self.force_stopped
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replace the feedback config wholesale. Takes effect on the next frame.
    pub fn set_feedback_config(&mut self, config: FeedbackConfig) {
        let config = config.sanitized();
        self.analyzer = SlipAnalyzer::new(config.gate_speed_kmh);
        self.feedback = config;
    }

    /// Run one step of the state machine at time `now`.
    ///
    /// Returns the delay until the next step is due.
    pub async fn tick(&mut self, now: Instant) -> Duration {
        match self.state {
            SupervisorState::WaitingForGame => self.wait_for_game(now).await,
            SupervisorState::Connecting => self.try_connect(now),
            SupervisorState::Polling => self.poll_once(now).await,
            SupervisorState::Disconnecting => self.release_source(),
        }
    }

    /// Reset the controller and release the source. Called once when the
    /// poll loop is asked to stop.
    pub async fn shutdown(&mut self) {
        self.send_reset(Instant::now()).await;
        self.source.close();
        info!(game = %self.source.game(), state = %self.state, "Supervisor stopped");
    }

    async fn wait_for_game(&mut self, now: Instant) -> Duration {
        self.send_reset(now).await;
        if self.source.is_game_running() {
            self.backoff.reset();
            self.retry_at = None;
            self.transition(SupervisorState::Connecting, "game process detected");
            return Duration::ZERO;
        }
        self.timing.waiting_interval()
    }

    fn try_connect(&mut self, now: Instant) -> Duration {
        if let Some(at) = self.retry_at
            && now < at
        {
            return at.saturating_duration_since(now);
        }

        match self.source.connect() {
            Ok(()) => {
                self.backoff.reset();
                self.retry_at = None;
                self.consecutive_misses = 0;
                // A force stop already sent stays in effect until a frame
                // arrives, so the timeout clock only starts on a fresh session.
                self.last_frame_at.get_or_insert(now);
                self.next_process_check = now.checked_add(self.timing.process_check_interval());
                self.transition(SupervisorState::Polling, "telemetry source connected");
                Duration::ZERO
            }
            Err(e) => {
                let attempt = self.backoff.attempts().saturating_add(1);
                if let Some(suppressed) = self.limiter.should_log(e.kind(), now) {
                    warn!(game = %self.source.game(), error = %e, attempt, suppressed, "Telemetry connect failed");
                }
                if !self.source.is_game_running() {
                    self.transition(SupervisorState::WaitingForGame, "game process exited");
                    return Duration::ZERO;
                }
                let delay = self.backoff.next_delay();
                self.retry_at = now.checked_add(delay);
                delay
            }
        }
    }

    async fn poll_once(&mut self, now: Instant) -> Duration {
        if self.next_process_check.is_none_or(|at| now >= at) {
            self.next_process_check = now.checked_add(self.timing.process_check_interval());
            if !self.source.is_game_running() {
                self.transition(SupervisorState::Disconnecting, "game process exited");
                return Duration::ZERO;
            }
        }

        match self.source.poll() {
            Ok(Some(record)) => {
                let frame = self.source.normalize(&record, telemetry_now_ns());
                self.on_frame(frame, now).await;
            }
            Ok(None) => self.on_miss(now).await,
            Err(e) if e.is_disconnect() => {
                warn!(game = %self.source.game(), error = %e, "Telemetry source lost");
                self.transition(SupervisorState::Disconnecting, "telemetry source lost");
                return Duration::ZERO;
            }
            Err(e) => {
                if let Some(suppressed) = self.limiter.should_log(e.kind(), now) {
                    warn!(game = %self.source.game(), error = %e, suppressed, "Telemetry read failed");
                }
                self.on_miss(now).await;
            }
        }
        self.timing.tick_interval()
    }

    async fn on_frame(&mut self, frame: TelemetryFrame, now: Instant) {
        self.consecutive_misses = 0;
        self.last_frame_at = Some(now);
        if self.force_stopped {
            info!(game = %frame.game(), "Telemetry resumed");
            self.force_stopped = false;
        }
        self.stats.frames = self.stats.frames.saturating_add(1);

        let slip = self.analyzer.analyze(&frame);
        let mapped = self.mapper.map(&frame, &slip, &self.feedback, &self.feedback_state);
        self.feedback_state = mapped.state;
        if !mapped.batch.is_empty() {
            self.send(&mapped.batch, "feedback", now).await;
        }

        if let Some(slot) = &self.slot {
            slot.publish(frame);
        }
    }

    async fn on_miss(&mut self, now: Instant) {
        self.consecutive_misses = self.consecutive_misses.saturating_add(1);
        self.stats.soft_misses = self.stats.soft_misses.saturating_add(1);
        if self.consecutive_misses == 1 {
            debug!(game = %self.source.game(), "No telemetry frame this tick");
        }

        let timed_out = self
            .last_frame_at
            .is_some_and(|at| now.saturating_duration_since(at) > self.timing.telemetry_timeout());
        if timed_out && !self.force_stopped {
            warn!(
                game = %self.source.game(),
                timeout_ms = self.timing.telemetry_timeout_ms,
                "Telemetry timed out, stopping feedback"
            );
            let batch = self.mapper.force_stop_batch(&self.feedback);
            self.send(&batch, "force_stop", now).await;
            self.feedback_state = FeedbackState::released();
            self.force_stopped = true;
            self.stats.force_stops = self.stats.force_stops.saturating_add(1);
        }

        if self.consecutive_misses >= self.timing.max_consecutive_misses {
            warn!(
                game = %self.source.game(),
                misses = self.consecutive_misses,
                "Reopening telemetry source"
            );
            self.source.close();
            self.consecutive_misses = 0;
            self.stats.reconnects = self.stats.reconnects.saturating_add(1);
            self.transition(SupervisorState::Connecting, "too many consecutive misses");
        }
    }

    fn release_source(&mut self) -> Duration {
        self.source.close();
        self.consecutive_misses = 0;
        self.last_frame_at = None;
        self.force_stopped = false;
        self.transition(SupervisorState::WaitingForGame, "telemetry source released");
        Duration::ZERO
    }

    async fn send_reset(&mut self, now: Instant) {
        let batch = self
            .mapper
            .reset_batch(&self.feedback, self.feedback_state.rumble.active);
        self.send(&batch, "reset", now).await;
        self.feedback_state = FeedbackState::released();
    }

    /// Transport failures are logged and dropped; feedback is perishable.
    async fn send(&mut self, batch: &InstructionBatch, purpose: &'static str, now: Instant) {
        match self.transport.send(batch).await {
            Ok(()) => {
                self.stats.batches_sent = self.stats.batches_sent.saturating_add(1);
                self.limiter.clear(SEND_FAILURE_KIND);
            }
            Err(e) => {
                self.stats.send_failures = self.stats.send_failures.saturating_add(1);
                if let Some(suppressed) = self.limiter.should_log(SEND_FAILURE_KIND, now) {
                    warn!(
                        transport = %self.transport.describe(),
                        purpose,
                        error = %e,
                        suppressed,
                        "Failed to send controller batch"
                    );
                }
            }
        }
    }

    fn transition(&mut self, next: SupervisorState, reason: &str) {
        if self.state == next {
            return;
        }
        info!(game = %self.source.game(), from = %self.state, to = %next, reason, "Supervisor state changed");
        self.state = next;
    }
}
