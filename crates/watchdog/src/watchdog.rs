//! Supervising loop for the telemetry poll cycle.
//!
//! The watchdog owns the cycle's task. On a stall it never aborts first: it
//! raises the cycle's stop flag, gives the cycle `shutdown_grace` to finish
//! its tick and release its handles, and only then starts a replacement.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{WatchdogError, WatchdogResult};
use crate::health::HealthCheck;
use crate::heartbeat::{Heartbeat, StopFlag};

/// Watchdog timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Heartbeat silence that counts as a stall (milliseconds).
    pub timeout_ms: u64,
    /// How often the heartbeat is checked (milliseconds).
    pub check_interval_ms: u64,
    /// Time a stopped cycle gets to exit on its own (milliseconds).
    pub shutdown_grace_ms: u64,
    /// Restarts allowed before supervision gives up. `None` is unlimited.
    pub max_restarts: Option<u32>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            check_interval_ms: 1000,
            shutdown_grace_ms: 1000,
            max_restarts: None,
        }
    }
}

impl WatchdogConfig {
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> WatchdogResult<()> {
        if self.timeout_ms == 0 {
            return Err(WatchdogError::invalid_configuration(
                "timeout_ms must be greater than 0",
            ));
        }
        if self.check_interval_ms == 0 {
            return Err(WatchdogError::invalid_configuration(
                "check_interval_ms must be greater than 0",
            ));
        }
        if self.check_interval_ms > self.timeout_ms {
            return Err(WatchdogError::invalid_configuration(
                "check_interval_ms must not exceed timeout_ms",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn builder() -> WatchdogConfigBuilder {
        WatchdogConfigBuilder::default()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Builder for `WatchdogConfig`.
#[derive(Debug, Default)]
pub struct WatchdogConfigBuilder {
    config: WatchdogConfig,
}

impl WatchdogConfigBuilder {
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn check_interval_ms(mut self, ms: u64) -> Self {
        self.config.check_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_grace_ms = ms;
        self
    }

    #[must_use]
    pub fn max_restarts(mut self, limit: u32) -> Self {
        self.config.max_restarts = Some(limit);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> WatchdogResult<WatchdogConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// How a poll cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleExit {
    /// The cycle honoured its stop flag.
    Stopped,
    /// The cycle hit an unrecoverable error; supervision ends.
    Fatal(String),
}

/// Handles given to each poll cycle.
#[derive(Debug, Clone)]
pub struct CycleContext {
    /// Stamp after every loop iteration.
    pub heartbeat: Heartbeat,
    /// Check at the top of every loop iteration.
    pub stop: StopFlag,
    /// 0 for the first cycle, incremented on each restart.
    pub generation: u32,
}

enum Observation {
    Exited(Result<CycleExit, tokio::task::JoinError>),
    Shutdown,
    Stalled(Duration),
}

/// Runs a poll cycle and restarts it when its heartbeat stalls.
#[derive(Debug)]
pub struct PollWatchdog {
    config: WatchdogConfig,
    health: Mutex<HealthCheck>,
    restarts: AtomicU32,
}

impl PollWatchdog {
    #[must_use]
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            health: Mutex::new(HealthCheck::new()),
            restarts: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    #[must_use]
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn health(&self) -> HealthCheck {
        self.health.lock().clone()
    }

    /// Run cycles built by `make_cycle` until `shutdown` is raised or a cycle
    /// exits on its own.
    ///
    /// # Errors
    ///
    /// [`WatchdogError::CycleFailed`] when a cycle returns
    /// [`CycleExit::Fatal`], [`WatchdogError::RestartLimitReached`] when the
    /// restart budget is spent.
    pub async fn supervise<F, Fut>(&self, shutdown: &StopFlag, mut make_cycle: F) -> WatchdogResult<()>
    where
        F: FnMut(CycleContext) -> Fut,
        Fut: Future<Output = CycleExit> + Send + 'static,
    {
        let mut generation = 0u32;
        loop {
            let heartbeat = Heartbeat::new();
            let stop = StopFlag::new();
            let mut task = tokio::spawn(make_cycle(CycleContext {
                heartbeat: heartbeat.clone(),
                stop: stop.clone(),
                generation,
            }));
            debug!(generation, "poll cycle started");

            match self.observe(&heartbeat, shutdown, &mut task).await {
                Observation::Exited(Ok(CycleExit::Stopped)) => {
                    info!(generation, "poll cycle exited");
                    return Ok(());
                }
                Observation::Exited(Ok(CycleExit::Fatal(reason))) => {
                    error!(generation, %reason, "poll cycle failed");
                    return Err(WatchdogError::cycle_failed(reason));
                }
                Observation::Exited(Err(join_error)) => {
                    warn!(generation, error = %join_error, "poll cycle task ended abnormally");
                }
                Observation::Shutdown => {
                    stop.request_stop();
                    self.join_within_grace(task, generation).await;
                    return Ok(());
                }
                Observation::Stalled(silent_for) => {
                    warn!(
                        generation,
                        silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
                        "poll cycle stalled, requesting cooperative stop"
                    );
                    stop.request_stop();
                    self.join_within_grace(task, generation).await;
                }
            }

            let restarts = self.restarts.fetch_add(1, Ordering::Relaxed).saturating_add(1);
            self.health.lock().record_restart();
            if let Some(limit) = self.config.max_restarts
                && restarts > limit
            {
                error!(restarts, "poll cycle restart limit reached");
                return Err(WatchdogError::RestartLimitReached { restarts: limit });
            }
            if shutdown.is_stop_requested() {
                return Ok(());
            }
            generation = generation.wrapping_add(1);
            warn!(generation, restarts, "restarting poll cycle");
        }
    }

    async fn observe(
        &self,
        heartbeat: &Heartbeat,
        shutdown: &StopFlag,
        task: &mut JoinHandle<CycleExit>,
    ) -> Observation {
        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                joined = &mut *task => return Observation::Exited(joined),
                () = shutdown.stopped() => return Observation::Shutdown,
                _ = ticker.tick() => {
                    let silent_for = heartbeat.since_last_beat();
                    if silent_for > self.config.timeout() {
                        self.health.lock().report_stall(silent_for);
                        return Observation::Stalled(silent_for);
                    }
                    self.health.lock().heartbeat(heartbeat.beats());
                }
            }
        }
    }

    /// Wait for a stopped cycle. Past the grace period the task is aborted;
    /// the cycle has already been asked to stop by then.
    async fn join_within_grace(&self, mut task: JoinHandle<CycleExit>, generation: u32) {
        match tokio::time::timeout(self.config.shutdown_grace(), &mut task).await {
            Ok(Ok(exit)) => debug!(generation, ?exit, "poll cycle stopped"),
            Ok(Err(join_error)) => warn!(generation, error = %join_error, "poll cycle ended abnormally"),
            Err(_) => {
                let err = WatchdogError::ShutdownTimeout(self.config.shutdown_grace());
                warn!(generation, error = %err, "aborting poll cycle task");
                task.abort();
                if let Err(join_error) = task.await {
                    debug!(generation, cancelled = join_error.is_cancelled(), "poll cycle task aborted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_default_config_is_valid() -> TestResult {
        WatchdogConfig::default().validate()?;
        Ok(())
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(WatchdogConfig::builder().timeout_ms(0).build().is_err());
        assert!(
            WatchdogConfig::builder()
                .timeout_ms(100)
                .check_interval_ms(500)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_builder_sets_fields() -> TestResult {
        let config = WatchdogConfig::builder()
            .timeout_ms(300)
            .check_interval_ms(50)
            .shutdown_grace_ms(20)
            .max_restarts(2)
            .build()?;
        assert_eq!(config.timeout(), Duration::from_millis(300));
        assert_eq!(config.check_interval(), Duration::from_millis(50));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(20));
        assert_eq!(config.max_restarts, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_stops_cycle_cooperatively() -> TestResult {
        let config = WatchdogConfig::builder()
            .timeout_ms(200)
            .check_interval_ms(20)
            .shutdown_grace_ms(500)
            .build()?;
        let watchdog = PollWatchdog::new(config);
        let shutdown = StopFlag::new();

        let trigger = shutdown.clone();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.request_stop();
        });

        watchdog
            .supervise(&shutdown, |ctx| async move {
                while !ctx.stop.is_stop_requested() {
                    ctx.heartbeat.beat();
                    ctx.stop.sleep(Duration::from_millis(5)).await;
                }
                CycleExit::Stopped
            })
            .await?;

        stopper.await?;
        assert_eq!(watchdog.restarts(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_fatal_exit_ends_supervision() -> TestResult {
        let watchdog = PollWatchdog::new(WatchdogConfig::default());
        let result = watchdog
            .supervise(&StopFlag::new(), |_ctx| async {
                CycleExit::Fatal("bind failed".to_string())
            })
            .await;
        assert_eq!(result, Err(WatchdogError::cycle_failed("bind failed")));
        Ok(())
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_builder_accepts_only_consistent_timing(
                timeout in 0u64..5_000,
                check in 0u64..5_000,
            ) {
                let built = WatchdogConfig::builder()
                    .timeout_ms(timeout)
                    .check_interval_ms(check)
                    .build();
                let consistent = timeout > 0 && check > 0 && check <= timeout;
                prop_assert_eq!(built.is_ok(), consistent);
            }
        }
    }
}
