//! Stall detection and cooperative restart of a supervised cycle.

use adaptive_trigger_watchdog::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn fast_config() -> Result<WatchdogConfig, WatchdogError> {
    WatchdogConfig::builder()
        .timeout_ms(80)
        .check_interval_ms(10)
        .shutdown_grace_ms(200)
        .build()
}

#[tokio::test]
async fn stalled_cycle_is_replaced_after_it_stops() -> TestResult {
    let watchdog = Arc::new(PollWatchdog::new(fast_config()?));
    let shutdown = StopFlag::new();
    let started = Arc::new(AtomicU32::new(0));
    let stopped_cleanly = Arc::new(AtomicU32::new(0));

    let supervisor = {
        let watchdog = Arc::clone(&watchdog);
        let shutdown = shutdown.clone();
        let started = Arc::clone(&started);
        let stopped_cleanly = Arc::clone(&stopped_cleanly);
        tokio::spawn(async move {
            watchdog
                .supervise(&shutdown, move |ctx| {
                    let started = Arc::clone(&started);
                    let stopped_cleanly = Arc::clone(&stopped_cleanly);
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        loop {
                            if ctx.stop.is_stop_requested() {
                                stopped_cleanly.fetch_add(1, Ordering::SeqCst);
                                return CycleExit::Stopped;
                            }
                            // The first generation hangs without beating but
                            // still honours the stop flag.
                            if ctx.generation > 0 {
                                ctx.heartbeat.beat();
                            }
                            ctx.stop.sleep(Duration::from_millis(5)).await;
                        }
                    }
                })
                .await
        })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while started.load(Ordering::SeqCst) < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(started.load(Ordering::SeqCst), 2);
    // The stalled generation exited before its replacement started.
    assert_eq!(stopped_cleanly.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(watchdog.restarts(), 1);
    assert_eq!(watchdog.health().status, HealthStatus::Healthy);

    shutdown.request_stop();
    supervisor.await??;
    assert_eq!(stopped_cleanly.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn unresponsive_cycle_is_aborted_after_grace() -> TestResult {
    let config = WatchdogConfig::builder()
        .timeout_ms(50)
        .check_interval_ms(10)
        .shutdown_grace_ms(30)
        .max_restarts(1)
        .build()?;
    let watchdog = PollWatchdog::new(config);

    let result = watchdog
        .supervise(&StopFlag::new(), |_ctx| async {
            // Ignores the stop flag entirely.
            tokio::time::sleep(Duration::from_secs(60)).await;
            CycleExit::Stopped
        })
        .await;

    assert_eq!(result, Err(WatchdogError::RestartLimitReached { restarts: 1 }));
    assert_eq!(watchdog.restarts(), 2);
    assert_eq!(watchdog.health().total_restarts, 2);
    Ok(())
}
