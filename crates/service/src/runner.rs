//! Watchdog-supervised poll cycle and the status display task.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use adaptive_trigger_dsx_protocol::{ControllerTransport, UdpTransport};
use adaptive_trigger_telemetry_adapters::create_source;
use adaptive_trigger_watchdog::{CycleContext, CycleExit, PollWatchdog, StopFlag};
use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigWatcher, DsxEndpoint, ServiceConfig};
use crate::slot::LatestFrameSlot;
use crate::supervisor::Supervisor;

/// Resolve the driver endpoint to a socket address.
///
/// # Errors
///
/// Returns an error if the host does not resolve.
pub async fn resolve_endpoint(endpoint: &DsxEndpoint) -> Result<SocketAddr> {
    tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .with_context(|| format!("Failed to resolve DSX endpoint {endpoint}"))?
        .next()
        .ok_or_else(|| anyhow!("DSX endpoint {endpoint} resolved to no address"))
}

/// Run the daemon until `shutdown` is raised.
///
/// `config_path`, when given, is watched for feedback changes.
///
/// # Errors
///
/// Endpoint resolution failures, a controller socket that cannot be opened,
/// or a watchdog that gives up on the poll cycle.
pub async fn run_service(
    config: ServiceConfig,
    config_path: Option<PathBuf>,
    shutdown: StopFlag,
) -> Result<()> {
    let target = resolve_endpoint(&config.dsx).await?;
    info!(game = %config.game, target = %target, "Starting adaptive trigger service");

    let slot = Arc::new(LatestFrameSlot::new());
    let display_stop = StopFlag::new();
    let display = tokio::spawn(run_status_display(
        Arc::clone(&slot),
        config.timing.status_interval(),
        display_stop.clone(),
    ));

    let watchdog = PollWatchdog::new(config.timing.watchdog());
    let result = watchdog
        .supervise(&shutdown, |ctx| {
            let config = config.clone();
            let config_path = config_path.clone();
            let slot = Arc::clone(&slot);
            async move {
                let transport = match UdpTransport::bind(target).await {
                    Ok(transport) => transport,
                    Err(e) => {
                        error!(target = %target, error = %e, "Cannot open controller socket");
                        return CycleExit::Fatal(e.to_string());
                    }
                };
                let tick_interval = config.timing.tick_interval();
                let watcher = config_path.map(|path| {
                    ConfigWatcher::new(path, config.timing.reload_interval(), config.feedback.clone())
                });
                let supervisor = Supervisor::new(
                    create_source(config.game),
                    transport,
                    config.timing,
                    config.feedback,
                )
                .with_frame_slot(slot);
                run_poll_cycle(ctx, supervisor, watcher, tick_interval).await
            }
        })
        .await;

    display_stop.request_stop();
    if let Err(e) = display.await {
        warn!(error = %e, "Status display task ended abnormally");
    }

    let health = watchdog.health();
    info!(
        restarts = watchdog.restarts(),
        health = %health.status,
        "Adaptive trigger service stopped"
    );
    result.context("Poll loop supervision ended")
}

/// One generation of the poll loop.
///
/// Checks the stop flag at the top of every iteration and beats the
/// heartbeat after every step, including while it waits between steps.
pub async fn run_poll_cycle<T: ControllerTransport>(
    ctx: CycleContext,
    mut supervisor: Supervisor<T>,
    mut watcher: Option<ConfigWatcher>,
    tick_interval: Duration,
) -> CycleExit {
    info!(generation = ctx.generation, "Poll cycle running");
    loop {
        if ctx.stop.is_stop_requested() {
            break;
        }
        let now = Instant::now();
        if let Some(watcher) = watcher.as_mut()
            && let Some(feedback) = watcher.poll(now).await
        {
            supervisor.set_feedback_config(feedback);
        }

        let delay = supervisor.tick(now).await;
        ctx.heartbeat.beat();
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else if sleep_with_heartbeat(&ctx, delay, tick_interval).await {
            break;
        }
    }
    supervisor.shutdown().await;
    CycleExit::Stopped
}

/// Sleep `total` in slices of at most `slice`, beating between slices.
///
/// Returns `true` when a stop was requested.
async fn sleep_with_heartbeat(ctx: &CycleContext, total: Duration, slice: Duration) -> bool {
    let slice = if slice.is_zero() { total } else { slice };
    let mut remaining = total;
    while !remaining.is_zero() {
        let step = remaining.min(slice);
        if ctx.stop.sleep(step).await {
            return true;
        }
        ctx.heartbeat.beat();
        remaining = remaining.saturating_sub(step);
    }
    ctx.stop.is_stop_requested()
}

/// Low-rate consumer of the latest frame, standing in for a dashboard.
pub async fn run_status_display(slot: Arc<LatestFrameSlot>, interval: Duration, stop: StopFlag) {
    while !stop.sleep(interval).await {
        match slot.take_latest() {
            Some(frame) => debug!(
                game = %frame.game(),
                speed_kmh = frame.ground_speed_kmh(),
                rpm = frame.rpm(),
                gear = frame.gear(),
                throttle = frame.throttle(),
                brake = frame.brake(),
                published = slot.published(),
                "Latest telemetry"
            ),
            None => trace!("No new telemetry"),
        }
    }
}
