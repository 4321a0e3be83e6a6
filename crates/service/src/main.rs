//! adaptive-triggerd - simulator telemetry to DSX adaptive trigger feedback

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use adaptive_trigger_dsx_protocol::UdpTransport;
use adaptive_trigger_service::{
    DEFAULT_CONFIG_FILE, ServiceConfig, ServiceConfigError, resolve_endpoint, run_probe,
    run_service,
};
use adaptive_trigger_telemetry_core::GameId;
use adaptive_trigger_watchdog::StopFlag;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "adaptive-triggerd")]
#[command(about = "Turns racing simulator telemetry into DualSense adaptive trigger, LED and haptic feedback via DSX")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file, created with defaults when missing
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the telemetry poll loop (default)
    Run {
        /// Game to read, overriding the config file (assetto_corsa, ac, richard_burns_rally, rbr)
        #[arg(long)]
        game: Option<GameId>,
    },

    /// Send a test pattern to the controller without a running game
    Probe {
        /// Delay between probe steps in milliseconds
        #[arg(long, default_value_t = 500)]
        delay_ms: u64,

        /// DSX host, overriding the config file
        #[arg(long)]
        host: Option<String>,

        /// DSX port, overriding the config file
        #[arg(long)]
        port: Option<u16>,

        /// How long to wait for a status reply after the last step
        #[arg(long, default_value_t = 1000)]
        response_timeout_ms: u64,
    },

    /// Print the effective configuration as YAML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command.unwrap_or(Commands::Run { game: None }) {
        Commands::Run { game } => {
            let mut config = load_config(&cli.config).await?;
            if let Some(game) = game {
                config.game = game;
            }
            info!(version = env!("CARGO_PKG_VERSION"), config = %cli.config.display(), "adaptive-triggerd starting");

            let shutdown = StopFlag::new();
            let signal_flag = shutdown.clone();
            tokio::spawn(async move {
                match wait_for_shutdown_signal().await {
                    Ok(()) => signal_flag.request_stop(),
                    Err(e) => error!(error = %e, "Failed to listen for shutdown signals"),
                }
            });

            run_service(config, Some(cli.config), shutdown).await
        }
        Commands::Probe {
            delay_ms,
            host,
            port,
            response_timeout_ms,
        } => {
            let mut config = load_config(&cli.config).await?;
            if let Some(host) = host {
                config.dsx.host = host;
            }
            if let Some(port) = port {
                config.dsx.port = port;
            }
            probe(&config, Duration::from_millis(delay_ms), Duration::from_millis(response_timeout_ms)).await
        }
        Commands::PrintConfig => {
            let config = load_config(&cli.config).await?;
            print!("{}", config.to_yaml().context("Failed to render config")?);
            Ok(())
        }
    }
}

/// Load the config file. A file that does not parse falls back to defaults.
async fn load_config(path: &Path) -> Result<ServiceConfig> {
    match ServiceConfig::load_from_path(path).await {
        Ok(config) => Ok(config),
        Err(e @ ServiceConfigError::Parse { .. }) => {
            warn!(error = %e, "Using default configuration");
            Ok(ServiceConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config {}", path.display())),
    }
}

async fn probe(config: &ServiceConfig, step_delay: Duration, response_timeout: Duration) -> Result<()> {
    let target = resolve_endpoint(&config.dsx).await?;
    let transport = UdpTransport::bind(target)
        .await
        .context("Failed to open controller socket")?;

    println!("Probing DSX at {target}");
    let report = run_probe(&transport, &config.feedback, step_delay, response_timeout).await;
    println!(
        "Sent {} probe batches ({} failed)",
        report.batches_sent, report.failures
    );

    match &report.reply {
        Some(response) => println!("DSX replied: {response}"),
        None => println!("No reply from DSX within {} ms", response_timeout.as_millis()),
    }

    if !report.all_sent() {
        bail!("{} probe batches could not be sent", report.failures);
    }
    Ok(())
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(())
    }
}
