//! Service configuration file and its hot-reload watcher.
//!
//! The file is YAML. Every section has serde defaults, so a partial file
//! loads and a missing file is replaced by the defaults on first start.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use adaptive_trigger_dsx_protocol::DEFAULT_DSX_PORT;
use adaptive_trigger_feedback_mapping::FeedbackConfig;
use adaptive_trigger_telemetry_core::GameId;
use adaptive_trigger_watchdog::{WatchdogConfig, WatchdogError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// File name used when no `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "adaptive-trigger.yaml";

/// Errors from loading, saving or validating the service configuration.
#[derive(Debug, Error)]
pub enum ServiceConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("invalid timing: {0}")]
    InvalidTiming(String),
}

impl ServiceConfigError {
    #[must_use]
    pub fn invalid_timing(reason: impl Into<String>) -> Self {
        Self::InvalidTiming(reason.into())
    }
}

impl From<WatchdogError> for ServiceConfigError {
    fn from(err: WatchdogError) -> Self {
        Self::InvalidTiming(err.to_string())
    }
}

pub type ServiceConfigResult<T> = Result<T, ServiceConfigError>;

/// Where the DSX driver listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DsxEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for DsxEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_DSX_PORT,
        }
    }
}

impl std::fmt::Display for DsxEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Poll loop cadences, timeouts and retry bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Target rate of the poll/transmit tick.
    pub tick_hz: u32,
    /// Silence after which a force-stop batch is sent.
    pub telemetry_timeout_ms: u64,
    /// How often the config file's modification time is checked.
    pub reload_interval_ms: u64,
    /// Sleep between game presence checks while no game runs.
    pub waiting_interval_ms: u64,
    /// First connect retry delay; doubles per failure.
    pub connect_backoff_ms: u64,
    /// Upper bound for the connect retry delay.
    pub connect_backoff_max_ms: u64,
    /// Soft misses tolerated in a row before the source is reopened.
    pub max_consecutive_misses: u32,
    /// How often game presence is re-checked while polling.
    pub process_check_interval_ms: u64,
    pub watchdog_timeout_ms: u64,
    pub watchdog_check_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Rate of the status display, in milliseconds between lines.
    pub status_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_hz: 100,
            telemetry_timeout_ms: 500,
            reload_interval_ms: 1500,
            waiting_interval_ms: 2000,
            connect_backoff_ms: 1000,
            connect_backoff_max_ms: 8000,
            max_consecutive_misses: 500,
            process_check_interval_ms: 1000,
            watchdog_timeout_ms: 2000,
            watchdog_check_interval_ms: 1000,
            shutdown_grace_ms: 1000,
            status_interval_ms: 1000,
        }
    }
}

impl TimingConfig {
    /// # Errors
    ///
    /// Returns an error if a rate or interval is zero, the backoff bounds are
    /// inverted, or the watchdog settings are inconsistent.
    pub fn validate(&self) -> ServiceConfigResult<()> {
        if self.tick_hz == 0 || self.tick_hz > 1000 {
            return Err(ServiceConfigError::invalid_timing(
                "tick_hz must be within 1..=1000",
            ));
        }
        for (name, value) in [
            ("telemetry_timeout_ms", self.telemetry_timeout_ms),
            ("reload_interval_ms", self.reload_interval_ms),
            ("waiting_interval_ms", self.waiting_interval_ms),
            ("connect_backoff_ms", self.connect_backoff_ms),
            ("process_check_interval_ms", self.process_check_interval_ms),
            ("status_interval_ms", self.status_interval_ms),
        ] {
            if value == 0 {
                return Err(ServiceConfigError::invalid_timing(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if self.connect_backoff_max_ms < self.connect_backoff_ms {
            return Err(ServiceConfigError::invalid_timing(
                "connect_backoff_max_ms must not be below connect_backoff_ms",
            ));
        }
        if self.max_consecutive_misses == 0 {
            return Err(ServiceConfigError::invalid_timing(
                "max_consecutive_misses must be greater than 0",
            ));
        }
        self.watchdog().validate()?;
        Ok(())
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_hz.max(1)
    }

    #[must_use]
    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }

    #[must_use]
    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms)
    }

    #[must_use]
    pub fn waiting_interval(&self) -> Duration {
        Duration::from_millis(self.waiting_interval_ms)
    }

    #[must_use]
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    #[must_use]
    pub fn connect_backoff_max(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_max_ms)
    }

    #[must_use]
    pub fn process_check_interval(&self) -> Duration {
        Duration::from_millis(self.process_check_interval_ms)
    }

    #[must_use]
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Watchdog settings derived from this timing block.
    #[must_use]
    pub fn watchdog(&self) -> WatchdogConfig {
        WatchdogConfig {
            timeout_ms: self.watchdog_timeout_ms,
            check_interval_ms: self.watchdog_check_interval_ms,
            shutdown_grace_ms: self.shutdown_grace_ms,
            max_restarts: None,
        }
    }
}

/// Everything the daemon reads from its config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub game: GameId,
    pub dsx: DsxEndpoint,
    pub feedback: FeedbackConfig,
    pub timing: TimingConfig,
}

impl ServiceConfig {
    /// Parse a YAML document. The feedback section comes back clamped.
    ///
    /// # Errors
    ///
    /// [`ServiceConfigError::Parse`] when the document is not valid YAML
    /// for this schema.
    pub fn from_yaml(content: &str, path: &Path) -> ServiceConfigResult<Self> {
        let mut config: ServiceConfig =
            serde_yaml::from_str(content).map_err(|source| ServiceConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.feedback = config.feedback.sanitized();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn to_yaml(&self) -> ServiceConfigResult<String> {
        serde_yaml::to_string(self).map_err(ServiceConfigError::Serialize)
    }

    /// Load configuration from `path`, writing the defaults there first if
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// I/O failures, parse failures, and timing values that fail
    /// [`TimingConfig::validate`].
    pub async fn load_from_path(path: impl AsRef<Path>) -> ServiceConfigResult<Self> {
        let path = path.as_ref();

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "Config file not found, creating default");
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ServiceConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_yaml(&content, path)?;
        config.timing.validate()?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Write the configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failures.
    pub async fn save_to_path(&self, path: impl AsRef<Path>) -> ServiceConfigResult<()> {
        let path = path.as_ref();
        let io_error = |source| ServiceConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let content = self.to_yaml()?;
        tokio::fs::write(path, content).await.map_err(io_error)?;

        debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}

/// Re-reads the feedback section when the config file changes.
///
/// Checked from the poll loop itself on a slow cadence; a new value replaces
/// the previous one wholesale.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    interval: Duration,
    next_check: Option<Instant>,
    last_modified: Option<SystemTime>,
    current: FeedbackConfig,
}

impl ConfigWatcher {
    /// Watch `path`, starting from `current`. The first poll always reads
    /// the file.
    pub fn new(path: impl Into<PathBuf>, interval: Duration, current: FeedbackConfig) -> Self {
        Self {
            path: path.into(),
            interval,
            next_check: None,
            last_modified: None,
            current,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> &FeedbackConfig {
        &self.current
    }

    /// Returns the new feedback config when the file changed since the last
    /// check and parsed cleanly. An unparsable file keeps the previous value.
    pub async fn poll(&mut self, now: Instant) -> Option<FeedbackConfig> {
        if self.next_check.is_some_and(|at| now < at) {
            return None;
        }
        self.next_check = now.checked_add(self.interval);

        let modified = match tokio::fs::metadata(&self.path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Config file not readable");
                return None;
            }
        };
        if self.last_modified == Some(modified) {
            return None;
        }
        self.last_modified = Some(modified);

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read changed config");
                return None;
            }
        };
        match ServiceConfig::from_yaml(&content, &self.path) {
            Ok(config) if config.feedback != self.current => {
                info!(path = %self.path.display(), "Feedback config reloaded");
                self.current = config.feedback.clone();
                Some(config.feedback)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Keeping previous feedback config");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_trigger_feedback_mapping::VibrationMode;
    use std::fs::File;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn touch_later(path: &Path, secs: u64) -> TestResult {
        File::options()
            .write(true)
            .open(path)?
            .set_modified(SystemTime::now() + Duration::from_secs(secs))?;
        Ok(())
    }

    #[test]
    fn test_defaults_are_valid() -> TestResult {
        let config = ServiceConfig::default();
        config.timing.validate()?;
        assert_eq!(config.dsx.port, 6969);
        assert_eq!(config.timing.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.game, GameId::AssettoCorsa);
        Ok(())
    }

    #[test]
    fn test_partial_yaml_fills_defaults_and_clamps() -> TestResult {
        let yaml = "game: richard_burns_rally\nfeedback:\n  trigger_strength: 9.0\n  vibration_mode: continuous\n";
        let config = ServiceConfig::from_yaml(yaml, Path::new("inline.yaml"))?;
        assert_eq!(config.game, GameId::RichardBurnsRally);
        assert_eq!(config.feedback.vibration_mode, VibrationMode::Continuous);
        assert!((config.feedback.trigger_strength - 5.0).abs() < f32::EPSILON);
        assert_eq!(config.dsx, DsxEndpoint::default());
        assert_eq!(config.timing, TimingConfig::default());
        Ok(())
    }

    #[test]
    fn test_timing_validation() {
        let zero_tick = TimingConfig {
            tick_hz: 0,
            ..TimingConfig::default()
        };
        assert!(zero_tick.validate().is_err());

        let inverted_backoff = TimingConfig {
            connect_backoff_ms: 4000,
            connect_backoff_max_ms: 1000,
            ..TimingConfig::default()
        };
        assert!(inverted_backoff.validate().is_err());

        let bad_watchdog = TimingConfig {
            watchdog_timeout_ms: 100,
            watchdog_check_interval_ms: 500,
            ..TimingConfig::default()
        };
        assert!(matches!(
            bad_watchdog.validate(),
            Err(ServiceConfigError::InvalidTiming(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_writes_defaults() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("config.yaml");

        let config = ServiceConfig::load_from_path(&path).await?;
        assert_eq!(config, ServiceConfig::default());
        assert!(path.exists());

        let reloaded = ServiceConfig::load_from_path(&path).await?;
        assert_eq!(reloaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_unparsable_file_is_an_error() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "feedback: [not, a, map").await?;
        let result = ServiceConfig::load_from_path(&path).await;
        assert!(matches!(result, Err(ServiceConfigError::Parse { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_watcher_swaps_changed_config() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.yaml");
        ServiceConfig::default().save_to_path(&path).await?;

        let mut watcher =
            ConfigWatcher::new(&path, Duration::from_millis(1500), FeedbackConfig::default());
        let start = Instant::now();
        assert_eq!(watcher.poll(start).await, None);

        let mut edited = ServiceConfig::default();
        edited.feedback.led_effect_enabled = false;
        edited.save_to_path(&path).await?;
        touch_later(&path, 10)?;

        // Not due yet.
        assert_eq!(watcher.poll(start + Duration::from_millis(100)).await, None);

        let reloaded = watcher
            .poll(start + Duration::from_millis(1600))
            .await
            .ok_or("expected a reload")?;
        assert!(!reloaded.led_effect_enabled);
        assert_eq!(watcher.current(), &reloaded);
        Ok(())
    }

    #[tokio::test]
    async fn test_watcher_keeps_previous_on_parse_error() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.yaml");
        ServiceConfig::default().save_to_path(&path).await?;

        let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(10), FeedbackConfig::default());
        tokio::fs::write(&path, "feedback: {trigger_strength: [1, 2]}").await?;
        touch_later(&path, 10)?;

        assert_eq!(watcher.poll(Instant::now()).await, None);
        assert_eq!(watcher.current(), &FeedbackConfig::default());
        Ok(())
    }
}
