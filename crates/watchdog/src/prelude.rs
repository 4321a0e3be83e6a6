//! Prelude module for convenient imports

pub use crate::error::{WatchdogError, WatchdogResult};
pub use crate::health::{HealthCheck, HealthStatus};
pub use crate::heartbeat::{Heartbeat, StopFlag};
pub use crate::watchdog::{
    CycleContext, CycleExit, PollWatchdog, WatchdogConfig, WatchdogConfigBuilder,
};
