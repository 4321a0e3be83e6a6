//! Prelude module for convenient imports

pub use crate::config::{
    ConfigError, ConfigResult, FeedbackConfig, FeedbackConfigBuilder, LedThresholds, VibrationMode,
};
pub use crate::haptics::{SEVERE_SLIP_PERCENT, rumble_intensity};
pub use crate::led::{LED_OFF, Rgb, rpm_color};
pub use crate::mapper::{FeedbackMapper, MappedTick, quantize_strength};
pub use crate::slip::{SlipAnalyzer, SlipMetrics};
pub use crate::state::{FeedbackState, RumbleState, TriggerSetting, TriggerState};
