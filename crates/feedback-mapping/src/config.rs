//! Operator-set feedback configuration.
//!
//! A [`FeedbackConfig`] is an immutable value: the service replaces it as a
//! whole on reload and hands the current value to the mapper every tick.

use adaptive_trigger_dsx_protocol::TriggerMode;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

pub const TRIGGER_STRENGTH_RANGE: RangeInclusive<f32> = 0.1..=5.0;
pub const HAPTIC_STRENGTH_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const SLIP_THRESHOLD_RANGE: RangeInclusive<f32> = 1.0..=50.0;
pub const GATE_SPEED_RANGE: RangeInclusive<f32> = 0.5..=30.0;
pub const LED_THRESHOLD_RANGE: RangeInclusive<f32> = 0.0..=100.0;

/// Trigger strength accepted by every driver revision.
pub const STANDARD_STRENGTH_RANGE: (u8, u8) = (1, 8);
/// Experimental range some driver revisions accept.
pub const EXTENDED_STRENGTH_RANGE: (u8, u8) = (1, 255);

pub const DEFAULT_HAPTIC_RESOURCE: &str = "haptics/rumble_mid_4c.wav";

/// Errors from validating a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("LED thresholds must ascend: green {green} <= yellow {yellow} <= red {red}")]
    UnorderedLedThresholds { green: f32, yellow: f32, red: f32 },

    #[error("haptic resource path is empty")]
    EmptyHapticResource,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How an active trigger vibrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VibrationMode {
    Continuous,
    #[default]
    Pulse,
}

impl VibrationMode {
    #[must_use]
    pub const fn trigger_mode(self) -> TriggerMode {
        match self {
            Self::Continuous => TriggerMode::VibrateTrigger,
            Self::Pulse => TriggerMode::VibrateTriggerPulse,
        }
    }
}

/// RPM percentages where the LED gradient changes segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedThresholds {
    pub green: f32,
    pub yellow: f32,
    pub red: f32,
}

impl Default for LedThresholds {
    fn default() -> Self {
        Self {
            green: 60.0,
            yellow: 80.0,
            red: 95.0,
        }
    }
}

impl LedThresholds {
    /// Clamp each breakpoint to 0-100 and sort them ascending.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let mut points = [
            clamp_or(self.green, LED_THRESHOLD_RANGE, defaults.green),
            clamp_or(self.yellow, LED_THRESHOLD_RANGE, defaults.yellow),
            clamp_or(self.red, LED_THRESHOLD_RANGE, defaults.red),
        ];
        points.sort_by(f32::total_cmp);
        let [green, yellow, red] = points;
        Self { green, yellow, red }
    }

    fn is_ordered(&self) -> bool {
        self.green <= self.yellow && self.yellow <= self.red
    }
}

/// Thresholds, multipliers and feature switches for feedback mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Multiplier applied to every computed trigger strength.
    pub trigger_strength: f32,
    /// Multiplier applied to rumble intensity.
    pub haptic_strength: f32,
    /// Slip percentage above which a trigger starts vibrating.
    pub wheel_slip_threshold: f32,
    /// Slip percentage above which haptic rumble starts.
    pub trigger_threshold: f32,
    pub vibration_mode: VibrationMode,
    pub extended_strength_range: bool,
    pub adaptive_trigger_enabled: bool,
    pub led_effect_enabled: bool,
    pub haptic_effect_enabled: bool,
    pub led_thresholds: LedThresholds,
    /// Ground speed at or below which slip is not evaluated.
    pub gate_speed_kmh: f32,
    /// Audio file the driver loops for rumble.
    pub haptic_resource: String,
    pub controller_index: u8,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            trigger_strength: 1.0,
            haptic_strength: 0.5,
            wheel_slip_threshold: 10.0,
            trigger_threshold: 10.0,
            vibration_mode: VibrationMode::Pulse,
            extended_strength_range: false,
            adaptive_trigger_enabled: true,
            led_effect_enabled: true,
            haptic_effect_enabled: true,
            led_thresholds: LedThresholds::default(),
            gate_speed_kmh: 5.0,
            haptic_resource: DEFAULT_HAPTIC_RESOURCE.to_string(),
            controller_index: 0,
        }
    }
}

impl FeedbackConfig {
    #[must_use]
    pub fn builder() -> FeedbackConfigBuilder {
        FeedbackConfigBuilder::default()
    }

    /// Inclusive strength bounds for trigger updates.
    #[must_use]
    pub const fn strength_range(&self) -> (u8, u8) {
        if self.extended_strength_range {
            EXTENDED_STRENGTH_RANGE
        } else {
            STANDARD_STRENGTH_RANGE
        }
    }

    /// Copy with every numeric field pulled into its safe range.
    ///
    /// Non-finite values fall back to the default for that field.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            trigger_strength: clamp_or(
                self.trigger_strength,
                TRIGGER_STRENGTH_RANGE,
                defaults.trigger_strength,
            ),
            haptic_strength: clamp_or(
                self.haptic_strength,
                HAPTIC_STRENGTH_RANGE,
                defaults.haptic_strength,
            ),
            wheel_slip_threshold: clamp_or(
                self.wheel_slip_threshold,
                SLIP_THRESHOLD_RANGE,
                defaults.wheel_slip_threshold,
            ),
            trigger_threshold: clamp_or(
                self.trigger_threshold,
                SLIP_THRESHOLD_RANGE,
                defaults.trigger_threshold,
            ),
            led_thresholds: self.led_thresholds.sanitized(),
            gate_speed_kmh: clamp_or(self.gate_speed_kmh, GATE_SPEED_RANGE, defaults.gate_speed_kmh),
            haptic_resource: if self.haptic_resource.trim().is_empty() {
                defaults.haptic_resource
            } else {
                self.haptic_resource
            },
            ..self
        }
    }

    /// Check every field without modifying anything.
    ///
    /// # Errors
    ///
    /// The first field found outside its range.
    pub fn validate(&self) -> ConfigResult<()> {
        check_range("trigger_strength", self.trigger_strength, TRIGGER_STRENGTH_RANGE)?;
        check_range("haptic_strength", self.haptic_strength, HAPTIC_STRENGTH_RANGE)?;
        check_range(
            "wheel_slip_threshold",
            self.wheel_slip_threshold,
            SLIP_THRESHOLD_RANGE,
        )?;
        check_range("trigger_threshold", self.trigger_threshold, SLIP_THRESHOLD_RANGE)?;
        check_range("gate_speed_kmh", self.gate_speed_kmh, GATE_SPEED_RANGE)?;
        let leds = &self.led_thresholds;
        check_range("led_thresholds.green", leds.green, LED_THRESHOLD_RANGE)?;
        check_range("led_thresholds.yellow", leds.yellow, LED_THRESHOLD_RANGE)?;
        check_range("led_thresholds.red", leds.red, LED_THRESHOLD_RANGE)?;
        if !leds.is_ordered() {
            return Err(ConfigError::UnorderedLedThresholds {
                green: leds.green,
                yellow: leds.yellow,
                red: leds.red,
            });
        }
        if self.haptic_resource.trim().is_empty() {
            return Err(ConfigError::EmptyHapticResource);
        }
        Ok(())
    }
}

fn clamp_or(value: f32, range: RangeInclusive<f32>, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(*range.start(), *range.end())
    } else {
        fallback
    }
}

fn check_range(field: &'static str, value: f32, range: RangeInclusive<f32>) -> ConfigResult<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Builder for [`FeedbackConfig`].
#[derive(Debug, Default)]
pub struct FeedbackConfigBuilder {
    config: FeedbackConfig,
}

impl FeedbackConfigBuilder {
    #[must_use]
    pub fn trigger_strength(mut self, multiplier: f32) -> Self {
        self.config.trigger_strength = multiplier;
        self
    }

    #[must_use]
    pub fn haptic_strength(mut self, multiplier: f32) -> Self {
        self.config.haptic_strength = multiplier;
        self
    }

    #[must_use]
    pub fn wheel_slip_threshold(mut self, percent: f32) -> Self {
        self.config.wheel_slip_threshold = percent;
        self
    }

    #[must_use]
    pub fn trigger_threshold(mut self, percent: f32) -> Self {
        self.config.trigger_threshold = percent;
        self
    }

    #[must_use]
    pub fn vibration_mode(mut self, mode: VibrationMode) -> Self {
        self.config.vibration_mode = mode;
        self
    }

    #[must_use]
    pub fn extended_strength_range(mut self, enabled: bool) -> Self {
        self.config.extended_strength_range = enabled;
        self
    }

    #[must_use]
    pub fn adaptive_trigger_enabled(mut self, enabled: bool) -> Self {
        self.config.adaptive_trigger_enabled = enabled;
        self
    }

    #[must_use]
    pub fn led_effect_enabled(mut self, enabled: bool) -> Self {
        self.config.led_effect_enabled = enabled;
        self
    }

    #[must_use]
    pub fn haptic_effect_enabled(mut self, enabled: bool) -> Self {
        self.config.haptic_effect_enabled = enabled;
        self
    }

    #[must_use]
    pub fn led_thresholds(mut self, green: f32, yellow: f32, red: f32) -> Self {
        self.config.led_thresholds = LedThresholds { green, yellow, red };
        self
    }

    #[must_use]
    pub fn gate_speed_kmh(mut self, kmh: f32) -> Self {
        self.config.gate_speed_kmh = kmh;
        self
    }

    #[must_use]
    pub fn haptic_resource(mut self, path: impl Into<String>) -> Self {
        self.config.haptic_resource = path.into();
        self
    }

    #[must_use]
    pub fn controller_index(mut self, index: u8) -> Self {
        self.config.controller_index = index;
        self
    }

    /// # Errors
    ///
    /// Returns an error if any field is out of range.
    pub fn build(self) -> ConfigResult<FeedbackConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
