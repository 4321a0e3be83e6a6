//! Canonical per-tick telemetry snapshot.

use serde::{Deserialize, Serialize};

use crate::GameId;

/// Wheel index order used by every per-wheel array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelPosition {
    FrontLeft = 0,
    FrontRight = 1,
    RearLeft = 2,
    RearRight = 3,
}

impl WheelPosition {
    pub const ALL: [WheelPosition; 4] = [
        WheelPosition::FrontLeft,
        WheelPosition::FrontRight,
        WheelPosition::RearLeft,
        WheelPosition::RearRight,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_front(self) -> bool {
        matches!(self, WheelPosition::FrontLeft | WheelPosition::FrontRight)
    }
}

/// One normalized telemetry sample.
///
/// Speeds are km/h, pedals are percent (0-100), steering is -1..1 and
/// temperatures are Celsius. Gear uses -1 for reverse and 0 for neutral.
///
/// Built only through [`TelemetryFrameBuilder`] and read-only afterwards:
///
/// ```compile_fail
/// use adaptive_trigger_telemetry_core::{GameId, TelemetryFrame};
///
/// let mut frame = TelemetryFrame::builder(GameId::AssettoCorsa).throttle(40.0).build();
/// frame.throttle = 250.0;
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryFrame {
    game: GameId,
    packet_sequence: u64,
    timestamp_ns: u64,
    ground_speed_kmh: f32,
    /// FL, FR, RL, RR.
    wheel_speed_kmh: [f32; 4],
    rpm: f32,
    /// Redline of the current car, used for the RPM LED.
    max_rpm: f32,
    gear: i8,
    throttle: f32,
    brake: f32,
    handbrake: f32,
    clutch: f32,
    steering: f32,
    water_temp_c: Option<f32>,
    tyre_core_temp_c: Option<[f32; 4]>,
    race_time_s: Option<f32>,
}

impl TelemetryFrame {
    pub fn builder(game: GameId) -> TelemetryFrameBuilder {
        TelemetryFrameBuilder::new(game)
    }

    pub fn game(&self) -> GameId {
        self.game
    }

    pub fn packet_sequence(&self) -> u64 {
        self.packet_sequence
    }

    /// Monotonic capture time.
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn ground_speed_kmh(&self) -> f32 {
        self.ground_speed_kmh
    }

    /// FL, FR, RL, RR.
    pub fn wheel_speed_kmh(&self) -> [f32; 4] {
        self.wheel_speed_kmh
    }

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    pub fn max_rpm(&self) -> f32 {
        self.max_rpm
    }

    pub fn gear(&self) -> i8 {
        self.gear
    }

    pub fn throttle(&self) -> f32 {
        self.throttle
    }

    pub fn brake(&self) -> f32 {
        self.brake
    }

    pub fn handbrake(&self) -> f32 {
        self.handbrake
    }

    pub fn clutch(&self) -> f32 {
        self.clutch
    }

    pub fn steering(&self) -> f32 {
        self.steering
    }

    pub fn water_temp_c(&self) -> Option<f32> {
        self.water_temp_c
    }

    pub fn tyre_core_temp_c(&self) -> Option<[f32; 4]> {
        self.tyre_core_temp_c
    }

    pub fn race_time_s(&self) -> Option<f32> {
        self.race_time_s
    }

    pub fn wheel_speed(&self, wheel: WheelPosition) -> f32 {
        self.wheel_speed_kmh
            .get(wheel.index())
            .copied()
            .unwrap_or(0.0)
    }

    /// `rpm / max_rpm` as a percentage capped at 100, `None` when unusable.
    pub fn rpm_percent(&self) -> Option<f32> {
        if self.rpm <= 0.0 || self.max_rpm <= 0.0 {
            return None;
        }
        Some((self.rpm / self.max_rpm * 100.0).min(100.0))
    }
}

/// Validating builder for [`TelemetryFrame`].
///
/// Non-finite inputs are ignored, pedals are clamped to 0-100 and steering
/// to -1..1, so a built frame never carries NaN or out-of-range inputs.
#[derive(Debug, Clone)]
pub struct TelemetryFrameBuilder {
    frame: TelemetryFrame,
}

impl TelemetryFrameBuilder {
    pub fn new(game: GameId) -> Self {
        Self {
            frame: TelemetryFrame {
                game,
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn packet_sequence(mut self, sequence: u64) -> Self {
        self.frame.packet_sequence = sequence;
        self
    }

    #[must_use]
    pub fn timestamp_ns(mut self, timestamp_ns: u64) -> Self {
        self.frame.timestamp_ns = timestamp_ns;
        self
    }

    #[must_use]
    pub fn ground_speed_kmh(mut self, value: f32) -> Self {
        if value.is_finite() {
            self.frame.ground_speed_kmh = value.max(0.0);
        }
        self
    }

    #[must_use]
    pub fn wheel_speed_kmh(mut self, values: [f32; 4]) -> Self {
        self.frame.wheel_speed_kmh = values.map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
        self
    }

    #[must_use]
    pub fn rpm(mut self, value: f32) -> Self {
        if value.is_finite() {
            self.frame.rpm = value.max(0.0);
        }
        self
    }

    #[must_use]
    pub fn max_rpm(mut self, value: f32) -> Self {
        if value.is_finite() && value > 0.0 {
            self.frame.max_rpm = value;
        }
        self
    }

    #[must_use]
    pub fn gear(mut self, value: i8) -> Self {
        self.frame.gear = value;
        self
    }

    #[must_use]
    pub fn throttle(mut self, percent: f32) -> Self {
        self.frame.throttle = clamp_percent(percent);
        self
    }

    #[must_use]
    pub fn brake(mut self, percent: f32) -> Self {
        self.frame.brake = clamp_percent(percent);
        self
    }

    #[must_use]
    pub fn handbrake(mut self, percent: f32) -> Self {
        self.frame.handbrake = clamp_percent(percent);
        self
    }

    #[must_use]
    pub fn clutch(mut self, percent: f32) -> Self {
        self.frame.clutch = clamp_percent(percent);
        self
    }

    #[must_use]
    pub fn steering(mut self, value: f32) -> Self {
        if value.is_finite() {
            self.frame.steering = value.clamp(-1.0, 1.0);
        }
        self
    }

    #[must_use]
    pub fn water_temp_c(mut self, value: f32) -> Self {
        if value.is_finite() {
            self.frame.water_temp_c = Some(value);
        }
        self
    }

    #[must_use]
    pub fn tyre_core_temp_c(mut self, values: [f32; 4]) -> Self {
        if values.iter().all(|v| v.is_finite()) {
            self.frame.tyre_core_temp_c = Some(values);
        }
        self
    }

    #[must_use]
    pub fn race_time_s(mut self, value: f32) -> Self {
        if value.is_finite() && value >= 0.0 {
            self.frame.race_time_s = Some(value);
        }
        self
    }

    pub fn build(self) -> TelemetryFrame {
        self.frame
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
