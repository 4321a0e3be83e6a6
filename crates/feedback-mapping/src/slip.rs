//! Per-wheel slip and lock analysis.

use adaptive_trigger_telemetry_core::{TelemetryFrame, WheelPosition};

/// Default ground speed at or below which slip is not evaluated.
pub const DEFAULT_GATE_SPEED_KMH: f32 = 5.0;

/// Slip derived from one frame.
///
/// `slip_percent` is signed: positive is wheelspin, negative is lock.
/// `max_spin` and `max_lock` are both non-negative magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlipMetrics {
    pub slip_percent: [f32; 4],
    pub front_average: f32,
    pub rear_average: f32,
    pub max_spin: f32,
    pub max_lock: f32,
}

impl SlipMetrics {
    #[must_use]
    pub fn slip(&self, wheel: WheelPosition) -> f32 {
        self.slip_percent.get(wheel.index()).copied().unwrap_or(0.0)
    }

    /// Largest lock magnitude on the rear axle.
    #[must_use]
    pub fn rear_lock(&self) -> f32 {
        lock_magnitude(self.slip(WheelPosition::RearLeft))
            .max(lock_magnitude(self.slip(WheelPosition::RearRight)))
    }

    /// Larger of spin and lock.
    #[must_use]
    pub fn severity(&self) -> f32 {
        self.max_spin.max(self.max_lock)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.slip_percent.iter().all(|slip| slip.abs() <= f32::EPSILON)
    }
}

fn lock_magnitude(slip: f32) -> f32 {
    if slip < 0.0 { -slip } else { 0.0 }
}

/// Computes [`SlipMetrics`] with a hard low-speed gate.
#[derive(Debug, Clone, Copy)]
pub struct SlipAnalyzer {
    gate_speed_kmh: f32,
}

impl Default for SlipAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_SPEED_KMH)
    }
}

impl SlipAnalyzer {
    #[must_use]
    pub fn new(gate_speed_kmh: f32) -> Self {
        Self { gate_speed_kmh }
    }

    #[must_use]
    pub fn gate_speed_kmh(&self) -> f32 {
        self.gate_speed_kmh
    }

    /// At or below the gate every wheel reports zero slip. Above it,
    /// `slip = (wheel / ground - 1) * 100`.
    #[must_use]
    pub fn analyze(&self, frame: &TelemetryFrame) -> SlipMetrics {
        let ground = frame.ground_speed_kmh();
        if !ground.is_finite() || ground <= self.gate_speed_kmh {
            return SlipMetrics::default();
        }

        let slip_percent = WheelPosition::ALL.map(|wheel| {
            let wheel_speed = frame.wheel_speed(wheel);
            if wheel_speed.is_finite() {
                (wheel_speed / ground - 1.0) * 100.0
            } else {
                0.0
            }
        });
        let [fl, fr, rl, rr] = slip_percent;

        let max_spin = slip_percent.iter().fold(0.0_f32, |acc, slip| acc.max(*slip));
        let max_lock = slip_percent
            .iter()
            .fold(0.0_f32, |acc, slip| acc.max(lock_magnitude(*slip)));

        SlipMetrics {
            slip_percent,
            front_average: (fl.abs() + fr.abs()) / 2.0,
            rear_average: (rl.abs() + rr.abs()) / 2.0,
            max_spin,
            max_lock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_trigger_telemetry_core::GameId;

    fn frame(ground: f32, wheels: [f32; 4]) -> TelemetryFrame {
        TelemetryFrame::builder(GameId::RichardBurnsRally)
            .ground_speed_kmh(ground)
            .wheel_speed_kmh(wheels)
            .build()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn test_front_lock() {
        let metrics = SlipAnalyzer::default().analyze(&frame(60.0, [50.0, 50.0, 70.0, 70.0]));
        assert!(close(metrics.slip(WheelPosition::FrontLeft), -16.67));
        assert!(close(metrics.slip(WheelPosition::RearRight), 16.67));
        assert!(close(metrics.max_lock, 16.67));
        assert!(close(metrics.max_spin, 16.67));
        assert!(close(metrics.front_average, 16.67));
        assert!(close(metrics.rear_average, 16.67));
        assert!(metrics.rear_lock().abs() < f32::EPSILON);
    }

    #[test]
    fn test_gate_is_inclusive() {
        let analyzer = SlipAnalyzer::new(5.0);
        let metrics = analyzer.analyze(&frame(5.0, [0.0, 0.0, 90.0, 90.0]));
        assert!(metrics.is_zero());
        assert_eq!(metrics, SlipMetrics::default());

        let metrics = analyzer.analyze(&frame(5.01, [0.0, 0.0, 90.0, 90.0]));
        assert!(!metrics.is_zero());
    }

    #[test]
    fn test_rear_lock_only_counts_rear_axle() {
        let metrics = SlipAnalyzer::default().analyze(&frame(50.0, [25.0, 50.0, 40.0, 30.0]));
        assert!(close(metrics.max_lock, 50.0));
        assert!(close(metrics.rear_lock(), 40.0));
        assert!(metrics.max_spin.abs() < f32::EPSILON);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_gated_speeds_give_zero_slip(
                ground in 0.0f32..=5.0,
                wheels in proptest::array::uniform4(0.0f32..400.0),
            ) {
                let metrics = SlipAnalyzer::default().analyze(&frame(ground, wheels));
                prop_assert!(metrics.is_zero());
                prop_assert!(metrics.max_spin.abs() < f32::EPSILON);
                prop_assert!(metrics.max_lock.abs() < f32::EPSILON);
            }

            #[test]
            fn prop_magnitudes_are_non_negative(
                ground in 5.1f32..400.0,
                wheels in proptest::array::uniform4(0.0f32..400.0),
            ) {
                let metrics = SlipAnalyzer::default().analyze(&frame(ground, wheels));
                prop_assert!(metrics.max_spin >= 0.0);
                prop_assert!(metrics.max_lock >= 0.0);
                prop_assert!(metrics.max_lock <= 100.0 + 1e-3);
                prop_assert!(metrics.severity() >= metrics.max_lock);
            }
        }
    }
}
