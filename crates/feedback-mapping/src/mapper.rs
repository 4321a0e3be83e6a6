//! Deterministic mapping from one frame to one instruction batch.

use crate::config::FeedbackConfig;
use crate::haptics::{plan_rumble, stop_instruction};
use crate::led::{LED_OFF, rpm_color};
use crate::slip::SlipMetrics;
use crate::state::{FeedbackState, TriggerSetting, TriggerState};
use adaptive_trigger_dsx_protocol::{
    ControllerInstruction, InstructionBatch, Trigger, TriggerMode,
};
use adaptive_trigger_telemetry_core::TelemetryFrame;
use tracing::trace;

/// Brake pedal percent above which front lock is felt on the left trigger.
pub const BRAKE_ACTIVATION_PERCENT: f32 = 30.0;
/// Throttle percent above which wheelspin is felt on the right trigger.
pub const THROTTLE_ACTIVATION_PERCENT: f32 = 50.0;
/// Handbrake percent that arms the rear-lock rule.
pub const HANDBRAKE_ACTIVATION_PERCENT: f32 = 30.0;
/// Brake percent that arms the rear-lock rule without the handbrake.
pub const HEAVY_BRAKE_PERCENT: f32 = 80.0;
/// Throttle percent required by the rear-lock rule.
pub const REAR_LOCK_THROTTLE_PERCENT: f32 = 30.0;

/// Output of one mapping step.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedTick {
    pub batch: InstructionBatch,
    /// State to pass as `previous` on the next tick.
    pub state: FeedbackState,
}

/// Maps frames to instruction batches.
///
/// The mapper holds no state of its own. The same frame, slip, config and
/// previous state always give the same batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackMapper;

impl FeedbackMapper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build the batch for one tick.
    ///
    /// Instruction order is: trigger updates (left, right), RGB, haptics.
    #[must_use]
    pub fn map(
        &self,
        frame: &TelemetryFrame,
        slip: &SlipMetrics,
        config: &FeedbackConfig,
        previous: &FeedbackState,
    ) -> MappedTick {
        let mut batch = InstructionBatch::new();
        let controller = config.controller_index;

        let triggers = if config.adaptive_trigger_enabled {
            let triggers = self.trigger_state(frame, slip, config);
            push_triggers(&mut batch, controller, &triggers);
            triggers
        } else {
            // Release triggers once when the feature is switched off.
            if !previous.triggers.is_released() {
                push_triggers(&mut batch, controller, &TriggerState::default());
            }
            TriggerState::default()
        };
        if triggers != previous.triggers {
            trace!(left = ?triggers.left, right = ?triggers.right, "trigger state changed");
        }

        if config.led_effect_enabled {
            let (red, green, blue) = rpm_color(frame.rpm_percent(), &config.led_thresholds);
            batch.push(ControllerInstruction::rgb(controller, red, green, blue));
        }

        let rumble = plan_rumble(slip, config, previous.rumble, frame.timestamp_ns(), &mut batch);

        MappedTick {
            batch,
            state: FeedbackState { triggers, rumble },
        }
    }

    /// Trigger settings for one frame, by rule precedence.
    #[must_use]
    pub fn trigger_state(
        &self,
        frame: &TelemetryFrame,
        slip: &SlipMetrics,
        config: &FeedbackConfig,
    ) -> TriggerState {
        let baseline = TriggerSetting {
            mode: TriggerMode::Normal,
            strength: quantize_strength(config.trigger_strength, config),
        };
        let mut state = TriggerState {
            left: baseline,
            right: baseline,
        };

        if frame.ground_speed_kmh() <= config.gate_speed_kmh {
            return state;
        }

        let threshold = config.wheel_slip_threshold;
        let vibrate = |severity: f32| TriggerSetting {
            mode: config.vibration_mode.trigger_mode(),
            strength: severity_strength(severity, config),
        };

        if frame.brake() > BRAKE_ACTIVATION_PERCENT && slip.max_lock > threshold {
            state.left = vibrate(slip.max_lock);
        }

        if frame.throttle() > THROTTLE_ACTIVATION_PERCENT && slip.max_spin > threshold {
            state.right = vibrate(slip.max_spin);
        } else if slip.rear_lock() > threshold
            && (frame.handbrake() > HANDBRAKE_ACTIVATION_PERCENT || frame.brake() > HEAVY_BRAKE_PERCENT)
            && frame.throttle() > REAR_LOCK_THROTTLE_PERCENT
        {
            state.right = vibrate(slip.rear_lock());
        }

        state
    }

    /// Triggers to Normal, LED off, and a rumble stop if rumble was playing.
    #[must_use]
    pub fn reset_batch(&self, config: &FeedbackConfig, rumble_active: bool) -> InstructionBatch {
        let mut batch = InstructionBatch::new();
        push_triggers(&mut batch, config.controller_index, &TriggerState::default());
        let (red, green, blue) = LED_OFF;
        batch.push(ControllerInstruction::rgb(config.controller_index, red, green, blue));
        if rumble_active {
            batch.push(stop_instruction(config));
        }
        batch
    }

    /// Rumble stop, Normal triggers and LED off, sent once when telemetry
    /// stalls mid-session, such as when the driver is back in the menus.
    #[must_use]
    pub fn force_stop_batch(&self, config: &FeedbackConfig) -> InstructionBatch {
        let mut batch = InstructionBatch::new().with(stop_instruction(config));
        push_triggers(&mut batch, config.controller_index, &TriggerState::default());
        let (red, green, blue) = LED_OFF;
        batch.push(ControllerInstruction::rgb(config.controller_index, red, green, blue));
        batch
    }
}

fn push_triggers(batch: &mut InstructionBatch, controller: u8, state: &TriggerState) {
    for (trigger, setting) in [(Trigger::Left, state.left), (Trigger::Right, state.right)] {
        batch.push(ControllerInstruction::trigger(
            controller,
            trigger,
            setting.mode,
            setting.strength,
        ));
    }
}

/// `clamp(2 + severity / 10, min, max) * trigger_strength`, quantized.
fn severity_strength(severity: f32, config: &FeedbackConfig) -> u8 {
    let (min, max) = config.strength_range();
    let base = (2.0 + severity / 10.0).clamp(f32::from(min), f32::from(max));
    quantize_strength(base * config.trigger_strength, config)
}

/// Round to the nearest integer and clamp into the configured range.
/// Never returns zero.
#[expect(
    clippy::cast_possible_truncation,
    reason = "value is rounded and clamped to the u8 strength range before the cast"
)]
#[must_use]
pub fn quantize_strength(raw: f32, config: &FeedbackConfig) -> u8 {
    let (min, max) = config.strength_range();
    if !raw.is_finite() {
        return min;
    }
    let clamped = raw.round().clamp(f32::from(min), f32::from(max));
    u8::try_from(clamped as i32).unwrap_or(max).max(min)
}
