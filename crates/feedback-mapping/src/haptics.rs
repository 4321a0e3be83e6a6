//! Rumble planning for the controller's haptic actuators.
//!
//! Rumble is a looping audio clip the driver plays. A start instruction
//! begins the loop, every active tick adjusts its volume, and a stop
//! instruction ends it. Very severe slip adds a short one-shot burst on top.

use crate::config::FeedbackConfig;
use crate::slip::SlipMetrics;
use crate::state::RumbleState;
use adaptive_trigger_dsx_protocol::{AudioEditKind, ControllerInstruction, InstructionBatch};

/// Slip percentage above which a one-shot burst is added.
pub const SEVERE_SLIP_PERCENT: f32 = 40.0;
/// Minimum spacing between bursts.
pub const BURST_INTERVAL_NS: u64 = 300_000_000;
/// Slip range over which intensity rises from 0 to full.
const INTENSITY_SPAN_PERCENT: f32 = 50.0;

/// Rumble volume in 0..=`haptic_strength`.
#[must_use]
pub fn rumble_intensity(slip: &SlipMetrics, config: &FeedbackConfig) -> f32 {
    let threshold = config.trigger_threshold;
    let ramp = |severity: f32| ((severity - threshold) / INTENSITY_SPAN_PERCENT).clamp(0.0, 1.0);
    ramp(slip.max_spin).max(ramp(slip.max_lock)) * config.haptic_strength
}

#[must_use]
pub fn is_rumbling(slip: &SlipMetrics, config: &FeedbackConfig) -> bool {
    slip.max_spin > config.trigger_threshold || slip.max_lock > config.trigger_threshold
}

/// Instruction that ends the rumble loop.
#[must_use]
pub fn stop_instruction(config: &FeedbackConfig) -> ControllerInstruction {
    ControllerInstruction::edit_audio(config.haptic_resource.as_str(), AudioEditKind::Stop, 0.0)
}

/// Append this tick's haptic instructions to `batch` and return the new
/// rumble state.
pub fn plan_rumble(
    slip: &SlipMetrics,
    config: &FeedbackConfig,
    previous: RumbleState,
    now_ns: u64,
    batch: &mut InstructionBatch,
) -> RumbleState {
    if !config.haptic_effect_enabled || !is_rumbling(slip, config) {
        if previous.active {
            batch.push(stop_instruction(config));
        }
        return RumbleState {
            active: false,
            ..previous
        };
    }

    let path = config.haptic_resource.as_str();
    if !previous.active {
        batch.push(ControllerInstruction::haptic_playback(
            config.controller_index,
            path,
            true,
            true,
        ));
    }
    batch.push(ControllerInstruction::edit_audio(
        path,
        AudioEditKind::Volume,
        rumble_intensity(slip, config),
    ));

    let mut last_burst_ns = previous.last_burst_ns;
    let burst_due = last_burst_ns
        .is_none_or(|last| now_ns.saturating_sub(last) >= BURST_INTERVAL_NS);
    if slip.severity() > SEVERE_SLIP_PERCENT && burst_due {
        batch.push(ControllerInstruction::haptic_playback(
            config.controller_index,
            path,
            false,
            false,
        ));
        last_burst_ns = Some(now_ns);
    }

    RumbleState {
        active: true,
        last_burst_ns,
    }
}
