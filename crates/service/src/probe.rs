//! Controller link check that needs no running game.
//!
//! Sweeps the light bar through red, green and blue, ramps each trigger
//! through a few pulse strengths, then resets the controller and waits
//! briefly for the driver's status reply.

use std::time::Duration;

use adaptive_trigger_dsx_protocol::{
    ControllerInstruction, ControllerTransport, InstructionBatch, ServerResponse, Trigger,
    TriggerMode,
};
use adaptive_trigger_feedback_mapping::{FeedbackConfig, FeedbackMapper, TriggerSetting};
use tracing::{info, warn};

/// Pulse strengths applied to each trigger in turn.
pub const PROBE_STRENGTHS: [u8; 4] = [2, 4, 6, 8];

const PROBE_COLORS: [(&str, (u8, u8, u8)); 3] = [
    ("red", (255, 0, 0)),
    ("green", (0, 255, 0)),
    ("blue", (0, 0, 255)),
];

/// One labelled batch of the probe sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeStep {
    pub label: String,
    pub batch: InstructionBatch,
}

/// Outcome of a probe run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub batches_sent: usize,
    pub failures: usize,
    /// Status reply received after the final reset, if any.
    pub reply: Option<ServerResponse>,
}

impl ProbeReport {
    pub fn all_sent(&self) -> bool {
        self.failures == 0
    }

    pub fn controller_connected(&self) -> bool {
        self.reply.as_ref().is_some_and(|r| r.is_controller_connected)
    }
}

/// The full probe sequence for `config`'s controller.
pub fn probe_sequence(config: &FeedbackConfig) -> Vec<ProbeStep> {
    let controller = config.controller_index;
    let mut steps = Vec::new();

    for (name, (red, green, blue)) in PROBE_COLORS {
        steps.push(ProbeStep {
            label: format!("led {name}"),
            batch: InstructionBatch::new().with(ControllerInstruction::rgb(controller, red, green, blue)),
        });
    }

    for (name, trigger) in [("left", Trigger::Left), ("right", Trigger::Right)] {
        for strength in PROBE_STRENGTHS {
            steps.push(ProbeStep {
                label: format!("{name} trigger pulse {strength}"),
                batch: InstructionBatch::new().with(ControllerInstruction::trigger(
                    controller,
                    trigger,
                    TriggerMode::VibrateTriggerPulse,
                    strength,
                )),
            });
        }
        let released = TriggerSetting::RELEASED;
        steps.push(ProbeStep {
            label: format!("{name} trigger release"),
            batch: InstructionBatch::new().with(ControllerInstruction::trigger(
                controller,
                trigger,
                released.mode,
                released.strength,
            )),
        });
    }

    steps.push(ProbeStep {
        label: "reset".to_string(),
        batch: FeedbackMapper::new().reset_batch(config, false),
    });
    steps
}

/// Send the probe sequence, waiting `step_delay` after each batch, then
/// wait up to `reply_timeout` for the driver's status reply.
///
/// Send failures are counted and the sequence carries on.
pub async fn run_probe<T: ControllerTransport + ?Sized>(
    transport: &T,
    config: &FeedbackConfig,
    step_delay: Duration,
    reply_timeout: Duration,
) -> ProbeReport {
    let mut report = ProbeReport::default();
    for step in probe_sequence(config) {
        match transport.send(&step.batch).await {
            Ok(()) => {
                info!(step = %step.label, transport = %transport.describe(), "Probe step sent");
                report.batches_sent = report.batches_sent.saturating_add(1);
            }
            Err(e) => {
                warn!(step = %step.label, error = %e, "Probe step failed");
                report.failures = report.failures.saturating_add(1);
            }
        }
        if !step_delay.is_zero() {
            tokio::time::sleep(step_delay).await;
        }
    }

    match transport.receive_status(reply_timeout).await {
        Ok(Some(reply)) => {
            info!(
                status = %reply.status,
                controller_connected = reply.is_controller_connected,
                battery = reply.battery_level,
                "DSX status reply"
            );
            if !reply.is_controller_connected {
                warn!("DSX reports no controller connected");
            }
            report.reply = Some(reply);
        }
        Ok(None) => warn!(
            timeout_ms = u64::try_from(reply_timeout.as_millis()).unwrap_or(u64::MAX),
            "No status reply from DSX"
        ),
        Err(e) => warn!(error = %e, "Failed to read DSX status reply"),
    }
    report
}
