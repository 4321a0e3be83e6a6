//! Typed controller instructions.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{AudioEditKind, InstructionType, Trigger, TriggerMode};
use serde_json::Value;

/// One command for the DSX server.
///
/// Strengths, colors and indices are integers on the wire; volumes and audio
/// edit values are decimals.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerInstruction {
    /// `[controller, trigger, mode, strength, 0, 0]`
    TriggerUpdate {
        controller: u8,
        trigger: Trigger,
        mode: TriggerMode,
        strength: u8,
    },
    /// `[controller, red, green, blue]`
    RgbUpdate {
        controller: u8,
        red: u8,
        green: u8,
        blue: u8,
    },
    /// `[controller, path, start, loop]`
    HapticPlayback {
        controller: u8,
        path: String,
        start: bool,
        looped: bool,
    },
    /// `[path, left_volume, right_volume, clear_buffer, channel]`
    HapticPositional {
        path: String,
        left_volume: f32,
        right_volume: f32,
        clear_buffer: bool,
        channel: u8,
    },
    /// `[path, edit_kind, value]`
    EditAudio {
        path: String,
        kind: AudioEditKind,
        value: f32,
    },
    /// Any other instruction type, parameters passed through untouched.
    Raw {
        kind: InstructionType,
        parameters: Vec<Value>,
    },
}

impl ControllerInstruction {
    #[must_use]
    pub const fn trigger(controller: u8, trigger: Trigger, mode: TriggerMode, strength: u8) -> Self {
        Self::TriggerUpdate {
            controller,
            trigger,
            mode,
            strength,
        }
    }

    #[must_use]
    pub const fn rgb(controller: u8, red: u8, green: u8, blue: u8) -> Self {
        Self::RgbUpdate {
            controller,
            red,
            green,
            blue,
        }
    }

    #[must_use]
    pub fn haptic_playback(controller: u8, path: impl Into<String>, start: bool, looped: bool) -> Self {
        Self::HapticPlayback {
            controller,
            path: path.into(),
            start,
            looped,
        }
    }

    #[must_use]
    pub fn haptic_positional(
        path: impl Into<String>,
        left_volume: f32,
        right_volume: f32,
        clear_buffer: bool,
        channel: u8,
    ) -> Self {
        Self::HapticPositional {
            path: path.into(),
            left_volume,
            right_volume,
            clear_buffer,
            channel,
        }
    }

    #[must_use]
    pub fn edit_audio(path: impl Into<String>, kind: AudioEditKind, value: f32) -> Self {
        Self::EditAudio {
            path: path.into(),
            kind,
            value,
        }
    }

    /// Wire discriminant of this instruction.
    #[must_use]
    pub fn instruction_type(&self) -> InstructionType {
        match self {
            Self::TriggerUpdate { .. } => InstructionType::TriggerUpdate,
            Self::RgbUpdate { .. } => InstructionType::RgbUpdate,
            Self::HapticPlayback { .. } | Self::HapticPositional { .. } => {
                InstructionType::HapticFeedback
            }
            Self::EditAudio { .. } => InstructionType::EditAudio,
            Self::Raw { kind, .. } => *kind,
        }
    }

    /// The `parameters` array as sent on the wire.
    #[must_use]
    pub fn parameters(&self) -> Vec<Value> {
        match self {
            Self::TriggerUpdate {
                controller,
                trigger,
                mode,
                strength,
            } => vec![
                Value::from(*controller),
                Value::from(*trigger),
                Value::from(*mode),
                Value::from(*strength),
                Value::from(0),
                Value::from(0),
            ],
            Self::RgbUpdate {
                controller,
                red,
                green,
                blue,
            } => vec![
                Value::from(*controller),
                Value::from(*red),
                Value::from(*green),
                Value::from(*blue),
            ],
            Self::HapticPlayback {
                controller,
                path,
                start,
                looped,
            } => vec![
                Value::from(*controller),
                Value::from(path.as_str()),
                Value::from(*start),
                Value::from(*looped),
            ],
            Self::HapticPositional {
                path,
                left_volume,
                right_volume,
                clear_buffer,
                channel,
            } => vec![
                Value::from(path.as_str()),
                decimal(*left_volume),
                decimal(*right_volume),
                Value::from(*clear_buffer),
                Value::from(*channel),
            ],
            Self::EditAudio { path, kind, value } => vec![
                Value::from(path.as_str()),
                Value::from(*kind),
                decimal(*value),
            ],
            Self::Raw { parameters, .. } => parameters.clone(),
        }
    }

    /// Rebuild an instruction from its wire pieces.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownCode`] for an unrecognized type and
    /// [`ProtocolError::InvalidParameters`] when the parameter list does not
    /// match the type's shape.
    pub fn from_wire(code: u64, parameters: Vec<Value>) -> ProtocolResult<Self> {
        let kind = InstructionType::try_from(code)?;
        match kind {
            InstructionType::TriggerUpdate => {
                let [controller, trigger, mode, strength, ..] = parameters.as_slice() else {
                    return Err(shape_error("TriggerUpdate", 4, parameters.len()));
                };
                Ok(Self::TriggerUpdate {
                    controller: small_int("TriggerUpdate", controller)?,
                    trigger: Trigger::try_from(int("TriggerUpdate", trigger)?)?,
                    mode: TriggerMode::try_from(int("TriggerUpdate", mode)?)?,
                    strength: small_int("TriggerUpdate", strength)?,
                })
            }
            InstructionType::RgbUpdate => {
                let [controller, red, green, blue] = parameters.as_slice() else {
                    return Err(shape_error("RGBUpdate", 4, parameters.len()));
                };
                Ok(Self::RgbUpdate {
                    controller: small_int("RGBUpdate", controller)?,
                    red: small_int("RGBUpdate", red)?,
                    green: small_int("RGBUpdate", green)?,
                    blue: small_int("RGBUpdate", blue)?,
                })
            }
            InstructionType::HapticFeedback => haptic_from_wire(&parameters),
            InstructionType::EditAudio => {
                let [path, edit, value] = parameters.as_slice() else {
                    return Err(shape_error("EditAudio", 3, parameters.len()));
                };
                Ok(Self::EditAudio {
                    path: text("EditAudio", path)?,
                    kind: AudioEditKind::try_from(int("EditAudio", edit)?)?,
                    value: float("EditAudio", value)?,
                })
            }
            other => Ok(Self::Raw {
                kind: other,
                parameters,
            }),
        }
    }
}

fn haptic_from_wire(parameters: &[Value]) -> ProtocolResult<ControllerInstruction> {
    const NAME: &str = "HapticFeedback";
    match parameters {
        [controller, path, start, looped] if controller.is_number() => {
            Ok(ControllerInstruction::HapticPlayback {
                controller: small_int(NAME, controller)?,
                path: text(NAME, path)?,
                start: flag(NAME, start)?,
                looped: flag(NAME, looped)?,
            })
        }
        [path, left, right, clear, channel] => Ok(ControllerInstruction::HapticPositional {
            path: text(NAME, path)?,
            left_volume: float(NAME, left)?,
            right_volume: float(NAME, right)?,
            clear_buffer: flag(NAME, clear)?,
            channel: small_int(NAME, channel)?,
        }),
        other => Err(ProtocolError::invalid_parameters(
            NAME,
            format!("expected 4 (playback) or 5 (positional) parameters, got {}", other.len()),
        )),
    }
}

/// Encode an `f32` through its shortest decimal form so that `0.35` stays
/// `0.35` on the wire instead of its widened `f64` expansion.
fn decimal(value: f32) -> Value {
    value
        .to_string()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

fn shape_error(instruction: &'static str, expected: usize, actual: usize) -> ProtocolError {
    ProtocolError::invalid_parameters(
        instruction,
        format!("expected {expected} parameters, got {actual}"),
    )
}

fn int(instruction: &'static str, value: &Value) -> ProtocolResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| ProtocolError::invalid_parameters(instruction, format!("{value} is not a non-negative integer")))
}

fn small_int(instruction: &'static str, value: &Value) -> ProtocolResult<u8> {
    let raw = int(instruction, value)?;
    u8::try_from(raw).map_err(|_| {
        ProtocolError::invalid_parameters(instruction, format!("{raw} does not fit in 0..=255"))
    })
}

fn float(instruction: &'static str, value: &Value) -> ProtocolResult<f32> {
    let raw = value
        .as_f64()
        .ok_or_else(|| ProtocolError::invalid_parameters(instruction, format!("{value} is not a number")))?;
    raw.to_string()
        .parse::<f32>()
        .map_err(|e| ProtocolError::invalid_parameters(instruction, e.to_string()))
}

fn flag(instruction: &'static str, value: &Value) -> ProtocolResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ProtocolError::invalid_parameters(instruction, format!("{value} is not a boolean")))
}

fn text(instruction: &'static str, value: &Value) -> ProtocolResult<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::invalid_parameters(instruction, format!("{value} is not a string")))
}

/// Instructions sent together in one datagram, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionBatch {
    instructions: Vec<ControllerInstruction>,
}

impl InstructionBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: ControllerInstruction) {
        self.instructions.push(instruction);
    }

    #[must_use]
    pub fn with(mut self, instruction: ControllerInstruction) -> Self {
        self.push(instruction);
        self
    }

    pub fn extend(&mut self, other: InstructionBatch) {
        self.instructions.extend(other.instructions);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ControllerInstruction> {
        self.instructions.iter()
    }

    #[must_use]
    pub fn instructions(&self) -> &[ControllerInstruction] {
        &self.instructions
    }

    /// Trigger updates addressed to `trigger`, in batch order.
    pub fn triggers_for(&self, trigger: Trigger) -> impl Iterator<Item = &ControllerInstruction> {
        self.instructions.iter().filter(move |instruction| {
            matches!(instruction, ControllerInstruction::TriggerUpdate { trigger: t, .. } if *t == trigger)
        })
    }

    #[must_use]
    pub fn contains_type(&self, kind: InstructionType) -> bool {
        self.instructions
            .iter()
            .any(|instruction| instruction.instruction_type() == kind)
    }
}

impl FromIterator<ControllerInstruction> for InstructionBatch {
    fn from_iter<I: IntoIterator<Item = ControllerInstruction>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for InstructionBatch {
    type Item = ControllerInstruction;
    type IntoIter = std::vec::IntoIter<ControllerInstruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.into_iter()
    }
}

impl<'a> IntoIterator for &'a InstructionBatch {
    type Item = &'a ControllerInstruction;
    type IntoIter = std::slice::Iter<'a, ControllerInstruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_trigger_update_parameters() {
        let instruction = ControllerInstruction::trigger(
            0,
            Trigger::Right,
            TriggerMode::VibrateTriggerPulse,
            5,
        );
        assert_eq!(instruction.instruction_type(), InstructionType::TriggerUpdate);
        assert_eq!(instruction.parameters(), vec![json!(0), json!(2), json!(11), json!(5), json!(0), json!(0)]);
    }

    #[test]
    fn test_decimal_keeps_short_form() {
        let instruction = ControllerInstruction::edit_audio("rumble.wav", AudioEditKind::Volume, 0.35);
        let params = instruction.parameters();
        assert_eq!(params.get(2).map(ToString::to_string).as_deref(), Some("0.35"));
    }

    #[test]
    fn test_haptic_shapes_are_distinguished() -> TestResult {
        let playback = ControllerInstruction::from_wire(
            20,
            vec![json!(0), json!("a.wav"), json!(true), json!(true)],
        )?;
        assert_eq!(playback, ControllerInstruction::haptic_playback(0, "a.wav", true, true));

        let positional = ControllerInstruction::from_wire(
            20,
            vec![json!("a.wav"), json!(0.5), json!(1), json!(false), json!(1)],
        )?;
        assert_eq!(
            positional,
            ControllerInstruction::haptic_positional("a.wav", 0.5, 1.0, false, 1)
        );
        Ok(())
    }

    #[test]
    fn test_haptic_with_wrong_arity_is_rejected() {
        let result = ControllerInstruction::from_wire(20, vec![json!("a.wav"), json!(true)]);
        assert!(matches!(result, Err(ProtocolError::InvalidParameters { .. })));
    }

    #[test]
    fn test_strength_must_be_integer() {
        let result = ControllerInstruction::from_wire(
            1,
            vec![json!(0), json!(1), json!(11), json!(2.5), json!(0), json!(0)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unhandled_types_pass_through() -> TestResult {
        let instruction = ControllerInstruction::from_wire(5, vec![json!(0), json!(1)])?;
        assert_eq!(instruction.instruction_type(), InstructionType::MicLed);
        assert_eq!(instruction.parameters(), vec![json!(0), json!(1)]);
        Ok(())
    }

    #[test]
    fn test_batch_queries() {
        let batch = InstructionBatch::new()
            .with(ControllerInstruction::trigger(0, Trigger::Left, TriggerMode::Normal, 1))
            .with(ControllerInstruction::trigger(0, Trigger::Right, TriggerMode::VibrateTriggerPulse, 4))
            .with(ControllerInstruction::rgb(0, 255, 0, 0));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.triggers_for(Trigger::Right).count(), 1);
        assert!(batch.contains_type(InstructionType::RgbUpdate));
        assert!(!batch.contains_type(InstructionType::EditAudio));
    }
}
