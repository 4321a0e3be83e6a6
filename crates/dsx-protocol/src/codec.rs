//! JSON packet codec.
//!
//! A batch is encoded as `{"instructions":[{"type":<int>,"parameters":[...]}]}`.
//! Decoding accepts any packet of that shape, which lets tests and the probe
//! inspect what was put on the wire.

use crate::MAX_DATAGRAM_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use crate::instruction::{ControllerInstruction, InstructionBatch};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
struct WirePacket {
    instructions: Vec<WireInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireInstruction {
    #[serde(rename = "type")]
    kind: u64,
    #[serde(default)]
    parameters: Vec<Value>,
}

impl From<&ControllerInstruction> for WireInstruction {
    fn from(instruction: &ControllerInstruction) -> Self {
        Self {
            kind: u64::from(instruction.instruction_type().code()),
            parameters: instruction.parameters(),
        }
    }
}

impl InstructionBatch {
    /// Render the batch as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let instructions: Vec<Value> = self
            .iter()
            .map(|instruction| {
                let wire = WireInstruction::from(instruction);
                serde_json::json!({ "type": wire.kind, "parameters": wire.parameters })
            })
            .collect();
        serde_json::json!({ "instructions": instructions })
    }

    /// Serialize to the datagram payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::DatagramTooLarge`] when the payload cannot fit in one
    /// UDP datagram.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let packet = WirePacket {
            instructions: self.iter().map(WireInstruction::from).collect(),
        };
        let bytes = serde_json::to_vec(&packet)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::DatagramTooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Parse a datagram payload back into a batch.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Json`] for malformed JSON, or the instruction-level
    /// errors of [`ControllerInstruction::from_wire`].
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let packet: WirePacket = serde_json::from_slice(bytes)?;
        packet
            .instructions
            .into_iter()
            .map(|wire| ControllerInstruction::from_wire(wire.kind, wire.parameters))
            .collect()
    }
}
