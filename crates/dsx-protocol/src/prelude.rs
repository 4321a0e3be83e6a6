//! Prelude module for convenient imports

pub use crate::error::{ProtocolError, ProtocolResult, TransportError};
pub use crate::instruction::{ControllerInstruction, InstructionBatch};
pub use crate::response::ServerResponse;
pub use crate::transport::{ControllerTransport, RecordingTransport, UdpTransport};
pub use crate::types::{AudioEditKind, InstructionType, Trigger, TriggerMode};
pub use crate::{DEFAULT_DSX_PORT, MAX_DATAGRAM_SIZE};
