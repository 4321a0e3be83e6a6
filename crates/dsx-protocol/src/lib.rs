//! DSX controller protocol
//!
//! This crate models the instructions the DSX controller server accepts and
//! carries them to it as JSON datagrams.
//!
//! # Architecture
//!
//! - [`types`]: numeric wire enumerations (instruction types, trigger modes)
//! - [`instruction`]: typed [`ControllerInstruction`]s and the
//!   [`InstructionBatch`] that groups them into one packet
//! - [`codec`]: JSON encoding and decoding of batches
//! - [`response`]: the server's optional status reply
//! - [`transport`]: the [`ControllerTransport`] seam with a UDP
//!   implementation and an in-memory recorder
//! - [`error`]: protocol and transport error types
//!
//! # Wire format
//!
//! Every packet is a single JSON object:
//!
//! ```text
//! {"instructions":[{"type":1,"parameters":[0,1,11,5,0,0]}]}
//! ```
//!
//! `type` is the numeric [`InstructionType`]; the shape of `parameters`
//! depends on it.

#![deny(clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

pub mod codec;
pub mod error;
pub mod instruction;
pub mod prelude;
pub mod response;
pub mod transport;
pub mod types;

pub use error::{ProtocolError, ProtocolResult, TransportError};
pub use instruction::{ControllerInstruction, InstructionBatch};
pub use response::ServerResponse;
pub use transport::{ControllerTransport, RecordingTransport, UdpTransport};
pub use types::{AudioEditKind, InstructionType, Trigger, TriggerMode};

/// Default DSX listening port.
pub const DEFAULT_DSX_PORT: u16 = 6969;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
