//! Prelude for adaptive-trigger-telemetry-core.
//!
//! ```rust
//! use adaptive_trigger_telemetry_core::prelude::*;
//!
//! let frame = TelemetryFrame::builder(GameId::AssettoCorsa)
//!     .ground_speed_kmh(80.0)
//!     .build();
//! assert_eq!(frame.game(), GameId::AssettoCorsa);
//! ```

pub use crate::connection::ConnectionState;
pub use crate::decoder::{BinaryTelemetryDecoder, DecodedRecord, FieldDescriptor, NumericKind};
pub use crate::error::{ConnectError, DecodeError, ReadError, TelemetryResult};
pub use crate::frame::{TelemetryFrame, TelemetryFrameBuilder, WheelPosition};
pub use crate::log_limiter::ErrorLogLimiter;
pub use crate::{GameId, telemetry_now_ns};
