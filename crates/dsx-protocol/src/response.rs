//! Status reply the DSX server may send after each packet.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};

/// Reply datagram. Optional: senders never wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResponse {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "TimeReceived", default)]
    pub time_received: String,
    #[serde(rename = "isControllerConnected", default)]
    pub is_controller_connected: bool,
    #[serde(rename = "BatteryLevel", default)]
    pub battery_level: f32,
}

impl ServerResponse {
    /// # Errors
    ///
    /// Returns a JSON error when the payload is not a status object.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl std::fmt::Display for ServerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "status={} controller_connected={} battery={}%",
            self.status, self.is_controller_connected, self.battery_level
        )
    }
}
