//! Message header shared by every VDA5050 message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header fields flattened into every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Per-topic message counter, incremented by the sender.
    pub header_id: u32,
    /// Time the message was produced.
    pub timestamp: DateTime<Utc>,
    /// Protocol version of the sender.
    pub version: String,
    /// AGV manufacturer.
    pub manufacturer: String,
    /// AGV serial number.
    pub serial_number: String,
}

impl Header {
    /// Create a header stamped with the current time.
    pub fn new(
        header_id: u32,
        version: impl Into<String>,
        manufacturer: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            header_id,
            timestamp: Utc::now(),
            version: version.into(),
            manufacturer: manufacturer.into(),
            serial_number: serial_number.into(),
        }
    }
}
