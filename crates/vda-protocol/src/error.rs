//! Error registry for AGV error records and inbound decoding failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error categories reported in the state's `errors` list.
///
/// These strings are stable and used by consumers for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or rejected order / instant action. Never halts the robot.
    ValidationError,
    /// A specific action failed.
    ActionError,
    /// Motion fault such as a forced obstruction.
    MotionError,
    /// Simulated hardware fault.
    DeviceError,
}

impl ErrorKind {
    /// Wire string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ActionError => "ACTION_ERROR",
            Self::MotionError => "MOTION_ERROR",
            Self::DeviceError => "DEVICE_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALIDATION_ERROR" => Ok(Self::ValidationError),
            "ACTION_ERROR" => Ok(Self::ActionError),
            "MOTION_ERROR" => Ok(Self::MotionError),
            "DEVICE_ERROR" => Ok(Self::DeviceError),
            other => Err(format!("unknown error type: {}", other)),
        }
    }
}

/// Severity of an error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorLevel {
    /// Reported, does not block progress.
    Warning,
    /// Halts the robot until cleared.
    Fatal,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

impl FromStr for ErrorLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WARNING" => Ok(Self::Warning),
            "FATAL" => Ok(Self::Fatal),
            other => Err(format!("unknown error level: {}", other)),
        }
    }
}

/// Failure to decode an inbound payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON on {channel}: {source}")]
    Json {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("channel {0} does not accept inbound messages")]
    NotInbound(String),
}
