//! Per-robot message channels and topic naming.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::action::InstantActions;
use crate::error::DecodeError;
use crate::order::Order;

/// Message channels, parameterized per robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    /// Inbound order graphs.
    Order,
    /// Inbound out-of-band actions.
    InstantActions,
    /// Outbound authoritative state.
    State,
    /// Outbound lightweight position stream.
    Visualization,
}

impl Channel {
    /// Topic suffix for this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::InstantActions => "instantActions",
            Self::State => "state",
            Self::Visualization => "visualization",
        }
    }

    /// Returns true for channels the robot subscribes to.
    pub fn is_inbound(&self) -> bool {
        matches!(self, Channel::Order | Channel::InstantActions)
    }

    /// Full topic name: `{prefix}/{robot_id}/{channel}`.
    pub fn topic(&self, prefix: &str, robot_id: &str) -> String {
        format!("{}/{}/{}", prefix, robot_id, self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(Self::Order),
            "instantActions" => Ok(Self::InstantActions),
            "state" => Ok(Self::State),
            "visualization" => Ok(Self::Visualization),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Order(Order),
    InstantActions(InstantActions),
}

/// Decode an inbound payload received on `channel`.
pub fn decode_inbound(channel: Channel, payload: &[u8]) -> Result<InboundMessage, DecodeError> {
    let json_err = |source| DecodeError::Json {
        channel: channel.to_string(),
        source,
    };
    match channel {
        Channel::Order => serde_json::from_slice(payload)
            .map(InboundMessage::Order)
            .map_err(json_err),
        Channel::InstantActions => serde_json::from_slice(payload)
            .map(InboundMessage::InstantActions)
            .map_err(json_err),
        other => Err(DecodeError::NotInbound(other.to_string())),
    }
}
