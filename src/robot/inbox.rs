//! Inbound messages queued for a robot
//!
//! Raw payloads are queued as they arrive and decoded when the robot drains
//! its inbox at the start of a tick.

use vda_protocol::{decode_inbound, AgvError, Channel, InboundMessage, InstantActions, Order};

/// Message on a robot's single-consumer inbox
#[derive(Debug, Clone)]
pub enum InboxMessage {
    /// Raw payload received on an inbound channel
    Deliver { channel: Channel, payload: Vec<u8> },
    /// Test hook: raise an error on the next tick
    ForceError(AgvError),
    /// Stop the tick loop
    Shutdown,
}

/// Decoded input consumed by one tick
#[derive(Debug, Clone)]
pub enum RobotInput {
    Order(Order),
    InstantActions(InstantActions),
    /// Payload that failed to decode
    Malformed { topic: String, reason: String },
    ForceError(AgvError),
}

impl RobotInput {
    /// Decode a raw payload received on `channel` at `topic`.
    pub fn decode(channel: Channel, topic: &str, payload: &[u8]) -> Self {
        match decode_inbound(channel, payload) {
            Ok(InboundMessage::Order(order)) => RobotInput::Order(order),
            Ok(InboundMessage::InstantActions(actions)) => RobotInput::InstantActions(actions),
            Err(e) => RobotInput::Malformed {
                topic: topic.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

/// Split a tick's inputs: everything except orders first, then orders, each
/// group in arrival order.
pub fn partition(inputs: Vec<RobotInput>) -> (Vec<RobotInput>, Vec<Order>) {
    let mut immediate = Vec::new();
    let mut orders = Vec::new();
    for input in inputs {
        match input {
            RobotInput::Order(order) => orders.push(order),
            other => immediate.push(other),
        }
    }
    (immediate, orders)
}
