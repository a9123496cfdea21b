//! Transport boundary
//!
//! Robots hand encoded snapshots to a [`Transport`]; connection handling,
//! retries and QoS belong to the implementation, not to the simulator.
//! Two implementations are provided:
//! - MemoryTransport: shared in-process outbox for tests
//! - JsonLinesTransport: one JSON object per message on a writer (stdout)

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use vda_protocol::{Channel, State, Visualization};

/// Outbound message sink of one robot
pub trait Transport: Send {
    /// Publish an encoded payload on `topic`
    fn publish(&mut self, channel: Channel, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport lock poisoned")]
    Poisoned,
}

/// Serialize `message` and publish it.
pub fn publish_json<T: Serialize>(
    transport: &mut dyn Transport,
    channel: Channel,
    topic: &str,
    message: &T,
) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(message)?;
    transport.publish(channel, topic, &payload)
}

/// A message captured by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub channel: Channel,
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-memory transport; clones share one outbox.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    outbox: Arc<Mutex<Vec<Published>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far
    pub fn messages(&self) -> Vec<Published> {
        self.outbox.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Decoded payloads published on `channel`, optionally for one topic
    pub fn decode<T: DeserializeOwned>(&self, channel: Channel, topic: Option<&str>) -> Vec<T> {
        self.messages()
            .into_iter()
            .filter(|m| m.channel == channel && topic.map(|t| t == m.topic).unwrap_or(true))
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Published state snapshots
    pub fn states(&self) -> Vec<State> {
        self.decode(Channel::State, None)
    }

    /// Published visualization snapshots
    pub fn visualizations(&self) -> Vec<Visualization> {
        self.decode(Channel::Visualization, None)
    }

    pub fn clear(&self) {
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.clear();
        }
    }
}

impl Transport for MemoryTransport {
    fn publish(&mut self, channel: Channel, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut outbox = self.outbox.lock().map_err(|_| TransportError::Poisoned)?;
        outbox.push(Published {
            channel,
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

/// Line-oriented JSON transport over a shared writer.
///
/// Each message is written as `{"topic", "channel", "payload"}` on one line.
/// Clones share the writer so lines from different robots never interleave.
#[derive(Clone)]
pub struct JsonLinesTransport {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonLinesTransport {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl std::fmt::Debug for JsonLinesTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesTransport").finish_non_exhaustive()
    }
}

impl Transport for JsonLinesTransport {
    fn publish(&mut self, channel: Channel, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let payload: Value = serde_json::from_slice(payload)?;
        let line = serde_json::to_string(&serde_json::json!({
            "topic": topic,
            "channel": channel,
            "payload": payload,
        }))?;

        let mut writer = self.writer.lock().map_err(|_| TransportError::Poisoned)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
