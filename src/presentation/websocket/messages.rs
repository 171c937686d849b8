//! WebSocket Message Types
//!
//! Wire formats for gateway traffic. Payloads are opaque JSON at this
//! boundary; calling code owns any schema or validation.

use serde::{Deserialize, Serialize};

/// Outbound event envelope: an event name plus an arbitrary payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub event: String,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Fixed acknowledgement returned for every inbound message.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Ack {
    pub status: &'static str,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum OutboundFrame {
    Event(Envelope),
    Ack(Ack),
}

impl OutboundFrame {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound message. A `recipientId` is accepted but not forwarded here;
/// routing to a recipient is built on top of the registry's delivery
/// operations by calling code.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "recipientId")]
    pub recipient_id: Option<String>,
}
