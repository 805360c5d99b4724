//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ChannelUpdate;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: Value,
}

impl WsMessage {
    /// Builds a server message stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, msg_type: WsMessageType, payload: Value) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Wraps a dispatcher update as an `event` message.
    #[must_use]
    pub fn event(update: &ChannelUpdate) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            WsMessageType::Event,
            serde_json::to_value(update).unwrap_or_default(),
        )
    }

    /// Builds an `error` message answering request `id`.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: &str) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send in the payload of a `command` message.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Start receiving the given channels. Use `["*"]` for all.
    Subscribe {
        /// Channel names (`data-updated`, `notification`, event names).
        channels: Vec<String>,
    },
    /// Stop receiving the given channels.
    Unsubscribe {
        /// Channel names to drop.
        channels: Vec<String>,
    },
    /// Ask for the current snapshot.
    GetSnapshot,
    /// Ask for the reconciler status.
    GetStatus,
    /// List the channels the reconciler publishes.
    ListChannels,
}
