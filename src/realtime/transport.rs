//! Seam between the [`super::ConnectionManager`] and the wire.
//!
//! A [`Transport`] opens links; a [`TransportLink`] sends frames and is
//! closed by the manager. Everything a link observes (connects,
//! disconnects, incoming frames) flows back through the [`SignalSink`] it
//! was opened with.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use super::connection::SignalSink;

/// One message on the push channel, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name (e.g. `"interview_scheduled"`, `"join"`).
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    /// Creates a frame.
    #[must_use]
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// What a link reports back to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The link is established (first connect or after a reconnect).
    Connected,
    /// An established link dropped; the transport may retry.
    Disconnected {
        /// Human-readable cause.
        reason: String,
    },
    /// A connection attempt failed.
    ConnectError {
        /// Human-readable cause.
        reason: String,
    },
    /// The link stopped retrying and will deliver nothing further.
    Closed {
        /// Human-readable cause.
        reason: String,
    },
    /// An incoming frame.
    Frame(Frame),
}

/// Opens links to the push server.
///
/// Implementations must not deliver signals synchronously from inside
/// [`Transport::open`]; the manager holds its state lock during the call.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Opens a link authenticated with `credential`. Signals for the link
    /// are delivered through `sink`. Retrying after failures is the
    /// link's own business.
    fn open(&self, credential: &str, sink: SignalSink) -> Box<dyn TransportLink>;
}

/// A single open link.
pub trait TransportLink: Send + fmt::Debug {
    /// Queues `frame` for sending. Returns `false` if the link can no
    /// longer send.
    fn send(&self, frame: Frame) -> bool;

    /// Tears the link down. No further signals are delivered afterwards.
    fn close(&mut self);
}
