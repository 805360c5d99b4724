//! Broadcast channel for dashboard updates.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The bridge in
//! [`crate::service::bridge`] republishes every dispatcher emission as a
//! [`ChannelUpdate`], and each WebSocket consumer subscribes to receive a
//! filtered stream.

use tokio::sync::broadcast;

use super::ChannelUpdate;

/// Broadcast bus for [`ChannelUpdate`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest updates are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelUpdate>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an update to all subscribers.
    ///
    /// Returns the number of receivers that received the update.
    /// If there are no active receivers, the update is silently dropped.
    pub fn publish(&self, update: ChannelUpdate) -> usize {
        self.sender.send(update).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future updates.
    ///
    /// Each WebSocket connection should call this once on connect.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
