//! Per-connection subscription manager.
//!
//! Tracks which dispatcher channels a WebSocket client wants and provides
//! server-side filtering of [`crate::domain::ChannelUpdate`]s.

use std::collections::BTreeSet;

/// Channel name that subscribes to everything.
pub const WILDCARD: &str = "*";

/// Manages the set of channel subscriptions for a single WebSocket
/// connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed channels. If `subscribe_all` is true, this set is ignored.
    channels: BTreeSet<String>,
    /// Whether the client subscribes to every channel (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds channels to the subscription set. `"*"` enables the wildcard.
    pub fn subscribe<I, S>(&mut self, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for channel in channels {
            let channel = channel.as_ref().trim();
            if channel == WILDCARD {
                self.subscribe_all = true;
            } else if !channel.is_empty() {
                self.channels.insert(channel.to_string());
            }
        }
    }

    /// Removes channels from the subscription set. `"*"` clears the
    /// wildcard.
    pub fn unsubscribe<I, S>(&mut self, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for channel in channels {
            let channel = channel.as_ref().trim();
            if channel == WILDCARD {
                self.subscribe_all = false;
            } else {
                self.channels.remove(channel);
            }
        }
    }

    /// Returns `true` if `channel` passes the subscription filter.
    #[must_use]
    pub fn matches(&self, channel: &str) -> bool {
        self.subscribe_all || self.channels.contains(channel)
    }

    /// Explicitly subscribed channels, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<&str> {
        self.channels.iter().map(String::as_str).collect()
    }

    /// Returns the number of explicitly subscribed channels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}
