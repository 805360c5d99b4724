//! Forwards dispatcher channels onto the [`EventBus`].
//!
//! The dispatcher is synchronous and in-process; WebSocket consumers need
//! an async fan-out they can subscribe to independently. The bridge
//! registers one listener per channel that republishes every update as a
//! [`ChannelUpdate`].

use std::sync::Arc;

use super::reconciler::Reconciler;
use crate::domain::{ChannelUpdate, EventBus};
use crate::realtime::ListenerId;

/// Listener registrations made by [`forward_updates`].
#[derive(Debug, Default)]
pub struct BridgeHandle {
    registrations: Vec<(String, ListenerId)>,
}

impl BridgeHandle {
    /// Channels being forwarded.
    #[must_use]
    pub fn channels(&self) -> Vec<&str> {
        self.registrations
            .iter()
            .map(|(channel, _)| channel.as_str())
            .collect()
    }

    /// Removes every listener the bridge registered.
    pub fn detach(self, reconciler: &Reconciler) {
        for (channel, id) in self.registrations {
            reconciler.off(&channel, Some(id));
        }
    }
}

/// Republishes every channel of `reconciler` onto `bus`.
#[must_use = "dropping the handle keeps forwarding; call detach to stop"]
pub fn forward_updates(reconciler: &Reconciler, bus: &EventBus) -> BridgeHandle {
    let mut registrations = Vec::new();
    for channel in reconciler.channels() {
        let bus = bus.clone();
        let name = channel.clone();
        let id = reconciler.on(
            &channel,
            Arc::new(move |update| {
                let receivers = bus.publish(ChannelUpdate {
                    channel: name.clone(),
                    update: update.clone(),
                });
                tracing::trace!(channel = %name, receivers, "update forwarded");
            }),
        );
        registrations.push((channel, id));
    }
    tracing::debug!(channels = registrations.len(), "update bridge attached");
    BridgeHandle { registrations }
}
