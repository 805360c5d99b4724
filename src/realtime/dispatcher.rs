//! Named-channel fan-out of dashboard updates.
//!
//! Listeners are plain callbacks keyed by channel name. Emitting calls
//! every listener registered for the channel in registration order. A
//! listener that panics is logged and skipped; the remaining listeners
//! still run and the emitter never sees the panic.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::DashboardUpdate;

/// Callback receiving updates emitted on a channel.
pub type Listener = Arc<dyn Fn(&DashboardUpdate) + Send + Sync>;

/// Handle returned by [`Dispatcher::on`], used to remove one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Channel-keyed listener registry.
#[derive(Default)]
pub struct Dispatcher {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    channels: HashMap<String, Vec<(ListenerId, Listener)>>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `listener` to `channel`. Registering the same callback twice
    /// makes it fire twice.
    pub fn on(&self, channel: &str, listener: Listener) -> ListenerId {
        let mut registry = self.lock();
        registry.next_id = registry.next_id.wrapping_add(1);
        let id = ListenerId(registry.next_id);
        registry
            .channels
            .entry(channel.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Removes one listener from `channel`, or all of them when `id` is
    /// `None`. Returns how many were removed.
    pub fn off(&self, channel: &str, id: Option<ListenerId>) -> usize {
        let mut registry = self.lock();
        let Some(listeners) = registry.channels.get_mut(channel) else {
            return 0;
        };
        let before = listeners.len();
        match id {
            Some(id) => listeners.retain(|(existing, _)| *existing != id),
            None => listeners.clear(),
        }
        let removed = before.saturating_sub(listeners.len());
        if listeners.is_empty() {
            registry.channels.remove(channel);
        }
        removed
    }

    /// Calls every listener on `channel` with `update`. Returns the number
    /// of listeners that completed without panicking.
    pub fn emit(&self, channel: &str, update: &DashboardUpdate) -> usize {
        let listeners = self
            .lock()
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (_, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(update))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!(channel, "dashboard listener panicked; skipped"),
            }
        }
        delivered
    }

    /// Number of listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.lock().channels.get(channel).map_or(0, Vec::len)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock();
        let mut channels: Vec<(&str, usize)> = registry
            .channels
            .iter()
            .map(|(name, listeners)| (name.as_str(), listeners.len()))
            .collect();
        channels.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("channels", &channels)
            .finish()
    }
}
