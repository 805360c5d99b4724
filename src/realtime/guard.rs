//! Per-operation in-flight guard.
//!
//! Keyed by an operation name (for snapshot loads, the subject). At most
//! one [`InFlightTicket`] exists per key; a second caller gets `None` and
//! is expected to treat that as "already running". Tickets release their
//! key on drop, so an early return or a cancelled future cannot leave a
//! key stuck.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Set of operations currently in flight.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    inner: Arc<Mutex<Slots>>,
}

#[derive(Debug, Default)]
struct Slots {
    next_serial: u64,
    active: HashMap<String, u64>,
}

/// Proof that the holder owns an operation key. Dropping it releases the
/// key unless it was force-released and re-acquired in the meantime.
#[derive(Debug)]
#[must_use = "the operation is released as soon as the ticket is dropped"]
pub struct InFlightTicket {
    inner: Arc<Mutex<Slots>>,
    key: String,
    serial: u64,
}

impl InFlightGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `key`. Returns `None` if it is already claimed.
    pub fn try_enter(&self, key: &str) -> Option<InFlightTicket> {
        let mut slots = self.lock();
        if slots.active.contains_key(key) {
            return None;
        }
        slots.next_serial = slots.next_serial.wrapping_add(1);
        let serial = slots.next_serial;
        slots.active.insert(key.to_string(), serial);
        Some(InFlightTicket {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            serial,
        })
    }

    /// Whether `key` is currently claimed.
    #[must_use]
    pub fn is_active(&self, key: &str) -> bool {
        self.lock().active.contains_key(key)
    }

    /// Releases `key` regardless of who holds it. The outstanding ticket
    /// becomes inert.
    pub fn release(&self, key: &str) -> bool {
        self.lock().active.remove(key).is_some()
    }

    /// Releases every key.
    pub fn release_all(&self) {
        self.lock().active.clear();
    }
}

impl InFlightTicket {
    /// The key this ticket holds.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        let mut slots = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.active.get(&self.key) == Some(&self.serial) {
            slots.active.remove(&self.key);
        }
    }
}
