//! Push transport connection manager.
//!
//! [`ConnectionManager`] owns the single link to the push server. It is
//! cheap to clone; every clone shares the same link, credential, room
//! tracker, and handler table. Only the manager opens or closes links.
//!
//! # Link generations
//!
//! Every `connect` that opens a link bumps a generation counter, and the
//! [`SignalSink`] handed to the transport remembers the generation it was
//! opened under. Signals from a link that has since been replaced or
//! closed are ignored, so a torn-down link can never flip the connected
//! flag or deliver frames into a newer session.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde_json::json;

use super::rooms::{RoomId, RoomTracker};
use super::transport::{Frame, Transport, TransportLink, TransportSignal};

/// Handler name receiving `{"reconnect": bool}` each time a link
/// connects.
pub const CONNECT_EVENT: &str = "connect";
/// Handler name receiving `{"reason": ..}` when a link drops or gives up.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Callback invoked with the payload of a named push event.
pub type EventHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Counters kept by the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Links opened.
    pub opens: u64,
    /// Links closed by the manager.
    pub closes: u64,
    /// Room join requests sent.
    pub room_joins: u64,
    /// Emits dropped because the transport was not connected.
    pub dropped_emits: u64,
}

/// Point-in-time view of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Whether the link reported itself connected.
    pub connected: bool,
    /// Whether a link is open (possibly still connecting).
    pub link_open: bool,
    /// Join request waiting for the next connect.
    pub pending_room: Option<String>,
    /// Last room a join was sent for.
    pub joined_room: Option<String>,
    /// Counters.
    pub stats: ConnectionStats,
}

/// Owner of the process-wide push connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    handlers: Mutex<HashMap<String, EventHandler>>,
}

struct ConnectionState {
    link: Option<Box<dyn TransportLink>>,
    generation: u64,
    credential: Option<String>,
    connected: bool,
    seen_connect: bool,
    rooms: RoomTracker,
    stats: ConnectionStats,
}

/// Where a link reports its signals.
///
/// Holds only a weak reference to the manager, so an abandoned link task
/// cannot keep the manager alive.
#[derive(Clone)]
pub struct SignalSink {
    shared: Weak<Shared>,
    generation: u64,
}

impl SignalSink {
    /// Hands `signal` to the manager. Signals from superseded links are
    /// dropped.
    pub fn deliver(&self, signal: TransportSignal) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_signal(self.generation, signal);
        }
    }

    /// Returns `true` while this sink's link is still the manager's
    /// current link.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.lock_state().generation == self.generation)
    }
}

impl fmt::Debug for SignalSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager that opens links through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                state: Mutex::new(ConnectionState {
                    link: None,
                    generation: 0,
                    credential: None,
                    connected: false,
                    seen_connect: false,
                    rooms: RoomTracker::new(),
                    stats: ConnectionStats::default(),
                }),
                handlers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Opens a link authenticated with `credential`.
    ///
    /// No-op if a link is already open for the same credential, whether
    /// or not it has finished connecting. A different credential tears
    /// the current link down first.
    pub fn connect(&self, credential: &str) {
        let mut state = self.shared.lock_state();
        if state.link.is_some() && state.credential.as_deref() == Some(credential) {
            tracing::debug!(generation = state.generation, "transport already open; connect skipped");
            return;
        }
        if let Some(mut link) = state.link.take() {
            link.close();
            state.stats.closes = state.stats.closes.saturating_add(1);
            tracing::info!(generation = state.generation, "closing transport for credential change");
        }
        state.connected = false;
        state.seen_connect = false;
        // A fresh link starts outside every room.
        state.rooms.requeue_joined();
        state.rooms.clear_joined();
        state.generation = state.generation.wrapping_add(1);
        let sink = SignalSink {
            shared: Arc::downgrade(&self.shared),
            generation: state.generation,
        };
        state.link = Some(self.shared.transport.open(credential, sink));
        state.credential = Some(credential.to_string());
        state.stats.opens = state.stats.opens.saturating_add(1);
        tracing::info!(generation = state.generation, "transport opening");
    }

    /// Closes the link and forgets the credential.
    pub fn disconnect(&self) {
        let mut state = self.shared.lock_state();
        if let Some(mut link) = state.link.take() {
            link.close();
            state.stats.closes = state.stats.closes.saturating_add(1);
            tracing::info!(generation = state.generation, "transport closed");
        }
        state.generation = state.generation.wrapping_add(1);
        state.connected = false;
        state.credential = None;
        state.rooms.clear_joined();
    }

    /// Whether the link currently reports itself connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.lock_state().connected
    }

    /// Sends `event` if connected. Returns `false` when the emit was
    /// dropped; nothing is queued.
    pub fn emit(&self, event: &str, data: serde_json::Value) -> bool {
        let mut state = self.shared.lock_state();
        let sent = state.connected
            && state
                .link
                .as_ref()
                .is_some_and(|link| link.send(Frame::new(event, data)));
        if !sent {
            state.stats.dropped_emits = state.stats.dropped_emits.saturating_add(1);
            tracing::debug!(event, "transport not connected; emit dropped");
        }
        sent
    }

    /// Registers the handler for `event`, replacing any previous one.
    pub fn on(&self, event: &str, handler: EventHandler) {
        let replaced = self
            .shared
            .lock_handlers()
            .insert(event.to_string(), handler)
            .is_some();
        tracing::trace!(event, replaced, "push handler registered");
    }

    /// Removes the handler for `event`. Returns `true` if one was present.
    pub fn off(&self, event: &str) -> bool {
        self.shared.lock_handlers().remove(event).is_some()
    }

    /// Number of registered push handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.shared.lock_handlers().len()
    }

    /// Asks the server to add this connection to `room`.
    ///
    /// Sent immediately when connected. Otherwise the request is parked
    /// (replacing any earlier parked request) and a connection is
    /// attempted with the stored credential.
    pub fn join_room(&self, room: RoomId) {
        let credential = {
            let mut state = self.shared.lock_state();
            if state.connected && state.rooms.joined() == Some(&room) {
                tracing::debug!(%room, "room already joined; join skipped");
                return;
            }
            let sent = state.connected
                && state
                    .link
                    .as_ref()
                    .is_some_and(|link| link.send(room.join_frame()));
            if sent {
                tracing::info!(%room, "room joined");
                state.stats.room_joins = state.stats.room_joins.saturating_add(1);
                state.rooms.mark_joined(room);
                return;
            }
            if let Some(previous) = state.rooms.defer(room.clone()) {
                tracing::debug!(%previous, %room, "pending room join replaced");
            }
            tracing::info!(%room, "transport not connected; room join deferred");
            if state.link.is_some() {
                return;
            }
            state.credential.clone()
        };
        match credential {
            Some(credential) => self.connect(&credential),
            None => tracing::debug!("no credential yet; room join waits for connect"),
        }
    }

    /// Current connection view.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let state = self.shared.lock_state();
        ConnectionStatus {
            connected: state.connected,
            link_open: state.link.is_some(),
            pending_room: state.rooms.pending().map(ToString::to_string),
            joined_room: state.rooms.joined().map(ToString::to_string),
            stats: state.stats,
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.shared.transport)
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<String, EventHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_signal(&self, generation: u64, signal: TransportSignal) {
        let frame = {
            let mut state = self.lock_state();
            if state.generation != generation {
                tracing::trace!(generation, "signal from superseded link ignored");
                return;
            }
            match signal {
                TransportSignal::Connected => {
                    let reconnect = state.seen_connect;
                    state.connected = true;
                    state.seen_connect = true;
                    tracing::info!(generation, reconnect, "transport connected");
                    if let Some(room) = state.rooms.take_pending() {
                        let sent = state
                            .link
                            .as_ref()
                            .is_some_and(|link| link.send(room.join_frame()));
                        if sent {
                            tracing::info!(%room, "pending room join flushed");
                            state.stats.room_joins = state.stats.room_joins.saturating_add(1);
                            state.rooms.mark_joined(room);
                        } else {
                            tracing::warn!(%room, "pending room join could not be sent");
                        }
                    }
                    Frame::new(CONNECT_EVENT, json!({ "reconnect": reconnect }))
                }
                TransportSignal::Disconnected { reason } => {
                    state.connected = false;
                    if let Some(room) = state.rooms.requeue_joined() {
                        tracing::debug!(%room, "room parked for rejoin");
                    }
                    tracing::warn!(generation, %reason, "transport disconnected");
                    Frame::new(DISCONNECT_EVENT, json!({ "reason": reason }))
                }
                TransportSignal::ConnectError { reason } => {
                    state.connected = false;
                    tracing::warn!(generation, %reason, "transport connect error");
                    return;
                }
                TransportSignal::Closed { reason } => {
                    // The credential stays so a later join can reopen.
                    state.connected = false;
                    state.link = None;
                    state.rooms.requeue_joined();
                    tracing::error!(generation, %reason, "transport gave up");
                    Frame::new(DISCONNECT_EVENT, json!({ "reason": reason }))
                }
                TransportSignal::Frame(frame) => frame,
            }
        };

        let handler = self.lock_handlers().get(&frame.event).map(Arc::clone);
        match handler {
            Some(handler) => handler(&frame.data),
            None => tracing::trace!(event = %frame.event, "no handler for push event"),
        }
    }
}
