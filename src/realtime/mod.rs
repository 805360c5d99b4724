//! Real-time plumbing: the push connection, room joins, and local
//! update fan-out.

pub mod connection;
pub mod dispatcher;
pub mod guard;
pub mod rooms;
pub mod transport;
pub mod ws_transport;

pub use connection::{
    CONNECT_EVENT, ConnectionManager, ConnectionStats, ConnectionStatus, DISCONNECT_EVENT,
    EventHandler, SignalSink,
};
pub use dispatcher::{Dispatcher, Listener, ListenerId};
pub use guard::{InFlightGuard, InFlightTicket};
pub use rooms::{RoomId, RoomTracker};
pub use transport::{Frame, Transport, TransportLink, TransportSignal};
pub use ws_transport::{ReconnectPolicy, WsTransport};
