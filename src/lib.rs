//! # dashboard-sync
//!
//! Real-time dashboard synchronization agent for the job board.
//!
//! A dashboard is loaded once from the backend REST API and then kept
//! current by push events arriving over a single authenticated WebSocket.
//! The crate reconciles the two sources into one snapshot per subject
//! (a student or a company) and republishes every change to local
//! consumers, in process through the dispatcher or remotely through the
//! local HTTP and WebSocket surface.
//!
//! ## Architecture
//!
//! ```text
//! Backend REST API          Backend push channel
//!     │                          │
//!     ├── SnapshotFetcher        ├── WsTransport (realtime/)
//!     │   (service/)             ├── ConnectionManager + RoomTracker
//!     │                          │
//!     └──────── Reconciler (service/) ────────┐
//!               InFlightGuard, Dispatcher     │
//!                                             │
//!          EventBus (domain/) <── bridge ─────┘
//!               │
//!     ├── REST Handlers (api/)
//!     └── WS Handler (ws/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod realtime;
pub mod service;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;
