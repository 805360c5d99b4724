//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The endpoint at `/ws` lets local consumers subscribe to dispatcher
//! channels by name and query the current snapshot.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
