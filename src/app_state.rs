//! Shared application state injected into all Axum handlers.

use crate::domain::EventBus;
use crate::service::Reconciler;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Dashboard reconciler (also gives access to the connection).
    pub reconciler: Reconciler,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}
