//! Payloads published to local subscribers.

use serde::Serialize;

use super::notification::Notification;
use super::push_event::NormalizedEvent;
use super::snapshot::{DashboardSnapshot, DashboardStats};

/// Channel carrying the full snapshot after every load or patch.
pub const DATA_UPDATED: &str = "data-updated";
/// Channel carrying the stats sub-object after every load or patch.
pub const STATS_UPDATED: &str = "stats_updated";
/// Channel carrying one notification per received event.
pub const NOTIFICATION: &str = "notification";

/// A value handed to local subscribers.
///
/// Subscribers receive owned copies; the reconciler's own state is never
/// shared with them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DashboardUpdate {
    /// Full snapshot (`data-updated`).
    Snapshot(DashboardSnapshot),
    /// Stats sub-object (`stats_updated`).
    Stats(DashboardStats),
    /// Display notification (`notification`).
    Notification(Notification),
    /// Raw normalized event (published under the event's own name).
    Event(NormalizedEvent),
}

impl DashboardUpdate {
    /// Returns the stats carried by this update, if any.
    #[must_use]
    pub fn stats(&self) -> Option<DashboardStats> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot.stats),
            Self::Stats(stats) => Some(*stats),
            Self::Notification(_) | Self::Event(_) => None,
        }
    }
}

/// An update tagged with the channel it was published on.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelUpdate {
    /// Dispatcher channel name.
    pub channel: String,
    /// Published value.
    pub update: DashboardUpdate,
}
