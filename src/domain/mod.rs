//! Domain layer: subjects, snapshots, push events, and notifications.
//!
//! Everything here is plain data plus pure transformations. The stateful
//! parts (connection, reconciler) live in [`crate::realtime`] and
//! [`crate::service`].

pub mod event_bus;
pub mod notification;
pub mod push_event;
pub mod snapshot;
pub mod subject;
pub mod update;

pub use event_bus::EventBus;
pub use notification::{Notification, NotificationColor};
pub use push_event::{EventKind, NormalizedEvent, PushEvent};
pub use snapshot::{Collection, DashboardEntry, DashboardSnapshot, DashboardStats, StatsPatch};
pub use subject::{RecordId, Subject, SubjectKind};
pub use update::{ChannelUpdate, DATA_UPDATED, DashboardUpdate, NOTIFICATION, STATS_UPDATED};
