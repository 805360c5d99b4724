//! Service layer: the reconciler and its collaborators.
//!
//! [`Reconciler`] owns the dashboard state. It reads its credential from a
//! [`CredentialSource`], loads snapshots through a [`SnapshotFetcher`],
//! receives push events from the shared
//! [`crate::realtime::ConnectionManager`], and publishes through its
//! dispatcher, which [`bridge::forward_updates`] mirrors onto the
//! [`crate::domain::EventBus`].

pub mod auth;
pub mod bridge;
pub mod fetcher;
pub mod reconciler;

pub use auth::{CredentialSource, SessionCredential};
pub use bridge::{BridgeHandle, forward_updates};
pub use fetcher::{HttpSnapshotFetcher, SnapshotFetcher};
pub use reconciler::{
    ApplyOutcome, PatchPolicy, Reconciler, ReconcilerMetrics, ReconcilerOptions, ReconcilerState,
    ReconcilerStatus,
};
