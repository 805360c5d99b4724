//! Snapshot + delta reconciler.
//!
//! [`Reconciler`] holds the authoritative dashboard state for one subject
//! at a time. `initialize` loads a REST snapshot, push events patch it in
//! place, and every change is republished to local listeners as a full
//! snapshot (`data-updated`) plus the stats sub-object (`stats_updated`).
//!
//! # State machine
//!
//! ```text
//! Uninitialized --initialize--> Initializing --fetch done--> Ready
//!       ^                            ^                         |
//!       |                            +--------refresh----------+
//!       +------------------destroy (from any state)------------+
//! ```
//!
//! Every session change bumps a generation counter. A fetch only lands if
//! the generation and subject it started under are still current, so a
//! `destroy` or a switch to another subject during a pending fetch
//! discards its result.
//!
//! Events are patched only in `Ready`. Before that (no subject, or the
//! snapshot still loading) they are either ignored or only forwarded as
//! notifications, never merged into a snapshot that is about to be
//! replaced wholesale.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use super::auth::CredentialSource;
use super::fetcher::SnapshotFetcher;
use crate::domain::push_event::ProfileChange;
use crate::domain::{
    Collection, DATA_UPDATED, DashboardSnapshot, DashboardUpdate, EventKind, NOTIFICATION,
    NormalizedEvent, Notification, PushEvent, STATS_UPDATED, Subject,
};
use crate::error::SyncError;
use crate::realtime::{
    CONNECT_EVENT, ConnectionManager, Dispatcher, InFlightGuard, Listener, ListenerId,
};

/// Lifecycle state of the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerState {
    /// No subject.
    Uninitialized,
    /// A snapshot fetch is in flight.
    Initializing,
    /// Snapshot loaded; events patch it.
    Ready,
}

impl ReconcilerState {
    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
        }
    }
}

/// What [`Reconciler::apply_event`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No active subject; nothing was published.
    Ignored,
    /// Published to listeners without changing the snapshot.
    Forwarded,
    /// Merged into the snapshot and republished.
    Patched,
}

/// Which event kinds mutate the snapshot.
///
/// `interview_scheduled` and `stats_updated` always do. The other known
/// kinds only produce notifications unless enabled here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPolicy {
    enabled: HashSet<EventKind>,
}

impl PatchPolicy {
    /// Kinds that patch regardless of policy.
    pub const ALWAYS: [EventKind; 2] = [EventKind::InterviewScheduled, EventKind::StatsUpdated];

    /// Only the always-on kinds patch.
    #[must_use]
    pub fn notify_only() -> Self {
        Self::default()
    }

    /// Every known kind patches.
    #[must_use]
    pub fn all() -> Self {
        Self {
            enabled: EventKind::ALL.into_iter().collect(),
        }
    }

    /// Adds `kind` to the patching set.
    #[must_use]
    pub fn with(mut self, kind: EventKind) -> Self {
        self.enabled.insert(kind);
        self
    }

    /// Parses a comma-separated list of event names; `all` enables every
    /// kind. Blank input yields [`PatchPolicy::notify_only`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] on an unknown event name.
    pub fn parse_list(list: &str) -> Result<Self, SyncError> {
        let mut policy = Self::notify_only();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name.eq_ignore_ascii_case("all") {
                return Ok(Self::all());
            }
            let kind = EventKind::from_name(name).ok_or_else(|| {
                SyncError::Config(format!("unknown event in patch list: {name:?}"))
            })?;
            policy = policy.with(kind);
        }
        Ok(policy)
    }

    /// Whether events of `kind` mutate the snapshot.
    #[must_use]
    pub fn patches(&self, kind: EventKind) -> bool {
        Self::ALWAYS.contains(&kind) || self.enabled.contains(&kind)
    }

    /// Wire names of every patching kind, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let names: BTreeSet<&'static str> = EventKind::ALL
            .into_iter()
            .filter(|kind| self.patches(*kind))
            .map(|kind| kind.as_str())
            .collect();
        names.into_iter().collect()
    }
}

/// Tuning of a [`Reconciler`].
#[derive(Debug, Clone, Default)]
pub struct ReconcilerOptions {
    /// Which kinds mutate the snapshot.
    pub patch_policy: PatchPolicy,
    /// Additional push event names to subscribe to. They are forwarded as
    /// generic notifications and raw events.
    pub extra_events: Vec<String>,
}

/// Counter values reported by [`Reconciler::metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerMetrics {
    /// Snapshot fetches issued.
    pub snapshot_fetches: u64,
    /// Fetches that failed and degraded to the empty snapshot.
    pub fetch_failures: u64,
    /// Fetch results discarded because the session moved on.
    pub stale_results: u64,
    /// Events merged into the snapshot.
    pub events_patched: u64,
    /// Events published without a snapshot change.
    pub events_forwarded: u64,
    /// Events dropped for lack of a subject.
    pub events_ignored: u64,
}

#[derive(Debug, Default)]
struct Counters {
    snapshot_fetches: AtomicU64,
    fetch_failures: AtomicU64,
    stale_results: AtomicU64,
    events_patched: AtomicU64,
    events_forwarded: AtomicU64,
    events_ignored: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReconcilerMetrics {
        ReconcilerMetrics {
            snapshot_fetches: self.snapshot_fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            stale_results: self.stale_results.load(Ordering::Relaxed),
            events_patched: self.events_patched.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerStatus {
    /// Lifecycle state.
    pub state: ReconcilerState,
    /// Active subject, if any.
    pub subject: Option<Subject>,
    /// Active subject and a connected transport.
    pub realtime_connected: bool,
    /// Event kinds that mutate the snapshot.
    pub patch_events: Vec<&'static str>,
    /// Counters.
    pub metrics: ReconcilerMetrics,
}

/// Owner of the dashboard state. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    connection: ConnectionManager,
    fetcher: Arc<dyn SnapshotFetcher>,
    credentials: Arc<dyn CredentialSource>,
    dispatcher: Dispatcher,
    guard: InFlightGuard,
    options: ReconcilerOptions,
    counters: Counters,
    session: Mutex<Session>,
}

#[derive(Debug)]
struct Session {
    state: ReconcilerState,
    subject: Option<Subject>,
    snapshot: Option<DashboardSnapshot>,
    generation: u64,
}

impl Reconciler {
    /// Creates a reconciler. Nothing is fetched or connected until
    /// [`Reconciler::initialize`].
    #[must_use]
    pub fn new(
        connection: ConnectionManager,
        fetcher: Arc<dyn SnapshotFetcher>,
        credentials: Arc<dyn CredentialSource>,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connection,
                fetcher,
                credentials,
                dispatcher: Dispatcher::new(),
                guard: InFlightGuard::new(),
                options,
                counters: Counters::default(),
                session: Mutex::new(Session {
                    state: ReconcilerState::Uninitialized,
                    subject: None,
                    snapshot: None,
                    generation: 0,
                }),
            }),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn load_key(subject: &Subject) -> String {
        format!("snapshot:{subject}")
    }

    /// Starts a session for `subject` and loads its snapshot.
    ///
    /// A second call for the same subject while the first is still
    /// loading returns immediately without fetching. Fetch failures are
    /// logged and replaced by the empty snapshot; nothing is returned to
    /// the caller.
    pub async fn initialize(&self, subject: Subject) {
        let key = Self::load_key(&subject);
        let ticket = match self.inner.guard.try_enter(&key) {
            Some(ticket) => ticket,
            None => {
                let loading = {
                    let session = self.lock_session();
                    session.state == ReconcilerState::Initializing
                        && session.subject.as_ref() == Some(&subject)
                };
                if loading {
                    tracing::debug!(%subject, "initialize already in flight; skipped");
                    return;
                }
                // Held by a load that a later session already superseded.
                self.inner.guard.release(&key);
                let Some(ticket) = self.inner.guard.try_enter(&key) else {
                    return;
                };
                ticket
            }
        };

        let generation = {
            let mut session = self.lock_session();
            session.generation = session.generation.wrapping_add(1);
            session.state = ReconcilerState::Initializing;
            session.subject = Some(subject.clone());
            session.snapshot = Some(DashboardSnapshot::empty());
            session.generation
        };
        tracing::info!(%subject, generation, "dashboard initializing");

        self.attach(&subject);
        self.load(&subject, generation).await;
        drop(ticket);
    }

    /// Re-fetches the current subject's snapshot, discarding accumulated
    /// patches. The previous snapshot stays readable until the new one
    /// lands.
    ///
    /// Returns `false` without doing anything when there is no subject or
    /// a load for it is already in flight.
    pub async fn refresh(&self) -> bool {
        let Some(subject) = self.subject() else {
            tracing::debug!("refresh without a subject; skipped");
            return false;
        };
        let Some(ticket) = self.inner.guard.try_enter(&Self::load_key(&subject)) else {
            tracing::debug!(%subject, "refresh while loading; skipped");
            return false;
        };

        let generation = {
            let mut session = self.lock_session();
            if session.subject.as_ref() != Some(&subject) {
                return false;
            }
            session.generation = session.generation.wrapping_add(1);
            session.state = ReconcilerState::Initializing;
            session.generation
        };
        tracing::info!(%subject, generation, "dashboard refreshing");

        self.attach(&subject);
        self.load(&subject, generation).await;
        drop(ticket);
        true
    }

    /// Ends the session: clears the snapshot and subject, removes the
    /// push handlers, and makes any pending fetch land nowhere.
    ///
    /// The shared transport stays open and local listeners stay
    /// registered.
    pub fn destroy(&self) {
        let subject = {
            let mut session = self.lock_session();
            session.generation = session.generation.wrapping_add(1);
            session.state = ReconcilerState::Uninitialized;
            session.snapshot = None;
            session.subject.take()
        };
        self.inner.guard.release_all();
        for name in self.push_event_names() {
            self.inner.connection.off(&name);
        }
        self.inner.connection.off(CONNECT_EVENT);
        match subject {
            Some(subject) => tracing::info!(%subject, "dashboard session destroyed"),
            None => tracing::debug!("destroy without a session"),
        }
    }

    /// Ensures the transport is up, our push handlers are registered, and
    /// the subject's room is joined.
    fn attach(&self, subject: &Subject) {
        match self.inner.credentials.token() {
            Some(token) => self.inner.connection.connect(&token),
            None => tracing::warn!(%subject, "no credential; push connection not opened"),
        }
        for name in self.push_event_names() {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let event = name.clone();
            self.inner.connection.on(
                &name,
                Arc::new(move |data: &Value| {
                    if let Some(inner) = weak.upgrade() {
                        Reconciler { inner }.handle_push(&event, data.clone());
                    }
                }),
            );
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.connection.on(
            CONNECT_EVENT,
            Arc::new(move |data: &Value| {
                let reconnect = data.get("reconnect").and_then(Value::as_bool) == Some(true);
                if let (true, Some(inner)) = (reconnect, weak.upgrade()) {
                    Reconciler { inner }.resync_after_reconnect();
                }
            }),
        );
        self.inner.connection.join_room(subject.room());
    }

    /// Events missed while the link was down are gone for good, so a
    /// reconnect triggers a full refresh.
    fn resync_after_reconnect(&self) {
        if self.state() != ReconcilerState::Ready {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::info!("transport reconnected; refreshing snapshot");
                let reconciler = self.clone();
                handle.spawn(async move {
                    reconciler.refresh().await;
                });
            }
            Err(_) => tracing::warn!("transport reconnected outside a runtime; refresh skipped"),
        }
    }

    fn push_event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = EventKind::ALL
            .into_iter()
            .map(|kind| kind.as_str().to_string())
            .collect();
        for extra in &self.inner.options.extra_events {
            if !names.contains(extra) {
                names.push(extra.clone());
            }
        }
        names
    }

    async fn load(&self, subject: &Subject, generation: u64) {
        Counters::bump(&self.inner.counters.snapshot_fetches);
        let started = Instant::now();
        let mut snapshot = match self.inner.fetcher.fetch(subject).await {
            Ok(snapshot) => {
                tracing::info!(
                    %subject,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    applications = snapshot.applications.len(),
                    interviews = snapshot.interviews.len(),
                    "snapshot fetched"
                );
                snapshot
            }
            Err(err) => {
                Counters::bump(&self.inner.counters.fetch_failures);
                tracing::warn!(%subject, error = %err, "snapshot fetch failed; using empty snapshot");
                DashboardSnapshot::empty()
            }
        };
        snapshot.recount();

        {
            let mut session = self.lock_session();
            if session.generation != generation || session.subject.as_ref() != Some(subject) {
                Counters::bump(&self.inner.counters.stale_results);
                tracing::info!(%subject, generation, "stale snapshot discarded");
                return;
            }
            session.snapshot = Some(snapshot.clone());
            session.state = ReconcilerState::Ready;
        }
        self.publish_snapshot(snapshot);
    }

    fn publish_snapshot(&self, snapshot: DashboardSnapshot) {
        let stats = snapshot.stats;
        self.inner
            .dispatcher
            .emit(DATA_UPDATED, &DashboardUpdate::Snapshot(snapshot));
        self.inner
            .dispatcher
            .emit(STATS_UPDATED, &DashboardUpdate::Stats(stats));
    }

    /// Normalizes a raw push frame and applies it.
    pub fn handle_push(&self, name: &str, data: Value) -> ApplyOutcome {
        self.apply_event(NormalizedEvent::parse(name, data))
    }

    /// Applies one event.
    ///
    /// Without a subject the event is dropped. Otherwise a notification
    /// is published (except for `stats_updated`), the snapshot is patched
    /// when the state is `Ready` and the policy allows it, and the raw
    /// event is republished on its own name.
    pub fn apply_event(&self, event: NormalizedEvent) -> ApplyOutcome {
        let patched = {
            let mut session = self.lock_session();
            let Some(subject) = session.subject.clone() else {
                Counters::bump(&self.inner.counters.events_ignored);
                tracing::debug!(event = %event.name, "no active subject; event ignored");
                return ApplyOutcome::Ignored;
            };
            let ready = session.state == ReconcilerState::Ready;
            match session.snapshot.as_mut() {
                Some(snapshot) if ready => {
                    patch_snapshot(&self.inner.options.patch_policy, &subject, snapshot, &event)
                        .then(|| snapshot.clone())
                }
                _ => None,
            }
        };

        let outcome = if let Some(snapshot) = patched {
            Counters::bump(&self.inner.counters.events_patched);
            self.publish_snapshot(snapshot);
            ApplyOutcome::Patched
        } else {
            Counters::bump(&self.inner.counters.events_forwarded);
            ApplyOutcome::Forwarded
        };
        tracing::debug!(event = %event.name, ?outcome, "event applied");

        if event.kind() != Some(EventKind::StatsUpdated) {
            self.inner.dispatcher.emit(
                NOTIFICATION,
                &DashboardUpdate::Notification(Notification::from_event(&event)),
            );
            let channel = event.name.clone();
            self.inner
                .dispatcher
                .emit(&channel, &DashboardUpdate::Event(event));
        }
        outcome
    }

    /// Copy of the current snapshot; `None` without a session.
    #[must_use]
    pub fn current_snapshot(&self) -> Option<DashboardSnapshot> {
        self.lock_session().snapshot.clone()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReconcilerState {
        self.lock_session().state
    }

    /// Active subject.
    #[must_use]
    pub fn subject(&self) -> Option<Subject> {
        self.lock_session().subject.clone()
    }

    /// `true` when a subject is active and the transport is connected.
    #[must_use]
    pub fn is_realtime_connected(&self) -> bool {
        self.subject().is_some() && self.inner.connection.is_connected()
    }

    /// Registers a listener on a dispatcher channel.
    pub fn on(&self, channel: &str, listener: Listener) -> ListenerId {
        self.inner.dispatcher.on(channel, listener)
    }

    /// Removes one listener, or every listener on `channel` when `id` is
    /// `None`.
    pub fn off(&self, channel: &str, id: Option<ListenerId>) -> usize {
        self.inner.dispatcher.off(channel, id)
    }

    /// The shared connection manager.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Names of every channel a listener may want: the three state
    /// channels plus each subscribed push event.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut channels = vec![
            DATA_UPDATED.to_string(),
            STATS_UPDATED.to_string(),
            NOTIFICATION.to_string(),
        ];
        for name in self.push_event_names() {
            if !channels.contains(&name) {
                channels.push(name);
            }
        }
        channels
    }

    /// Counter values.
    #[must_use]
    pub fn metrics(&self) -> ReconcilerMetrics {
        self.inner.counters.snapshot()
    }

    /// Current state, subject, connectivity, and counters.
    #[must_use]
    pub fn status(&self) -> ReconcilerStatus {
        let (state, subject) = {
            let session = self.lock_session();
            (session.state, session.subject.clone())
        };
        ReconcilerStatus {
            state,
            realtime_connected: subject.is_some() && self.inner.connection.is_connected(),
            subject,
            patch_events: self.inner.options.patch_policy.names(),
            metrics: self.metrics(),
        }
    }
}

/// Merges `event` into `snapshot`. Returns `true` if anything changed.
fn patch_snapshot(
    policy: &PatchPolicy,
    subject: &Subject,
    snapshot: &mut DashboardSnapshot,
    event: &NormalizedEvent,
) -> bool {
    let Some(kind) = event.kind() else {
        return false;
    };
    if !policy.patches(kind) {
        return false;
    }
    let concerns = event.payload.concerns(subject);
    if concerns == Some(false) {
        tracing::debug!(event = %event.name, %subject, "event addresses another subject; not patched");
        return false;
    }

    let changed = match &event.payload {
        PushEvent::InterviewScheduled(_) => {
            concerns == Some(true)
                && upsert(snapshot, Collection::Interviews, event, &["id"])
        }
        PushEvent::StatsUpdated(patch) => {
            snapshot.stats.merge(patch);
            true
        }
        PushEvent::JobViewed(_) => upsert(snapshot, Collection::ViewedJobs, event, &["id", "jobId"]),
        PushEvent::JobSaved(_) => upsert(snapshot, Collection::SavedJobs, event, &["id", "jobId"]),
        PushEvent::JobUnsaved(activity) => {
            let mut removed = false;
            for id in [activity.id.as_ref(), activity.job_id.as_ref()]
                .into_iter()
                .flatten()
            {
                removed |= snapshot.remove(Collection::SavedJobs, id);
            }
            removed
        }
        PushEvent::ApplicationCreated(_) => {
            upsert(snapshot, Collection::Applications, event, &["id"])
        }
        PushEvent::ApplicationUpdated(_) => match event.entry(&["id"]) {
            Some(entry) => {
                snapshot.merge_entry(Collection::Applications, entry);
                true
            }
            None => false,
        },
        PushEvent::ProfileUpdated(change) => {
            let fields = profile_fields(change, &event.data);
            if fields.is_empty() {
                false
            } else {
                snapshot.merge_profile(&fields);
                snapshot.rederive_profile_stats();
                true
            }
        }
        PushEvent::Other => false,
    };

    if changed {
        snapshot.recount();
        tracing::info!(event = %event.name, %subject, "snapshot patched");
    }
    changed
}

fn upsert(
    snapshot: &mut DashboardSnapshot,
    collection: Collection,
    event: &NormalizedEvent,
    id_keys: &[&str],
) -> bool {
    match event.entry(id_keys) {
        Some(entry) => {
            snapshot.upsert(collection, entry);
            true
        }
        None => {
            tracing::warn!(event = %event.name, "event payload has no usable id; not patched");
            false
        }
    }
}

/// Profile fields carried by a `profile_updated` payload: the nested
/// `profile` object when present, otherwise the payload minus routing keys.
fn profile_fields(change: &ProfileChange, data: &Value) -> Map<String, Value> {
    if let Some(profile) = &change.profile {
        return profile.clone();
    }
    let mut fields = data.as_object().cloned().unwrap_or_default();
    for key in ["studentId", "companyId", "timestamp"] {
        fields.remove(key);
    }
    fields
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{DashboardStats, RecordId};
    use crate::realtime::{RoomId, Transport, TransportSignal};
    use crate::service::auth::SessionCredential;
    use crate::test_support::{MockFetcher, MockTransport};
    use serde_json::json;

    type Recorded = Arc<Mutex<Vec<(String, DashboardUpdate)>>>;

    struct Harness {
        transport: Arc<MockTransport>,
        fetcher: Arc<MockFetcher>,
        reconciler: Reconciler,
        recorded: Recorded,
    }

    fn harness(fetcher: MockFetcher, policy: PatchPolicy) -> Harness {
        let transport = Arc::new(MockTransport::default());
        let fetcher = Arc::new(fetcher);
        let connection = ConnectionManager::new(Arc::clone(&transport) as Arc<dyn Transport>);
        let reconciler = Reconciler::new(
            connection,
            Arc::clone(&fetcher) as Arc<dyn SnapshotFetcher>,
            Arc::new(SessionCredential::new(Some("token".to_string()))),
            ReconcilerOptions {
                patch_policy: policy,
                extra_events: vec!["company_verified".to_string()],
            },
        );
        let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
        for channel in reconciler.channels() {
            let sink = Arc::clone(&recorded);
            let name = channel.clone();
            reconciler.on(
                &channel,
                Arc::new(move |update| {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((name.clone(), update.clone()));
                }),
            );
        }
        Harness {
            transport,
            fetcher,
            reconciler,
            recorded,
        }
    }

    impl Harness {
        fn channels(&self) -> Vec<String> {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(channel, _)| channel.clone())
                .collect()
        }

        fn last_stats(&self) -> Option<DashboardStats> {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .rev()
                .find(|(channel, _)| channel == STATS_UPDATED)
                .and_then(|(_, update)| update.stats())
        }

        fn clear(&self) {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        fn snapshot(&self) -> DashboardSnapshot {
            let Some(snapshot) = self.reconciler.current_snapshot() else {
                panic!("expected a snapshot");
            };
            snapshot
        }
    }

    fn student(id: &str) -> Subject {
        let Ok(subject) = Subject::student(id) else {
            panic!("valid subject");
        };
        subject
    }

    fn scenario_a_snapshot() -> DashboardSnapshot {
        let Ok(snapshot) = serde_json::from_value(json!({
            "applications": [],
            "interviews": [],
            "stats": {
                "profileCompletion": 40,
                "totalSkills": 3,
                "totalProjects": 1,
                "totalCertifications": 0
            }
        })) else {
            panic!("fixture must decode");
        };
        snapshot
    }

    fn interview(id: &str, student_id: &str, title: &str) -> NormalizedEvent {
        NormalizedEvent::parse(
            "interview_scheduled",
            json!({"id": id, "studentId": student_id, "jobTitle": title}),
        )
    }

    #[tokio::test]
    async fn p1_double_initialize_issues_one_fetch() {
        let h = harness(MockFetcher::default().gated(), PatchPolicy::notify_only());
        let subject = student("student-1");
        tokio::join!(h.reconciler.initialize(subject.clone()), async {
            tokio::task::yield_now().await;
            h.reconciler.initialize(subject.clone()).await;
            h.fetcher.release();
        });
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.reconciler.state(), ReconcilerState::Ready);
    }

    #[tokio::test]
    async fn p2_interviews_recount_without_touching_profile_stats() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;

        for (i, id) in ["iv-1", "iv-2", "iv-3"].into_iter().enumerate() {
            h.reconciler
                .apply_event(interview(id, "student-1", "Backend Dev"));
            let stats = h.snapshot().stats;
            assert_eq!(stats.profile_completion, 40);
            assert_eq!(stats.total_skills, 3);
            assert_eq!(stats.total_interviews as usize, i + 1);
            assert_eq!(h.snapshot().interviews.len(), i + 1);
        }
    }

    #[tokio::test]
    async fn p3_fetch_resolving_after_destroy_is_discarded() {
        let fetcher = MockFetcher::returning(scenario_a_snapshot()).gated();
        let h = harness(fetcher, PatchPolicy::notify_only());
        tokio::join!(h.reconciler.initialize(student("A")), async {
            tokio::task::yield_now().await;
            h.reconciler.destroy();
            h.fetcher.release();
        });
        assert_eq!(h.reconciler.state(), ReconcilerState::Uninitialized);
        assert!(h.reconciler.current_snapshot().is_none());
        assert!(h.reconciler.subject().is_none());
        assert_eq!(h.reconciler.metrics().stale_results, 1);
        assert!(!h.channels().iter().any(|c| c == DATA_UPDATED));
    }

    #[tokio::test]
    async fn p3_switching_subject_discards_previous_fetch() {
        let fetcher = MockFetcher::returning(scenario_a_snapshot()).gated();
        let h = harness(fetcher, PatchPolicy::notify_only());
        tokio::join!(h.reconciler.initialize(student("A")), async {
            tokio::task::yield_now().await;
            let second = h.reconciler.initialize(student("B"));
            h.fetcher.release();
            h.fetcher.release();
            second.await;
        });
        assert_eq!(h.reconciler.subject(), Some(student("B")));
        assert_eq!(h.reconciler.state(), ReconcilerState::Ready);
        assert_eq!(h.reconciler.metrics().stale_results, 1);
        assert_eq!(h.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn p5_event_before_initialize_is_ignored() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        let outcome = h
            .reconciler
            .apply_event(interview("iv-1", "student-1", "Backend Dev"));
        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert!(h.channels().is_empty());

        h.reconciler.initialize(student("student-1")).await;
        assert!(h.snapshot().interviews.is_empty());
    }

    #[tokio::test]
    async fn p5_event_during_load_does_not_leak_into_snapshot() {
        let fetcher = MockFetcher::returning(scenario_a_snapshot()).gated();
        let h = harness(fetcher, PatchPolicy::notify_only());
        let outcome = Arc::new(Mutex::new(None));
        tokio::join!(h.reconciler.initialize(student("student-1")), async {
            tokio::task::yield_now().await;
            let applied = h
                .reconciler
                .apply_event(interview("iv-1", "student-1", "Backend Dev"));
            *outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(applied);
            h.fetcher.release();
        });
        assert_eq!(
            *outcome.lock().unwrap_or_else(PoisonError::into_inner),
            Some(ApplyOutcome::Forwarded)
        );
        let snapshot = h.snapshot();
        assert!(snapshot.interviews.is_empty());
        assert_eq!(snapshot.stats.profile_completion, 40);
    }

    #[tokio::test]
    async fn scenario_a_initial_stats_are_published() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;

        assert_eq!(h.channels(), vec![DATA_UPDATED, STATS_UPDATED]);
        let Some(stats) = h.last_stats() else {
            panic!("stats_updated not emitted");
        };
        assert_eq!(stats.profile_completion, 40);
        assert_eq!(stats.total_skills, 3);
        assert_eq!(stats.total_projects, 1);
        assert_eq!(stats.total_certifications, 0);
    }

    #[tokio::test]
    async fn scenario_b_interview_is_inserted_and_published() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.clear();

        let outcome = h
            .reconciler
            .apply_event(interview("iv-1", "student-1", "Backend Dev"));
        assert_eq!(outcome, ApplyOutcome::Patched);

        let interviews = h.snapshot().interviews;
        assert_eq!(interviews.len(), 1);
        let Some(entry) = interviews.first() else {
            panic!("one interview");
        };
        assert_eq!(entry.id, RecordId::new("iv-1"));
        assert_eq!(entry.title.as_deref(), Some("Backend Dev"));

        let channels = h.channels();
        assert!(channels.iter().any(|c| c == DATA_UPDATED));
        assert!(channels.iter().any(|c| c == STATS_UPDATED));
        assert!(channels.iter().any(|c| c == NOTIFICATION));
        assert!(channels.iter().any(|c| c == "interview_scheduled"));
    }

    #[tokio::test]
    async fn scenario_c_same_interview_id_updates_in_place() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.reconciler
            .apply_event(interview("iv-1", "student-1", "Backend Dev"));
        h.reconciler
            .apply_event(interview("iv-1", "student-1", "Backend Dev v2"));

        let interviews = h.snapshot().interviews;
        assert_eq!(interviews.len(), 1);
        assert_eq!(
            interviews.first().and_then(|e| e.title.as_deref()),
            Some("Backend Dev v2")
        );
        assert_eq!(h.snapshot().stats.total_interviews, 1);
    }

    #[tokio::test]
    async fn scenario_d_fetch_failure_yields_empty_snapshot() {
        let h = harness(MockFetcher::failing("connection refused"), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-2")).await;

        let snapshot = h.snapshot();
        assert_eq!(snapshot, DashboardSnapshot::empty());
        assert_eq!(snapshot.stats, DashboardStats::default());
        assert_eq!(h.reconciler.state(), ReconcilerState::Ready);
        assert_eq!(h.channels(), vec![DATA_UPDATED, STATS_UPDATED]);
        assert_eq!(h.reconciler.metrics().fetch_failures, 1);
    }

    #[tokio::test]
    async fn interview_for_other_student_is_not_patched() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        let outcome = h
            .reconciler
            .apply_event(interview("iv-9", "student-7", "Backend Dev"));
        assert_eq!(outcome, ApplyOutcome::Forwarded);
        assert!(h.snapshot().interviews.is_empty());

        let anonymous = NormalizedEvent::parse("interview_scheduled", json!({"id": "iv-3"}));
        assert_eq!(h.reconciler.apply_event(anonymous), ApplyOutcome::Forwarded);
    }

    #[tokio::test]
    async fn stats_updated_merges_without_notification() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.clear();

        let outcome = h
            .reconciler
            .handle_push("stats_updated", json!({"profileCompletion": 70, "totalSkills": 5}));
        assert_eq!(outcome, ApplyOutcome::Patched);
        let stats = h.snapshot().stats;
        assert_eq!(stats.profile_completion, 70);
        assert_eq!(stats.total_skills, 5);
        assert_eq!(stats.total_projects, 1);
        assert_eq!(h.channels(), vec![DATA_UPDATED, STATS_UPDATED]);
    }

    #[tokio::test]
    async fn notify_only_kinds_forward_without_mutation() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.clear();

        let outcome = h.reconciler.handle_push(
            "job_saved",
            json!({"id": 5, "jobId": 9, "studentId": "student-1", "jobTitle": "Rust Dev"}),
        );
        assert_eq!(outcome, ApplyOutcome::Forwarded);
        assert!(h.snapshot().saved_jobs.is_empty());
        assert_eq!(h.channels(), vec![NOTIFICATION, "job_saved"]);
    }

    #[tokio::test]
    async fn enabled_kinds_patch_their_collections() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::all());
        h.reconciler.initialize(student("student-1")).await;

        h.reconciler.handle_push(
            "job_saved",
            json!({"id": 5, "jobId": 9, "studentId": "student-1", "jobTitle": "Rust Dev"}),
        );
        h.reconciler.handle_push(
            "application_created",
            json!({"id": 11, "studentId": "student-1", "jobTitle": "Rust Dev", "status": "PENDING"}),
        );
        h.reconciler.handle_push(
            "application_updated",
            json!({"id": 11, "studentId": "student-1", "status": "ACCEPTED"}),
        );
        h.reconciler
            .handle_push("job_viewed", json!({"jobId": 9, "jobTitle": "Rust Dev"}));

        let snapshot = h.snapshot();
        assert_eq!(snapshot.saved_jobs.len(), 1);
        assert_eq!(snapshot.applications.len(), 1);
        assert_eq!(snapshot.viewed_jobs.len(), 1);
        let Some(application) = snapshot.applications.first() else {
            panic!("one application");
        };
        assert_eq!(application.fields.get("status"), Some(&json!("ACCEPTED")));
        assert_eq!(application.title.as_deref(), Some("Rust Dev"));
        assert_eq!(snapshot.stats.total_saved_jobs, 1);
        assert_eq!(snapshot.stats.total_applications, 1);

        h.reconciler
            .handle_push("job_unsaved", json!({"jobId": 9, "studentId": "student-1"}));
        let snapshot = h.snapshot();
        assert!(snapshot.saved_jobs.is_empty());
        assert_eq!(snapshot.stats.total_saved_jobs, 0);
    }

    #[tokio::test]
    async fn profile_update_rederives_profile_stats() {
        let policy = PatchPolicy::notify_only().with(EventKind::ProfileUpdated);
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), policy);
        h.reconciler.initialize(student("student-1")).await;

        h.reconciler.handle_push(
            "profile_updated",
            json!({
                "studentId": "student-1",
                "profile": {"fullName": "An", "email": "an@example.com", "skills": ["rust", "go"]}
            }),
        );
        let snapshot = h.snapshot();
        assert_eq!(snapshot.profile.get("fullName"), Some(&json!("An")));
        assert_eq!(snapshot.stats.profile_completion, 30);
        assert_eq!(snapshot.stats.total_skills, 2);
        assert_eq!(snapshot.stats.total_projects, 0);
    }

    #[tokio::test]
    async fn unknown_event_still_notifies() {
        let h = harness(MockFetcher::default(), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.clear();

        let outcome = h.reconciler.handle_push("company_verified", json!({"companyId": 4}));
        assert_eq!(outcome, ApplyOutcome::Forwarded);
        assert_eq!(h.channels(), vec![NOTIFICATION, "company_verified"]);
    }

    #[tokio::test]
    async fn push_frames_reach_the_snapshot_through_the_transport() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;

        assert_eq!(h.transport.credentials(), vec!["token"]);
        h.transport.connect();
        assert_eq!(
            h.transport.sent(),
            vec![RoomId::User("student-1".to_string()).join_frame()]
        );
        assert!(h.reconciler.is_realtime_connected());

        h.transport.push(
            "interview_scheduled",
            json!({"id": "iv-1", "studentId": "student-1", "jobTitle": "Backend Dev"}),
        );
        assert_eq!(h.snapshot().interviews.len(), 1);
    }

    #[tokio::test]
    async fn destroy_detaches_push_handlers_but_keeps_transport() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.transport.connect();
        assert!(h.reconciler.connection().handler_count() > 0);

        h.reconciler.destroy();
        assert_eq!(h.reconciler.connection().handler_count(), 0);
        assert!(h.reconciler.connection().is_connected());
        assert!(!h.reconciler.is_realtime_connected());
        assert_eq!(h.transport.closes(), 0);

        h.clear();
        assert_eq!(
            h.reconciler
                .apply_event(interview("iv-1", "student-1", "Backend Dev")),
            ApplyOutcome::Ignored
        );
        assert!(h.channels().is_empty());
    }

    #[tokio::test]
    async fn reconnect_triggers_full_refresh() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.transport.connect();
        assert_eq!(h.fetcher.calls(), 1);

        h.transport.signal(TransportSignal::Disconnected {
            reason: "network".to_string(),
        });
        h.transport.connect();
        for _ in 0..100 {
            if h.fetcher.calls() == 2 && h.reconciler.state() == ReconcilerState::Ready {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(h.reconciler.state(), ReconcilerState::Ready);
        // One join for the first connect and one for the reconnect; the
        // refresh must not add a third.
        let joins = h
            .transport
            .sent()
            .into_iter()
            .filter(|frame| frame.event == "join")
            .count();
        assert_eq!(joins, 2);
    }

    #[tokio::test]
    async fn refresh_replaces_accumulated_patches() {
        let h = harness(MockFetcher::returning(scenario_a_snapshot()), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.reconciler
            .apply_event(interview("iv-1", "student-1", "Backend Dev"));
        assert_eq!(h.snapshot().interviews.len(), 1);

        assert!(h.reconciler.refresh().await);
        assert_eq!(h.fetcher.calls(), 2);
        assert!(h.snapshot().interviews.is_empty());
        assert_eq!(h.reconciler.state(), ReconcilerState::Ready);
        // Reconnect with the same token is a no-op.
        assert_eq!(h.transport.opens(), 1);
    }

    #[tokio::test]
    async fn refresh_without_subject_does_nothing() {
        let h = harness(MockFetcher::default(), PatchPolicy::notify_only());
        assert!(!h.reconciler.refresh().await);
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn reinitialize_after_destroy_fetches_again() {
        let h = harness(MockFetcher::default(), PatchPolicy::notify_only());
        h.reconciler.initialize(student("student-1")).await;
        h.reconciler.destroy();
        h.reconciler.initialize(student("student-1")).await;
        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(h.reconciler.state(), ReconcilerState::Ready);
    }

    #[test]
    fn patch_list_parses_names_and_all() {
        let Ok(policy) = PatchPolicy::parse_list(" job_saved , job_unsaved ") else {
            panic!("valid list");
        };
        assert!(policy.patches(EventKind::JobSaved));
        assert!(policy.patches(EventKind::InterviewScheduled));
        assert!(!policy.patches(EventKind::JobViewed));

        let Ok(all) = PatchPolicy::parse_list("all") else {
            panic!("valid list");
        };
        assert_eq!(all.names().len(), EventKind::ALL.len());
        assert!(PatchPolicy::parse_list("job_deleted").is_err());
        assert_eq!(
            PatchPolicy::parse_list("").ok(),
            Some(PatchPolicy::notify_only())
        );
    }
}
