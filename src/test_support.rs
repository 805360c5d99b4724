//! In-memory doubles for the transport and the snapshot endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::app_state::AppState;
use crate::domain::{DashboardSnapshot, EventBus, Subject};
use crate::error::SyncError;
use crate::realtime::{
    ConnectionManager, Frame, SignalSink, Transport, TransportLink, TransportSignal,
};
use crate::service::{Reconciler, ReconcilerOptions, SessionCredential, SnapshotFetcher};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that records opens and lets the test drive signals.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    opened: Mutex<Vec<(String, SignalSink)>>,
    sent: Arc<Mutex<Vec<Frame>>>,
    closes: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct MockLink {
    sent: Arc<Mutex<Vec<Frame>>>,
    closes: Arc<AtomicUsize>,
    open: bool,
}

impl Transport for MockTransport {
    fn open(&self, credential: &str, sink: SignalSink) -> Box<dyn TransportLink> {
        lock(&self.opened).push((credential.to_string(), sink));
        Box::new(MockLink {
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
            open: true,
        })
    }
}

impl TransportLink for MockLink {
    fn send(&self, frame: Frame) -> bool {
        if self.open {
            lock(&self.sent).push(frame);
        }
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl MockTransport {
    pub(crate) fn opens(&self) -> usize {
        lock(&self.opened).len()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn credentials(&self) -> Vec<String> {
        lock(&self.opened).iter().map(|(c, _)| c.clone()).collect()
    }

    pub(crate) fn sent(&self) -> Vec<Frame> {
        lock(&self.sent).clone()
    }

    /// Delivers `signal` through the most recently opened link.
    pub(crate) fn signal(&self, signal: TransportSignal) {
        let sink = lock(&self.opened).last().map(|(_, sink)| sink.clone());
        if let Some(sink) = sink {
            sink.deliver(signal);
        }
    }

    /// Delivers `signal` through the `index`-th opened link.
    pub(crate) fn signal_link(&self, index: usize, signal: TransportSignal) {
        let sink = lock(&self.opened).get(index).map(|(_, sink)| sink.clone());
        if let Some(sink) = sink {
            sink.deliver(signal);
        }
    }

    pub(crate) fn connect(&self) {
        self.signal(TransportSignal::Connected);
    }

    pub(crate) fn push(&self, event: &str, data: serde_json::Value) {
        self.signal(TransportSignal::Frame(Frame::new(event, data)));
    }
}

/// Fetcher answering from a queue; an empty queue yields the empty
/// snapshot. With a gate, every fetch waits for [`MockFetcher::release`].
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    calls: AtomicUsize,
    responses: Mutex<VecDeque<Result<DashboardSnapshot, SyncError>>>,
    gate: Option<Semaphore>,
}

impl MockFetcher {
    pub(crate) fn returning(snapshot: DashboardSnapshot) -> Self {
        let fetcher = Self::default();
        fetcher.push_response(Ok(snapshot));
        fetcher
    }

    pub(crate) fn failing(message: &str) -> Self {
        let fetcher = Self::default();
        fetcher.push_response(Err(SyncError::SnapshotFetch(message.to_string())));
        fetcher
    }

    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub(crate) fn push_response(&self, response: Result<DashboardSnapshot, SyncError>) {
        lock(&self.responses).push_back(response);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotFetcher for MockFetcher {
    async fn fetch(&self, _subject: &Subject) -> Result<DashboardSnapshot, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        let next = lock(&self.responses).pop_front();
        next.unwrap_or_else(|| Ok(DashboardSnapshot::empty()))
    }
}

/// Application state wired to in-memory doubles.
pub(crate) struct TestApp {
    pub(crate) state: AppState,
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) fetcher: Arc<MockFetcher>,
}

pub(crate) fn test_app(fetcher: MockFetcher) -> TestApp {
    let transport = Arc::new(MockTransport::default());
    let fetcher = Arc::new(fetcher);
    let connection = ConnectionManager::new(Arc::clone(&transport) as Arc<dyn Transport>);
    let reconciler = Reconciler::new(
        connection,
        Arc::clone(&fetcher) as Arc<dyn SnapshotFetcher>,
        Arc::new(SessionCredential::new(Some("token".to_string()))),
        ReconcilerOptions::default(),
    );
    TestApp {
        state: AppState {
            reconciler,
            event_bus: EventBus::new(64),
        },
        transport,
        fetcher,
    }
}
