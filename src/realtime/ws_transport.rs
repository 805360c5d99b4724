//! WebSocket [`Transport`] backed by `tokio-tungstenite`.
//!
//! Each link runs in its own task: connect, report `Connected`, pump
//! frames both ways until the socket drops, then retry after a fixed
//! delay. After `attempts` consecutive failed connects the link reports
//! `Closed` and exits. The credential travels as a `token` query
//! parameter on the upgrade request.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::transport::{Frame, SignalSink, Transport, TransportLink, TransportSignal};
use crate::error::SyncError;

/// Retry behaviour of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed connects before the link gives up.
    pub attempts: u32,
    /// Pause between connect attempts.
    pub delay: Duration,
    /// Upper bound on a single connect handshake.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens WebSocket links to the push server.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
    policy: ReconnectPolicy,
}

impl WsTransport {
    /// Creates a transport for `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `url` does not parse or is not a
    /// WebSocket URL.
    pub fn new(url: &str, policy: ReconnectPolicy) -> Result<Self, SyncError> {
        let url = Url::parse(url)
            .map_err(|e| SyncError::Config(format!("invalid push URL {url:?}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(SyncError::Config(format!(
                "push URL must use ws or wss, got {}",
                url.scheme()
            )));
        }
        Ok(Self { url, policy })
    }

    /// Target URL without credentials.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn url_with_token(&self, credential: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", credential);
        url
    }
}

impl Transport for WsTransport {
    fn open(&self, credential: &str, sink: SignalSink) -> Box<dyn TransportLink> {
        let (outbox, rx) = mpsc::unbounded_channel();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_link(
                    self.url_with_token(credential),
                    self.policy,
                    sink,
                    rx,
                ));
            }
            Err(err) => {
                tracing::error!(error = %err, "no tokio runtime; push link not started");
            }
        }
        Box::new(WsLink {
            outbox: Some(outbox),
        })
    }
}

#[derive(Debug)]
struct WsLink {
    outbox: Option<mpsc::UnboundedSender<Frame>>,
}

impl TransportLink for WsLink {
    fn send(&self, frame: Frame) -> bool {
        self.outbox
            .as_ref()
            .is_some_and(|outbox| outbox.send(frame).is_ok())
    }

    fn close(&mut self) {
        self.outbox = None;
    }
}

enum PumpEnd {
    Dropped(String),
    Closed,
}

async fn run_link(
    url: Url,
    policy: ReconnectPolicy,
    sink: SignalSink,
    mut outbox: mpsc::UnboundedReceiver<Frame>,
) {
    let mut target = url.clone();
    target.set_query(None);
    let attempts = policy.attempts.max(1);
    let mut failures: u32 = 0;

    while sink.is_current() {
        tracing::debug!(%target, "push connect attempt");
        let outcome = tokio::time::timeout(policy.connect_timeout, connect_async(url.as_str())).await;
        let reason = match outcome {
            Ok(Ok((stream, _response))) => {
                failures = 0;
                // Anything queued for a previous socket is stale.
                while outbox.try_recv().is_ok() {}
                sink.deliver(TransportSignal::Connected);
                match pump(stream, &sink, &mut outbox).await {
                    PumpEnd::Closed => return,
                    PumpEnd::Dropped(reason) => {
                        sink.deliver(TransportSignal::Disconnected { reason });
                        None
                    }
                }
            }
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!(
                "connect timed out after {}ms",
                policy.connect_timeout.as_millis()
            )),
        };

        if let Some(reason) = reason {
            failures = failures.saturating_add(1);
            sink.deliver(TransportSignal::ConnectError { reason });
            if failures >= attempts {
                sink.deliver(TransportSignal::Closed {
                    reason: format!("gave up after {failures} failed connects"),
                });
                return;
            }
        }
        tokio::time::sleep(policy.delay).await;
    }
    tracing::debug!(%target, "push link superseded; task exiting");
}

async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    sink: &SignalSink,
    outbox: &mut mpsc::UnboundedReceiver<Frame>,
) -> PumpEnd {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Frame>(text.as_str()) {
                    Ok(frame) => sink.deliver(TransportSignal::Frame(frame)),
                    Err(err) => tracing::warn!(error = %err, "malformed push frame dropped"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return PumpEnd::Dropped("closed by server".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return PumpEnd::Dropped(err.to_string()),
            },
            outgoing = outbox.recv() => match outgoing {
                Some(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(error = %err, event = %frame.event, "frame not serializable");
                            continue;
                        }
                    };
                    if let Err(err) = write.send(Message::text(text)).await {
                        return PumpEnd::Dropped(err.to_string());
                    }
                }
                None => {
                    if let Err(err) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %err, "close frame not sent");
                    }
                    return PumpEnd::Closed;
                }
            },
        }
    }
}
