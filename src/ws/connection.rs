//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered updates.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::ChannelUpdate;
use crate::service::Reconciler;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching updates from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut update_rx: broadcast::Receiver<ChannelUpdate>,
    reconciler: Reconciler,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &reconciler);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            update = update_rx.recv() => {
                match update {
                    Ok(update) => {
                        if subs.matches(&update.channel) {
                            let json = serde_json::to_string(&WsMessage::event(&update))
                                .unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON
/// response.
fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    reconciler: &Reconciler,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return serde_json::to_string(&WsMessage::error("", 400, "malformed JSON")).ok();
    };

    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return serde_json::to_string(&WsMessage::error(msg.id, 404, "unknown command")).ok();
    };

    let payload = match command {
        WsCommand::Subscribe { channels } => {
            subs.subscribe(&channels);
            json!({
                "subscribed": subs.channels(),
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { channels } => {
            subs.unsubscribe(&channels);
            json!({
                "unsubscribed": channels,
                "remaining_count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::GetSnapshot => {
            let (Some(subject), Some(snapshot)) =
                (reconciler.subject(), reconciler.current_snapshot())
            else {
                return serde_json::to_string(&WsMessage::error(
                    msg.id,
                    409,
                    "no active dashboard session",
                ))
                .ok();
            };
            json!({
                "subject": subject,
                "state": reconciler.state(),
                "snapshot": snapshot,
            })
        }
        WsCommand::GetStatus => serde_json::to_value(reconciler.status()).unwrap_or_default(),
        WsCommand::ListChannels => json!({ "channels": reconciler.channels() }),
    };

    let response = WsMessage::new(msg.id, WsMessageType::Response, payload);
    serde_json::to_string(&response).ok()
}
