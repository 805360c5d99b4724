//! dashboard-sync agent entry point.
//!
//! Wires the push transport, snapshot fetcher, and reconciler together,
//! then serves the local REST and WebSocket surface.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dashboard_sync::api;
use dashboard_sync::app_state::AppState;
use dashboard_sync::config::{LogFormat, SyncConfig};
use dashboard_sync::domain::EventBus;
use dashboard_sync::realtime::{ConnectionManager, Transport, WsTransport};
use dashboard_sync::service::{
    CredentialSource, HttpSnapshotFetcher, Reconciler, ReconcilerOptions, SessionCredential,
    forward_updates,
};
use dashboard_sync::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = SyncConfig::from_env().context("loading configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting dashboard-sync");

    // Realtime layer
    let credentials = Arc::new(SessionCredential::new(config.auth_token.clone()));
    let transport = WsTransport::new(&config.push_url, config.reconnect_policy())
        .context("building push transport")?;
    let connection = ConnectionManager::new(Arc::new(transport) as Arc<dyn Transport>);

    // Service layer
    let fetcher = HttpSnapshotFetcher::new(
        &config.api_base_url,
        config.request_timeout(),
        Arc::clone(&credentials) as Arc<dyn CredentialSource>,
    )
    .context("building snapshot fetcher")?;
    let reconciler = Reconciler::new(
        connection.clone(),
        Arc::new(fetcher),
        credentials,
        ReconcilerOptions {
            patch_policy: config.patch_policy.clone(),
            extra_events: config.extra_events.clone(),
        },
    );

    let event_bus = EventBus::new(config.event_bus_capacity);
    let bridge = forward_updates(&reconciler, &event_bus);
    tracing::debug!(channels = bridge.channels().len(), "bridged dispatcher to event bus");

    if let Some(subject) = config.initial_subject.clone() {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.initialize(subject).await });
    }

    // Build application state
    let app_state = AppState {
        reconciler: reconciler.clone(),
        event_bus,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bridge.detach(&reconciler);
    reconciler.destroy();
    connection.disconnect();
    tracing::info!("dashboard-sync stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
