//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Dashboard endpoints are mounted under `/api/v1`; health and the OpenAPI
//! document live at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "dashboard-sync", description = "Local dashboard synchronization agent"),
    paths(
        handlers::dashboard::get_dashboard,
        handlers::dashboard::get_stats,
        handlers::dashboard::start_session,
        handlers::dashboard::end_session,
        handlers::dashboard::refresh,
        handlers::dashboard::get_status,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::StartSessionRequest,
        dto::SubjectDto,
        dto::SnapshotResponse,
        dto::StatsDto,
        dto::StatsResponse,
        dto::SessionResponse,
        dto::TransportStatusDto,
        dto::StatusResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "Dashboard", description = "Dashboard session, snapshot, and status"),
        (name = "System", description = "Health and metadata"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}
