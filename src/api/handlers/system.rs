//! System endpoints: health check and OpenAPI document.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::ApiDoc;
use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /api-docs/openapi.json` — Generated OpenAPI document.
pub async fn openapi_handler() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    let router = Router::new().route("/health", get(health_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route("/api-docs/openapi.json", get(openapi_handler));

    router
}
