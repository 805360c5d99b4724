//! Dashboard handlers: session lifecycle, snapshot, stats, status.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    SessionResponse, SnapshotResponse, StartSessionRequest, StatsDto, StatsResponse,
    StatusResponse, SubjectDto,
};
use crate::app_state::AppState;
use crate::domain::{Subject, SubjectKind};
use crate::error::{ErrorResponse, SyncError};

/// `GET /dashboard` — Current snapshot of the active subject.
///
/// # Errors
///
/// Returns [`SyncError::NotInitialized`] when no session is active.
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    tag = "Dashboard",
    summary = "Get dashboard snapshot",
    description = "Returns the reconciled snapshot. While the first fetch is in flight the snapshot is empty and the state is `initializing`.",
    responses(
        (status = 200, description = "Current snapshot", body = SnapshotResponse),
        (status = 409, description = "No active session", body = ErrorResponse),
    )
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, SyncError> {
    let reconciler = &state.reconciler;
    let subject = reconciler.subject().ok_or(SyncError::NotInitialized)?;
    let snapshot = reconciler
        .current_snapshot()
        .unwrap_or_else(crate::domain::DashboardSnapshot::empty);

    Ok(Json(SnapshotResponse {
        subject: SubjectDto::from(&subject),
        state: reconciler.state().as_str().to_string(),
        realtime_connected: reconciler.is_realtime_connected(),
        snapshot,
    }))
}

/// `GET /dashboard/stats` — Stats of the active subject.
///
/// # Errors
///
/// Returns [`SyncError::NotInitialized`] when no session is active.
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/stats",
    tag = "Dashboard",
    summary = "Get dashboard stats",
    responses(
        (status = 200, description = "Current stats", body = StatsResponse),
        (status = 409, description = "No active session", body = ErrorResponse),
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, SyncError> {
    let reconciler = &state.reconciler;
    let subject = reconciler.subject().ok_or(SyncError::NotInitialized)?;
    let stats = reconciler
        .current_snapshot()
        .map(|snapshot| snapshot.stats)
        .unwrap_or_default();

    Ok(Json(StatsResponse {
        subject: SubjectDto::from(&subject),
        stats: StatsDto::from(stats),
    }))
}

/// `POST /dashboard/session` — Start (or switch) the dashboard session.
///
/// The snapshot is loaded in the background; progress is visible through
/// `GET /dashboard` and the `data-updated` WebSocket channel.
///
/// # Errors
///
/// Returns [`SyncError::InvalidSubject`] on an unknown kind or blank id.
#[utoipa::path(
    post,
    path = "/api/v1/dashboard/session",
    tag = "Dashboard",
    summary = "Start a dashboard session",
    request_body = StartSessionRequest,
    responses(
        (status = 202, description = "Session initializing", body = SessionResponse),
        (status = 400, description = "Invalid subject", body = ErrorResponse),
    )
)]
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, SyncError> {
    let kind: SubjectKind = req.kind.parse()?;
    let subject = Subject::new(kind, req.id)?;
    let dto = SubjectDto::from(&subject);

    let reconciler = state.reconciler.clone();
    tokio::spawn(async move { reconciler.initialize(subject).await });

    Ok((
        StatusCode::ACCEPTED,
        Json(SessionResponse {
            subject: Some(dto),
            status: "initializing".to_string(),
        }),
    ))
}

/// `DELETE /dashboard/session` — Tear down the session.
#[utoipa::path(
    delete,
    path = "/api/v1/dashboard/session",
    tag = "Dashboard",
    summary = "End the dashboard session",
    description = "Discards the snapshot and any pending fetch. Idempotent.",
    responses(
        (status = 200, description = "Session destroyed", body = SessionResponse),
    )
)]
pub async fn end_session(State(state): State<AppState>) -> impl IntoResponse {
    let subject = state.reconciler.subject().as_ref().map(SubjectDto::from);
    state.reconciler.destroy();
    Json(SessionResponse {
        subject,
        status: "destroyed".to_string(),
    })
}

/// `POST /dashboard/refresh` — Reload the snapshot of the active subject.
///
/// # Errors
///
/// Returns [`SyncError::NotInitialized`] when no session is active.
#[utoipa::path(
    post,
    path = "/api/v1/dashboard/refresh",
    tag = "Dashboard",
    summary = "Refresh the snapshot",
    responses(
        (status = 202, description = "Refresh started", body = SessionResponse),
        (status = 409, description = "No active session", body = ErrorResponse),
    )
)]
pub async fn refresh(State(state): State<AppState>) -> Result<impl IntoResponse, SyncError> {
    let subject = state.reconciler.subject().ok_or(SyncError::NotInitialized)?;

    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        reconciler.refresh().await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SessionResponse {
            subject: Some(SubjectDto::from(&subject)),
            status: "refreshing".to_string(),
        }),
    ))
}

/// `GET /status` — Reconciler, transport, and consumer overview.
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "Dashboard",
    summary = "Sync status",
    responses(
        (status = 200, description = "Current status", body = StatusResponse),
    )
)]
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.reconciler.status();
    let transport = state.reconciler.connection().status();

    Json(StatusResponse {
        state: status.state.as_str().to_string(),
        subject: status.subject.as_ref().map(SubjectDto::from),
        realtime_connected: status.realtime_connected,
        patch_events: status.patch_events.iter().map(ToString::to_string).collect(),
        metrics: status.metrics,
        transport: transport.into(),
        ws_clients: state.event_bus.receiver_count(),
    })
}

/// Dashboard routes (mounted under `/api/v1`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/stats", get(get_stats))
        .route(
            "/dashboard/session",
            post(start_session).delete(end_session),
        )
        .route("/dashboard/refresh", post(refresh))
        .route("/status", get(get_status))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::domain::{DashboardEntry, DashboardSnapshot};
    use crate::service::ReconcilerState;
    use crate::test_support::{MockFetcher, TestApp, test_app};

    use super::*;

    fn router(app: &TestApp) -> Router {
        crate::api::build_router().with_state(app.state.clone())
    }

    async fn call(
        app: &TestApp,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        };
        let Ok(request) = request else {
            panic!("request must build");
        };
        let Ok(response) = router(app).oneshot(request).await;
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body must read");
        };
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn wait_ready(app: &TestApp) {
        for _ in 0..100 {
            if app.state.reconciler.state() == ReconcilerState::Ready {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("reconciler never became ready");
    }

    fn snapshot_with_interview() -> DashboardSnapshot {
        let mut snapshot = DashboardSnapshot::empty();
        let Some(map) = json!({"id": "i-1", "title": "Onsite"}).as_object().cloned() else {
            panic!("object literal");
        };
        let Ok(entry) = DashboardEntry::from_object(map, &["id"]) else {
            panic!("entry must parse");
        };
        snapshot.interviews.push(entry);
        snapshot.recount();
        snapshot
    }

    #[tokio::test]
    async fn dashboard_without_session_is_conflict() {
        let app = test_app(MockFetcher::default());
        let (status, body) = call(&app, Method::GET, "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let code = body
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(Value::as_u64);
        assert_eq!(code, Some(2001));

        let (status, _) = call(&app, Method::GET, "/api/v1/dashboard/stats", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(&app, Method::POST, "/api/v1/dashboard/refresh", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn start_session_loads_snapshot() {
        let app = test_app(MockFetcher::returning(snapshot_with_interview()));
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/dashboard/session",
            Some(json!({"kind": "Student", "id": "s-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.get("status"), Some(&json!("initializing")));
        assert_eq!(
            body.get("subject"),
            Some(&json!({"kind": "student", "id": "s-1"}))
        );

        wait_ready(&app).await;
        assert_eq!(app.fetcher.calls(), 1);
        assert_eq!(app.transport.opens(), 1);

        let (status, body) = call(&app, Method::GET, "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("state"), Some(&json!("ready")));
        assert_eq!(body.get("realtimeConnected"), Some(&json!(false)));

        let (status, body) = call(&app, Method::GET, "/api/v1/dashboard/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        let interviews = body
            .get("stats")
            .and_then(|s| s.get("totalInterviews"))
            .and_then(Value::as_u64);
        assert_eq!(interviews, Some(1));
    }

    #[tokio::test]
    async fn invalid_subject_is_bad_request() {
        let app = test_app(MockFetcher::default());
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/dashboard/session",
            Some(json!({"kind": "admin", "id": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/dashboard/session",
            Some(json!({"kind": "company", "id": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn end_session_clears_state() {
        let app = test_app(MockFetcher::default());
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/dashboard/session",
            Some(json!({"kind": "company", "id": "c-9"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_ready(&app).await;

        let (status, body) = call(&app, Method::DELETE, "/api/v1/dashboard/session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("status"), Some(&json!("destroyed")));
        assert_eq!(
            app.state.reconciler.state(),
            ReconcilerState::Uninitialized
        );

        let (status, _) = call(&app, Method::GET, "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, Method::DELETE, "/api/v1/dashboard/session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("subject"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn refresh_refetches() {
        let app = test_app(MockFetcher::default());
        app.state
            .reconciler
            .initialize(Subject::student("s-2").unwrap_or_else(|_| panic!("valid subject")))
            .await;
        assert_eq!(app.fetcher.calls(), 1);

        let (status, body) = call(&app, Method::POST, "/api/v1/dashboard/refresh", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.get("status"), Some(&json!("refreshing")));

        for _ in 0..100 {
            if app.fetcher.calls() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(app.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn status_reports_transport_and_policy() {
        let app = test_app(MockFetcher::default());
        let (status, body) = call(&app, Method::GET, "/api/v1/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("state"), Some(&json!("uninitialized")));
        assert_eq!(body.get("subject"), Some(&Value::Null));
        assert_eq!(
            body.get("patchEvents"),
            Some(&json!(["interview_scheduled", "stats_updated"]))
        );
        assert_eq!(
            body.get("transport").and_then(|t| t.get("opens")),
            Some(&json!(0))
        );
        assert_eq!(body.get("wsClients"), Some(&json!(0)));
    }
}
