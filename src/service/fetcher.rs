//! REST snapshot client.
//!
//! The backend answers `GET {base}/dashboard/{kind}/{id}` with an envelope
//! `{ success, data, message }`. Only a `success: true` envelope carrying
//! `data` counts as a snapshot; everything else is an error the
//! reconciler degrades to the empty snapshot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use super::auth::CredentialSource;
use crate::domain::{DashboardSnapshot, Subject};
use crate::error::SyncError;

/// Loads the authoritative snapshot for a subject.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync + fmt::Debug {
    /// Fetches the snapshot of `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SnapshotFetch`] on network, status, or decode
    /// failures and [`SyncError::SnapshotRejected`] when the backend
    /// reports `success: false`.
    async fn fetch(&self, subject: &Subject) -> Result<DashboardSnapshot, SyncError>;
}

#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<DashboardSnapshot>,
    #[serde(default)]
    message: Option<String>,
}

/// [`SnapshotFetcher`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpSnapshotFetcher {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpSnapshotFetcher {
    /// Creates a fetcher rooted at `base_url` (e.g.
    /// `http://localhost:5000/api`).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `base_url` is not an absolute
    /// http(s) URL or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Config(format!("invalid API base URL {base_url:?}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "API base URL must use http or https, got {}",
                base_url.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Absolute URL of `subject`'s snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the base URL cannot carry a path.
    pub fn snapshot_url(&self, subject: &Subject) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::Config("API base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["dashboard", subject.kind.as_str(), subject.id.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self, subject: &Subject) -> Result<DashboardSnapshot, SyncError> {
        let url = self.snapshot_url(subject)?;
        let mut request = self.client.get(url);
        if let Some(token) = self.credentials.token() {
            request = request.bearer_auth(token);
        }

        tracing::debug!(path = %subject.snapshot_path(), "requesting snapshot");
        let envelope: SnapshotEnvelope = request.send().await?.error_for_status()?.json().await?;

        match envelope {
            SnapshotEnvelope {
                success: true,
                data: Some(snapshot),
                ..
            } => Ok(snapshot),
            SnapshotEnvelope { message, .. } => Err(SyncError::SnapshotRejected(
                message.unwrap_or_else(|| "backend returned no snapshot".to_string()),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::service::auth::SessionCredential;
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use serde_json::{Value, json};

    async fn serve(router: Router) -> String {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/api")
    }

    fn fetcher(base: &str, token: Option<&str>) -> HttpSnapshotFetcher {
        let credentials = Arc::new(SessionCredential::new(token.map(str::to_string)));
        let Ok(fetcher) = HttpSnapshotFetcher::new(base, Duration::from_secs(5), credentials) else {
            panic!("valid fetcher");
        };
        fetcher
    }

    fn student(id: &str) -> Subject {
        let Ok(subject) = Subject::student(id) else {
            panic!("valid subject");
        };
        subject
    }

    #[test]
    fn builds_snapshot_url_under_base_path() {
        let f = fetcher("http://localhost:5000/api/", None);
        let Ok(url) = f.snapshot_url(&student("s 1")) else {
            panic!("url");
        };
        assert_eq!(url.as_str(), "http://localhost:5000/api/dashboard/student/s%201");
    }

    #[test]
    fn rejects_non_http_base() {
        let credentials = Arc::new(SessionCredential::default());
        assert!(
            HttpSnapshotFetcher::new("ws://localhost", Duration::from_secs(1), credentials)
                .is_err()
        );
    }

    #[tokio::test]
    async fn decodes_successful_envelope_with_bearer_token() {
        let router = Router::new().route(
            "/api/dashboard/student/{id}",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "success": true,
                    "data": {
                        "profile": {"fullName": auth},
                        "applications": [],
                        "interviews": [{"id": 3, "jobTitle": "QA"}],
                        "stats": {"profileCompletion": 40, "totalSkills": 3}
                    }
                }))
            }),
        );
        let base = serve(router).await;
        let Ok(snapshot) = fetcher(&base, Some("tok")).fetch(&student("1")).await else {
            panic!("fetch must succeed");
        };
        assert_eq!(snapshot.profile.get("fullName"), Some(&json!("Bearer tok")));
        assert_eq!(snapshot.interviews.len(), 1);
        assert_eq!(snapshot.stats.profile_completion, 40);
        assert_eq!(snapshot.stats.total_skills, 3);
        assert!(snapshot.saved_jobs.is_empty());
    }

    #[tokio::test]
    async fn one_bad_row_does_not_discard_the_snapshot() {
        let router = Router::new().route(
            "/api/dashboard/student/{id}",
            get(|| async {
                Json(json!({
                    "success": true,
                    "data": {
                        "applications": [{"id": 1}, {"id": 2}],
                        "viewedJobs": [{"jobId": 9}],
                        "stats": {"totalSkills": null, "profileCompletion": 50}
                    }
                }))
            }),
        );
        let base = serve(router).await;
        let Ok(snapshot) = fetcher(&base, None).fetch(&student("1")).await else {
            panic!("fetch must succeed");
        };
        assert_eq!(snapshot.applications.len(), 2);
        assert!(snapshot.viewed_jobs.is_empty());
        assert_eq!(snapshot.stats.total_skills, 0);
        assert_eq!(snapshot.stats.profile_completion, 50);
    }

    #[tokio::test]
    async fn success_false_is_rejected() {
        let router = Router::new().route(
            "/api/dashboard/student/{id}",
            get(|| async { Json(json!({"success": false, "message": "not found"})) }),
        );
        let base = serve(router).await;
        let result = fetcher(&base, None).fetch(&student("1")).await;
        let Err(SyncError::SnapshotRejected(message)) = result else {
            panic!("expected rejection");
        };
        assert_eq!(message, "not found");
    }

    #[tokio::test]
    async fn http_error_status_is_a_fetch_error() {
        let router = Router::new().route(
            "/api/dashboard/student/{id}",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null)) }),
        );
        let base = serve(router).await;
        let result = fetcher(&base, None).fetch(&student("1")).await;
        assert!(matches!(result, Err(SyncError::SnapshotFetch(_))));
    }
}
