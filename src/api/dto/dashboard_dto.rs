//! DTOs for dashboard session and status endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{DashboardSnapshot, DashboardStats, Subject};
use crate::realtime::ConnectionStatus;
use crate::service::ReconcilerMetrics;

/// Request body for `POST /api/v1/dashboard/session`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// `"student"` or `"company"` (case-insensitive).
    pub kind: String,
    /// Backend id of the subject.
    pub id: String,
}

/// A subject as rendered in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubjectDto {
    /// `"student"` or `"company"`.
    pub kind: String,
    /// Backend id.
    pub id: String,
}

impl From<&Subject> for SubjectDto {
    fn from(subject: &Subject) -> Self {
        Self {
            kind: subject.kind.as_str().to_string(),
            id: subject.id.clone(),
        }
    }
}

/// Response of `GET /api/v1/dashboard`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    /// Active subject.
    pub subject: SubjectDto,
    /// Reconciler state (`initializing` or `ready`).
    pub state: String,
    /// Whether push updates are currently flowing.
    pub realtime_connected: bool,
    /// Full dashboard snapshot.
    #[schema(value_type = Object)]
    pub snapshot: DashboardSnapshot,
}

/// Aggregate counters of a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsDto {
    /// Profile completion percentage (0–100).
    pub profile_completion: u32,
    /// Skills on the profile.
    pub total_skills: u32,
    /// Projects on the profile.
    pub total_projects: u32,
    /// Certifications on the profile.
    pub total_certifications: u32,
    /// Saved jobs.
    pub total_saved_jobs: u32,
    /// Applications.
    pub total_applications: u32,
    /// Interviews.
    pub total_interviews: u32,
    /// Viewed jobs.
    pub total_viewed_jobs: u32,
}

impl From<DashboardStats> for StatsDto {
    fn from(stats: DashboardStats) -> Self {
        Self {
            profile_completion: stats.profile_completion,
            total_skills: stats.total_skills,
            total_projects: stats.total_projects,
            total_certifications: stats.total_certifications,
            total_saved_jobs: stats.total_saved_jobs,
            total_applications: stats.total_applications,
            total_interviews: stats.total_interviews,
            total_viewed_jobs: stats.total_viewed_jobs,
        }
    }
}

/// Response of `GET /api/v1/dashboard/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Active subject.
    pub subject: SubjectDto,
    /// Current stats.
    pub stats: StatsDto,
}

/// Response of the session and refresh endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Subject the action applies to, if any.
    pub subject: Option<SubjectDto>,
    /// `initializing`, `refreshing`, or `destroyed`.
    pub status: String,
}

/// Transport part of the status response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatusDto {
    /// Link reports connected.
    pub connected: bool,
    /// A link is open (possibly still connecting).
    pub link_open: bool,
    /// Room join waiting for the next connect.
    pub pending_room: Option<String>,
    /// Last room joined.
    pub joined_room: Option<String>,
    /// Links opened so far.
    pub opens: u64,
    /// Links closed so far.
    pub closes: u64,
    /// Join requests sent.
    pub room_joins: u64,
    /// Emits dropped while disconnected.
    pub dropped_emits: u64,
}

impl From<ConnectionStatus> for TransportStatusDto {
    fn from(status: ConnectionStatus) -> Self {
        Self {
            connected: status.connected,
            link_open: status.link_open,
            pending_room: status.pending_room,
            joined_room: status.joined_room,
            opens: status.stats.opens,
            closes: status.stats.closes,
            room_joins: status.stats.room_joins,
            dropped_emits: status.stats.dropped_emits,
        }
    }
}

/// Response of `GET /api/v1/status`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// `uninitialized`, `initializing`, or `ready`.
    pub state: String,
    /// Active subject.
    pub subject: Option<SubjectDto>,
    /// Active subject and a connected transport.
    pub realtime_connected: bool,
    /// Event kinds that mutate the snapshot.
    pub patch_events: Vec<String>,
    /// Reconciler counters.
    #[schema(value_type = Object)]
    pub metrics: ReconcilerMetrics,
    /// Push transport view.
    pub transport: TransportStatusDto,
    /// Connected local WebSocket consumers.
    pub ws_clients: usize,
}
