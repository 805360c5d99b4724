//! Push events received from the backend.
//!
//! Every frame on the push channel becomes a [`NormalizedEvent`]: the
//! received name, the raw payload, a timestamp, and a typed [`PushEvent`]
//! decoded per kind. Payload fields are all optional; a payload that does
//! not decode at all falls back to the empty variant for its kind instead
//! of being rejected.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::snapshot::{DashboardEntry, StatsPatch, parse_timestamp};
use super::{RecordId, Subject, SubjectKind};

/// The closed set of event kinds the reconciler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Someone viewed a job.
    JobViewed,
    /// A job was bookmarked.
    JobSaved,
    /// A bookmark was removed.
    JobUnsaved,
    /// An application was submitted.
    ApplicationCreated,
    /// An application changed status.
    ApplicationUpdated,
    /// Profile fields changed.
    ProfileUpdated,
    /// An interview was scheduled.
    InterviewScheduled,
    /// Server-side stats recompute.
    StatsUpdated,
}

impl EventKind {
    /// Every kind, in wire-name order.
    pub const ALL: [Self; 8] = [
        Self::JobViewed,
        Self::JobSaved,
        Self::JobUnsaved,
        Self::ApplicationCreated,
        Self::ApplicationUpdated,
        Self::ProfileUpdated,
        Self::InterviewScheduled,
        Self::StatsUpdated,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JobViewed => "job_viewed",
            Self::JobSaved => "job_saved",
            Self::JobUnsaved => "job_unsaved",
            Self::ApplicationCreated => "application_created",
            Self::ApplicationUpdated => "application_updated",
            Self::ProfileUpdated => "profile_updated",
            Self::InterviewScheduled => "interview_scheduled",
            Self::StatsUpdated => "stats_updated",
        }
    }

    /// Looks a kind up by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `job_viewed`, `job_saved` and `job_unsaved`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobActivity {
    /// Record id (saved-job or view row).
    pub id: Option<RecordId>,
    /// The job concerned.
    pub job_id: Option<RecordId>,
    /// Job title.
    pub job_title: Option<String>,
    /// Company posting the job.
    pub company_name: Option<String>,
    /// Company id.
    pub company_id: Option<RecordId>,
    /// Student id.
    pub student_id: Option<RecordId>,
    /// Student display name.
    pub student_name: Option<String>,
    /// Name of whoever viewed the job.
    pub viewer_name: Option<String>,
}

/// Payload of `application_created` and `application_updated`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationActivity {
    /// Application id.
    pub id: Option<RecordId>,
    /// Job applied to.
    pub job_id: Option<RecordId>,
    /// Job title.
    pub job_title: Option<String>,
    /// Company name.
    pub company_name: Option<String>,
    /// Company id.
    pub company_id: Option<RecordId>,
    /// Applicant id.
    pub student_id: Option<RecordId>,
    /// Applicant display name.
    pub student_name: Option<String>,
    /// Application status after the change.
    pub status: Option<String>,
}

/// Payload of `interview_scheduled`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterviewActivity {
    /// Interview id.
    pub id: Option<RecordId>,
    /// Job title.
    pub job_title: Option<String>,
    /// Company name.
    pub company_name: Option<String>,
    /// Company id.
    pub company_id: Option<RecordId>,
    /// Candidate id.
    pub student_id: Option<RecordId>,
    /// Candidate display name.
    pub student_name: Option<String>,
    /// When the interview takes place, as sent by the backend.
    pub scheduled_at: Option<String>,
    /// Where (or how) the interview takes place.
    pub location: Option<String>,
}

/// Payload of `profile_updated`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileChange {
    /// Student whose profile changed.
    pub student_id: Option<RecordId>,
    /// Company whose profile changed.
    pub company_id: Option<RecordId>,
    /// Changed fields, when wrapped in a `profile` object.
    pub profile: Option<Map<String, Value>>,
}

/// Typed view of a push payload, one variant per [`EventKind`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PushEvent {
    /// `job_viewed`
    JobViewed(JobActivity),
    /// `job_saved`
    JobSaved(JobActivity),
    /// `job_unsaved`
    JobUnsaved(JobActivity),
    /// `application_created`
    ApplicationCreated(ApplicationActivity),
    /// `application_updated`
    ApplicationUpdated(ApplicationActivity),
    /// `profile_updated`
    ProfileUpdated(ProfileChange),
    /// `interview_scheduled`
    InterviewScheduled(InterviewActivity),
    /// `stats_updated`
    StatsUpdated(StatsPatch),
    /// Any event name outside the known set.
    #[default]
    Other,
}

impl PushEvent {
    /// Decodes `data` according to `kind`.
    #[must_use]
    pub fn decode(kind: Option<EventKind>, data: &Value) -> Self {
        let Some(kind) = kind else {
            return Self::Other;
        };
        match kind {
            EventKind::JobViewed => Self::JobViewed(decode_payload(kind, data)),
            EventKind::JobSaved => Self::JobSaved(decode_payload(kind, data)),
            EventKind::JobUnsaved => Self::JobUnsaved(decode_payload(kind, data)),
            EventKind::ApplicationCreated => Self::ApplicationCreated(decode_payload(kind, data)),
            EventKind::ApplicationUpdated => Self::ApplicationUpdated(decode_payload(kind, data)),
            EventKind::ProfileUpdated => Self::ProfileUpdated(decode_payload(kind, data)),
            EventKind::InterviewScheduled => Self::InterviewScheduled(decode_payload(kind, data)),
            EventKind::StatsUpdated => Self::StatsUpdated(decode_payload(kind, data)),
        }
    }

    /// The kind of this event, `None` for [`PushEvent::Other`].
    #[must_use]
    pub const fn kind(&self) -> Option<EventKind> {
        match self {
            Self::JobViewed(_) => Some(EventKind::JobViewed),
            Self::JobSaved(_) => Some(EventKind::JobSaved),
            Self::JobUnsaved(_) => Some(EventKind::JobUnsaved),
            Self::ApplicationCreated(_) => Some(EventKind::ApplicationCreated),
            Self::ApplicationUpdated(_) => Some(EventKind::ApplicationUpdated),
            Self::ProfileUpdated(_) => Some(EventKind::ProfileUpdated),
            Self::InterviewScheduled(_) => Some(EventKind::InterviewScheduled),
            Self::StatsUpdated(_) => Some(EventKind::StatsUpdated),
            Self::Other => None,
        }
    }

    /// Whether the payload addresses `subject`.
    ///
    /// `Some(true)` / `Some(false)` when the payload carries the id field
    /// relevant to the subject's kind, `None` when it carries none.
    #[must_use]
    pub fn concerns(&self, subject: &Subject) -> Option<bool> {
        let (student, company) = match self {
            Self::JobViewed(a) | Self::JobSaved(a) | Self::JobUnsaved(a) => {
                (a.student_id.as_ref(), a.company_id.as_ref())
            }
            Self::ApplicationCreated(a) | Self::ApplicationUpdated(a) => {
                (a.student_id.as_ref(), a.company_id.as_ref())
            }
            Self::InterviewScheduled(a) => (a.student_id.as_ref(), a.company_id.as_ref()),
            Self::ProfileUpdated(p) => (p.student_id.as_ref(), p.company_id.as_ref()),
            Self::StatsUpdated(_) | Self::Other => (None, None),
        };
        let relevant = match subject.kind {
            SubjectKind::Student => student,
            SubjectKind::Company => company,
        };
        relevant.map(|id| id.as_str() == subject.id)
    }
}

fn decode_payload<T: DeserializeOwned + Default>(kind: EventKind, data: &Value) -> T {
    if data.is_null() {
        return T::default();
    }
    match T::deserialize(data) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(event = %kind, error = %err, "malformed push payload; using empty fields");
            T::default()
        }
    }
}

/// A received push event: name, raw payload, timestamp, typed view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    /// Event name as received.
    #[serde(rename = "type")]
    pub name: String,
    /// Raw payload.
    pub data: Value,
    /// Upstream timestamp, or receipt time when absent.
    pub timestamp: DateTime<Utc>,
    /// Typed payload.
    #[serde(skip)]
    pub payload: PushEvent,
}

impl NormalizedEvent {
    /// Normalizes a raw frame. Never fails: unknown names become
    /// [`PushEvent::Other`].
    #[must_use]
    pub fn parse(name: &str, data: Value) -> Self {
        let payload = PushEvent::decode(EventKind::from_name(name), &data);
        let timestamp = data
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        Self {
            name: name.to_string(),
            data,
            timestamp,
            payload,
        }
    }

    /// The kind of this event, `None` for unknown names.
    #[must_use]
    pub const fn kind(&self) -> Option<EventKind> {
        self.payload.kind()
    }

    /// Builds a collection entry from the raw payload, locating the id via
    /// `id_keys`. Returns `None` when the payload is not an object or has
    /// no usable id.
    #[must_use]
    pub fn entry(&self, id_keys: &[&str]) -> Option<DashboardEntry> {
        let map = self.data.as_object()?.clone();
        match DashboardEntry::from_object(map, id_keys) {
            Ok(entry) => Some(entry),
            Err(reason) => {
                tracing::debug!(event = %self.name, %reason, "push payload is not an entry");
                None
            }
        }
    }
}
