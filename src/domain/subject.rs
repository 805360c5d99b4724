//! Dashboard subjects and record identifiers.
//!
//! A [`Subject`] is the student or company whose dashboard is being
//! reconciled. [`RecordId`] normalises backend ids, which arrive either as
//! JSON strings or as integers depending on the table they come from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SyncError;
use crate::realtime::RoomId;

/// Which kind of dashboard a subject owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// A student (job seeker) dashboard.
    Student,
    /// A company (recruiter) dashboard.
    Company,
}

impl SubjectKind {
    /// Returns the path segment used by the snapshot endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Company => "company",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "company" => Ok(Self::Company),
            other => Err(SyncError::InvalidSubject(format!(
                "unknown subject kind {other:?}"
            ))),
        }
    }
}

/// The student or company whose dashboard is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Student or company.
    pub kind: SubjectKind,
    /// Backend identifier of the subject.
    pub id: String,
}

impl Subject {
    /// Creates a subject, rejecting blank ids.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSubject`] if `id` is empty after trimming.
    pub fn new(kind: SubjectKind, id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(SyncError::InvalidSubject("subject id is empty".to_string()));
        }
        Ok(Self {
            kind,
            id: trimmed.to_string(),
        })
    }

    /// Shorthand for a student subject.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSubject`] if `id` is blank.
    pub fn student(id: impl Into<String>) -> Result<Self, SyncError> {
        Self::new(SubjectKind::Student, id)
    }

    /// Shorthand for a company subject.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSubject`] if `id` is blank.
    pub fn company(id: impl Into<String>) -> Result<Self, SyncError> {
        Self::new(SubjectKind::Company, id)
    }

    /// The push room this subject's events are broadcast to.
    #[must_use]
    pub fn room(&self) -> RoomId {
        match self.kind {
            SubjectKind::Student => RoomId::User(self.id.clone()),
            SubjectKind::Company => RoomId::Company(self.id.clone()),
        }
    }

    /// Relative path of the snapshot endpoint for this subject.
    #[must_use]
    pub fn snapshot_path(&self) -> String {
        format!("dashboard/{}/{}", self.kind, self.id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Backend record identifier, accepted as a JSON string or integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads an id out of a JSON value, accepting strings and integers.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("record id must be a string or integer"))
    }
}
