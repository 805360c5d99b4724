//! The reconciled dashboard state for one subject.
//!
//! [`DashboardSnapshot`] mirrors the body of the backend's
//! `GET /dashboard/{type}/{id}` response. Collection entries keep every
//! field the backend sent; only `id`, a display title, a counterpart name
//! and a recency timestamp are lifted into typed fields.
//!
//! # Stats recompute rule
//!
//! Collection counts (`totalSavedJobs`, `totalApplications`,
//! `totalInterviews`, `totalViewedJobs`) always equal the collection
//! lengths after [`DashboardSnapshot::recount`]. Profile-derived fields are
//! trusted from the server and re-derived locally only when the profile
//! itself is patched, see [`DashboardSnapshot::rederive_profile_stats`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::RecordId;

/// Profile fields that count toward `profileCompletion`, 10 points each.
pub const PROFILE_COMPLETION_FIELDS: [&str; 10] = [
    "fullName",
    "email",
    "phone",
    "address",
    "dateOfBirth",
    "summary",
    "education",
    "experience",
    "skills",
    "projects",
];

const TITLE_KEYS: [&str; 3] = ["title", "jobTitle", "name"];
const COUNTERPART_KEYS: [&str; 4] = ["counterpart", "companyName", "studentName", "candidateName"];
const TIMESTAMP_KEYS: [&str; 7] = [
    "timestamp",
    "createdAt",
    "appliedAt",
    "savedAt",
    "viewedAt",
    "scheduledAt",
    "updatedAt",
];
const RESERVED_KEYS: [&str; 4] = ["id", "title", "counterpart", "timestamp"];

/// One row of a dashboard collection (saved job, application, interview,
/// viewed job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", rename_all = "camelCase")]
pub struct DashboardEntry {
    /// Record identifier, unique within its collection.
    pub id: RecordId,
    /// Display title, usually the job title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Counterpart name: the company for students, the candidate for
    /// companies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<String>,
    /// Recency timestamp used for ordering and "time ago" rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Every other field the backend sent, untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DashboardEntry {
    /// Builds an entry from a JSON object, using `id_keys` in order to
    /// locate the identifier.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if none of `id_keys` holds a
    /// string or integer id.
    pub fn from_object(mut map: Map<String, Value>, id_keys: &[&str]) -> Result<Self, String> {
        let id = id_keys
            .iter()
            .find_map(|key| map.get(*key).and_then(RecordId::from_json))
            .ok_or_else(|| format!("entry has no usable id (looked for {id_keys:?})"))?;

        let title = first_text(&map, &TITLE_KEYS).or_else(|| nested_text(&map, "job", "title"));
        let counterpart = first_text(&map, &COUNTERPART_KEYS)
            .or_else(|| nested_text(&map, "company", "name"))
            .or_else(|| nested_text(&map, "student", "fullName"));
        let timestamp = TIMESTAMP_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(parse_timestamp));

        for key in RESERVED_KEYS {
            map.remove(key);
        }

        Ok(Self {
            id,
            title,
            counterpart,
            timestamp,
            fields: map,
        })
    }

    /// Overlays `other` onto this entry: typed fields are replaced when
    /// present, raw fields are merged key by key.
    pub fn merge_from(&mut self, other: Self) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.counterpart.is_some() {
            self.counterpart = other.counterpart;
        }
        if other.timestamp.is_some() {
            self.timestamp = other.timestamp;
        }
        self.fields.extend(other.fields);
    }

    /// Returns `true` if this entry is `id`, either by its own id or by the
    /// `jobId` it refers to.
    #[must_use]
    pub fn refers_to(&self, id: &RecordId) -> bool {
        &self.id == id
            || self
                .fields
                .get("jobId")
                .and_then(RecordId::from_json)
                .is_some_and(|job_id| &job_id == id)
    }
}

impl TryFrom<Map<String, Value>> for DashboardEntry {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_object(map, &["id"])
    }
}

/// Derived aggregates shown on the dashboard header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    /// Profile completion percentage, 0–100.
    #[serde(deserialize_with = "lenient_count")]
    pub profile_completion: u32,
    /// Number of skills on the profile.
    #[serde(deserialize_with = "lenient_count")]
    pub total_skills: u32,
    /// Number of projects on the profile.
    #[serde(deserialize_with = "lenient_count")]
    pub total_projects: u32,
    /// Number of certifications on the profile.
    #[serde(deserialize_with = "lenient_count")]
    pub total_certifications: u32,
    /// Length of `savedJobs`.
    #[serde(deserialize_with = "lenient_count")]
    pub total_saved_jobs: u32,
    /// Length of `applications`.
    #[serde(deserialize_with = "lenient_count")]
    pub total_applications: u32,
    /// Length of `interviews`.
    #[serde(deserialize_with = "lenient_count")]
    pub total_interviews: u32,
    /// Length of `viewedJobs`.
    #[serde(deserialize_with = "lenient_count")]
    pub total_viewed_jobs: u32,
}

impl DashboardStats {
    /// Shallow-merges the fields present in `patch`.
    pub fn merge(&mut self, patch: &StatsPatch) {
        let fields = [
            (&mut self.profile_completion, patch.profile_completion),
            (&mut self.total_skills, patch.total_skills),
            (&mut self.total_projects, patch.total_projects),
            (&mut self.total_certifications, patch.total_certifications),
            (&mut self.total_saved_jobs, patch.total_saved_jobs),
            (&mut self.total_applications, patch.total_applications),
            (&mut self.total_interviews, patch.total_interviews),
            (&mut self.total_viewed_jobs, patch.total_viewed_jobs),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
        self.profile_completion = self.profile_completion.min(100);
    }
}

/// Partial stats pushed by the server in a `stats_updated` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsPatch {
    /// New profile completion, if provided.
    pub profile_completion: Option<u32>,
    /// New skill count, if provided.
    pub total_skills: Option<u32>,
    /// New project count, if provided.
    pub total_projects: Option<u32>,
    /// New certification count, if provided.
    pub total_certifications: Option<u32>,
    /// New saved-job count, if provided.
    pub total_saved_jobs: Option<u32>,
    /// New application count, if provided.
    pub total_applications: Option<u32>,
    /// New interview count, if provided.
    pub total_interviews: Option<u32>,
    /// New viewed-job count, if provided.
    pub total_viewed_jobs: Option<u32>,
}

/// The four entry collections of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// `savedJobs`
    SavedJobs,
    /// `applications`
    Applications,
    /// `interviews`
    Interviews,
    /// `viewedJobs`
    ViewedJobs,
}

/// Result of an upsert into a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The entry was new and has been prepended.
    Inserted,
    /// An entry with the same id was replaced in place.
    Replaced,
}

/// Full dashboard state for one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Opaque profile record of the subject.
    #[serde(default)]
    pub profile: Value,
    /// Jobs the subject bookmarked.
    #[serde(default, deserialize_with = "lenient_entries")]
    pub saved_jobs: Vec<DashboardEntry>,
    /// Applications sent (student) or received (company).
    #[serde(default, deserialize_with = "lenient_entries")]
    pub applications: Vec<DashboardEntry>,
    /// Scheduled interviews.
    #[serde(default, deserialize_with = "lenient_entries")]
    pub interviews: Vec<DashboardEntry>,
    /// Recently viewed jobs.
    #[serde(default, deserialize_with = "lenient_entries")]
    pub viewed_jobs: Vec<DashboardEntry>,
    /// Derived aggregates.
    #[serde(default, deserialize_with = "null_as_default")]
    pub stats: DashboardStats,
}

impl DashboardSnapshot {
    /// The well-formed empty dashboard: no entries, all stats zero.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the entries of `collection`.
    #[must_use]
    pub fn collection(&self, collection: Collection) -> &[DashboardEntry] {
        match collection {
            Collection::SavedJobs => &self.saved_jobs,
            Collection::Applications => &self.applications,
            Collection::Interviews => &self.interviews,
            Collection::ViewedJobs => &self.viewed_jobs,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<DashboardEntry> {
        match collection {
            Collection::SavedJobs => &mut self.saved_jobs,
            Collection::Applications => &mut self.applications,
            Collection::Interviews => &mut self.interviews,
            Collection::ViewedJobs => &mut self.viewed_jobs,
        }
    }

    /// Replaces the entry with the same id, or prepends it.
    pub fn upsert(&mut self, collection: Collection, entry: DashboardEntry) -> Upsert {
        let entries = self.collection_mut(collection);
        if let Some(slot) = entries.iter_mut().find(|e| e.id == entry.id) {
            *slot = entry;
            Upsert::Replaced
        } else {
            entries.insert(0, entry);
            Upsert::Inserted
        }
    }

    /// Merges `entry` into the entry with the same id, or prepends it.
    pub fn merge_entry(&mut self, collection: Collection, entry: DashboardEntry) -> Upsert {
        let entries = self.collection_mut(collection);
        if let Some(slot) = entries.iter_mut().find(|e| e.id == entry.id) {
            slot.merge_from(entry);
            Upsert::Replaced
        } else {
            entries.insert(0, entry);
            Upsert::Inserted
        }
    }

    /// Removes every entry that refers to `id`. Returns `true` if any was
    /// removed.
    pub fn remove(&mut self, collection: Collection, id: &RecordId) -> bool {
        let entries = self.collection_mut(collection);
        let before = entries.len();
        entries.retain(|e| !e.refers_to(id));
        entries.len() != before
    }

    /// Shallow-merges `fields` into the profile object.
    pub fn merge_profile(&mut self, fields: &Map<String, Value>) {
        if !self.profile.is_object() {
            self.profile = Value::Object(Map::new());
        }
        if let Value::Object(profile) = &mut self.profile {
            for (key, value) in fields {
                profile.insert(key.clone(), value.clone());
            }
        }
    }

    /// Sets the collection counts from the collection lengths.
    pub fn recount(&mut self) {
        self.stats.total_saved_jobs = count(&self.saved_jobs);
        self.stats.total_applications = count(&self.applications);
        self.stats.total_interviews = count(&self.interviews);
        self.stats.total_viewed_jobs = count(&self.viewed_jobs);
        self.stats.profile_completion = self.stats.profile_completion.min(100);
    }

    /// Re-derives the profile-based stats from `profile`.
    ///
    /// Leaves the stats untouched when the profile is not an object, so a
    /// snapshot whose profile was never loaded keeps the server's values.
    pub fn rederive_profile_stats(&mut self) {
        let Some(profile) = self.profile.as_object() else {
            return;
        };
        self.stats.profile_completion = profile_completion(profile);
        self.stats.total_skills = array_len(profile, "skills");
        self.stats.total_projects = array_len(profile, "projects");
        self.stats.total_certifications = array_len(profile, "certifications");
    }
}

/// Percentage of [`PROFILE_COMPLETION_FIELDS`] that are filled in.
#[must_use]
pub fn profile_completion(profile: &Map<String, Value>) -> u32 {
    let filled = PROFILE_COMPLETION_FIELDS
        .iter()
        .filter(|key| profile.get(**key).is_some_and(is_filled))
        .count();
    let total = PROFILE_COMPLETION_FIELDS.len();
    u32::try_from(filled.saturating_mul(100) / total).unwrap_or(100)
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn array_len(profile: &Map<String, Value>, key: &str) -> u32 {
    profile
        .get(key)
        .and_then(Value::as_array)
        .map_or(0, |items| count(items))
}

fn count<T>(items: &[T]) -> u32 {
    u32::try_from(items.len()).unwrap_or(u32::MAX)
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        map.get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

fn nested_text(map: &Map<String, Value>, outer: &str, inner: &str) -> Option<String> {
    map.get(outer)
        .and_then(Value::as_object)
        .and_then(|obj| first_text(obj, &[inner]))
}

/// Parses an RFC 3339 string or a millisecond epoch number.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Decodes a collection row by row. Rows that do not decode are logged
/// and dropped; a missing, `null` or non-array collection is empty.
fn lenient_entries<'de, D>(deserializer: D) -> Result<Vec<DashboardEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(rows)) => rows,
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(other) => {
            tracing::warn!(found = %other, "collection is not an array; treated as empty");
            return Ok(Vec::new());
        }
    };
    Ok(rows
        .into_iter()
        .filter_map(|row| match DashboardEntry::deserialize(&row) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, %row, "dashboard row dropped");
                None
            }
        })
        .collect())
}

/// Decodes a counter, falling back to zero for `null`, negative,
/// fractional or non-numeric values.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    if value.is_null() {
        return Ok(0);
    }
    match value.as_u64() {
        Some(n) => Ok(u32::try_from(n).unwrap_or(u32::MAX)),
        None => {
            tracing::warn!(found = %value, "stat is not a count; using 0");
            Ok(0)
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
