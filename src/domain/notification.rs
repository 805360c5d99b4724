//! Toast-style notifications derived from push events.
//!
//! [`Notification::from_event`] is exhaustive over [`PushEvent`]: every
//! kind has its own wording, missing fields fall back to placeholder text,
//! and unknown event names still produce a generic notification.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::push_event::{NormalizedEvent, PushEvent};

const JOB_PLACEHOLDER: &str = "Công việc";
const COMPANY_PLACEHOLDER: &str = "Công ty";
const STATUS_PLACEHOLDER: &str = "mới";

/// UI category tag. Carries no reconciliation meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationColor {
    /// Main brand color.
    Primary,
    /// Secondary accent.
    Secondary,
    /// Positive outcome.
    Success,
    /// Neutral information.
    Info,
    /// Needs attention.
    Warning,
    /// Neutral grey.
    Default,
}

/// A normalized notification ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Time-based id with a random suffix, unique within a session.
    pub id: String,
    /// Event name the notification was built from.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
    /// UI category.
    pub color: NotificationColor,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Builds the notification for `event`.
    #[must_use]
    pub fn from_event(event: &NormalizedEvent) -> Self {
        let (title, message, color) = describe(&event.payload);
        Self {
            id: notification_id(event.timestamp),
            kind: event.name.clone(),
            title,
            message,
            color,
            timestamp: event.timestamp,
        }
    }
}

fn describe(payload: &PushEvent) -> (String, String, NotificationColor) {
    match payload {
        PushEvent::JobViewed(a) => {
            let job = or_placeholder(a.job_title.as_deref(), JOB_PLACEHOLDER);
            let message = match a.viewer_name.as_deref().or(a.company_name.as_deref()) {
                Some(viewer) => format!("{viewer} vừa xem \"{job}\""),
                None => format!("\"{job}\" vừa có lượt xem mới"),
            };
            ("Lượt xem mới".to_string(), message, NotificationColor::Info)
        }
        PushEvent::JobSaved(a) => {
            let job = or_placeholder(a.job_title.as_deref(), JOB_PLACEHOLDER);
            let company = or_placeholder(a.company_name.as_deref(), COMPANY_PLACEHOLDER);
            (
                "Đã lưu công việc".to_string(),
                format!("\"{job}\" tại {company} đã được lưu"),
                NotificationColor::Success,
            )
        }
        PushEvent::JobUnsaved(a) => {
            let job = or_placeholder(a.job_title.as_deref(), JOB_PLACEHOLDER);
            (
                "Đã bỏ lưu công việc".to_string(),
                format!("\"{job}\" đã bị xóa khỏi danh sách đã lưu"),
                NotificationColor::Default,
            )
        }
        PushEvent::ApplicationCreated(a) => {
            let job = or_placeholder(a.job_title.as_deref(), JOB_PLACEHOLDER);
            let message = match a.student_name.as_deref() {
                Some(student) => format!("{student} đã ứng tuyển vào \"{job}\""),
                None => {
                    let company = or_placeholder(a.company_name.as_deref(), COMPANY_PLACEHOLDER);
                    format!("Đơn ứng tuyển vào \"{job}\" tại {company} đã được gửi")
                }
            };
            ("Đơn ứng tuyển mới".to_string(), message, NotificationColor::Primary)
        }
        PushEvent::ApplicationUpdated(a) => {
            let job = or_placeholder(a.job_title.as_deref(), JOB_PLACEHOLDER);
            let status = or_placeholder(a.status.as_deref(), STATUS_PLACEHOLDER);
            (
                "Cập nhật đơn ứng tuyển".to_string(),
                format!("Đơn ứng tuyển \"{job}\" chuyển sang trạng thái {status}"),
                NotificationColor::Warning,
            )
        }
        PushEvent::ProfileUpdated(_) => (
            "Hồ sơ đã cập nhật".to_string(),
            "Thông tin hồ sơ đã được cập nhật".to_string(),
            NotificationColor::Info,
        ),
        PushEvent::InterviewScheduled(a) => {
            let job = or_placeholder(a.job_title.as_deref(), JOB_PLACEHOLDER);
            let message = match (a.scheduled_at.as_deref(), a.student_name.as_deref()) {
                (Some(at), _) => format!("Lịch phỏng vấn cho \"{job}\" vào {at}"),
                (None, Some(student)) => format!("Đã lên lịch phỏng vấn với {student} cho \"{job}\""),
                (None, None) => format!("Bạn có lịch phỏng vấn mới cho \"{job}\""),
            };
            ("Lịch phỏng vấn mới".to_string(), message, NotificationColor::Secondary)
        }
        PushEvent::StatsUpdated(_) => (
            "Thống kê đã cập nhật".to_string(),
            "Số liệu bảng điều khiển vừa được làm mới".to_string(),
            NotificationColor::Default,
        ),
        PushEvent::Other => (
            "Thông báo mới".to_string(),
            "Bạn có một thông báo mới".to_string(),
            NotificationColor::Default,
        ),
    }
}

fn or_placeholder<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(placeholder)
}

/// Millisecond timestamp plus nine random hex characters.
fn notification_id(at: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    let suffix: String = random.chars().take(9).collect();
    format!("{}-{suffix}", at.timestamp_millis())
}
