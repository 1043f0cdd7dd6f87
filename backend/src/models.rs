//! Request and response bodies for the HTTP API.
//!
//! Events and notices are returned in their storage shape (`camelCase`).
//! Users never leave the server with their password hash.

use crate::config::StorageMode;
use crate::usecases::{NoticeInput, Registration, Session};
use chrono::NaiveDateTime;
use noticeboard_core::validation::EventInput;
use noticeboard_core::{EventStatus, NoticePriority, User, UserRole};
use serde::{Deserialize, Serialize};

// === Accounts ===

/// Register request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub mobile_number: String,
}

impl From<RegisterRequest> for Registration {
    fn from(req: RegisterRequest) -> Self {
        Registration {
            username: req.username,
            password: req.password,
            name: req.name,
            surname: req.surname,
            mobile_number: req.mobile_number,
        }
    }
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Public view of a user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub mobile_number: String,
    pub role: UserRole,
    pub notifications_enabled: bool,
    pub has_push_token: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            has_push_token: user.fcm_token.is_some(),
            id: user.id,
            username: user.username,
            name: user.name,
            surname: user.surname,
            mobile_number: user.mobile_number,
            role: user.role,
            notifications_enabled: user.notifications_enabled,
        }
    }
}

/// Register / login response
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserResponse,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.token,
            user: session.user.into(),
        }
    }
}

/// Push token refresh. `null` clears the token.
#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub token: Option<String>,
}

/// Notification opt-in / opt-out
#[derive(Debug, Deserialize)]
pub struct NotificationsRequest {
    pub enabled: bool,
}

// === Events ===

/// Create / update event request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub title: String,
    pub description: String,
    /// Local date-time, e.g. `2026-10-18T10:00:00`
    pub date: NaiveDateTime,
    pub location: String,
    #[serde(default)]
    pub attendee_limit: Option<i64>,
}

impl From<EventRequest> for EventInput {
    fn from(req: EventRequest) -> Self {
        EventInput {
            title: req.title,
            description: req.description,
            date: req.date,
            location: req.location,
            attendee_limit: req.attendee_limit,
        }
    }
}

/// Event list query parameters
#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub status: Option<String>,
    pub created_by: Option<String>,
}

/// Parse a status filter, case-insensitively.
pub fn parse_status(value: &str) -> Option<EventStatus> {
    [
        EventStatus::Upcoming,
        EventStatus::Completed,
        EventStatus::Cancelled,
    ]
    .into_iter()
    .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
}

/// Attendance check response
#[derive(Debug, Serialize)]
pub struct AttendingResponse {
    pub attending: bool,
}

// === Notices ===

/// Create notice request
#[derive(Debug, Deserialize)]
pub struct NoticeRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub priority: NoticePriority,
}

impl From<NoticeRequest> for NoticeInput {
    fn from(req: NoticeRequest) -> Self {
        NoticeInput {
            title: req.title,
            content: req.content,
            priority: req.priority,
        }
    }
}

// === Settings ===

/// Storage switch, read and write
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettingsBody {
    pub storage_mode: StorageMode,
}

// === Misc ===

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}
