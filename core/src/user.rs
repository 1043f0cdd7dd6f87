//! User accounts and roles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User identifier (UUID v4 string).
pub type UserId = String;

/// Account role. Only administrators manage events and notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

/// A registered user.
///
/// `password` holds the encoded password hash produced by the backend,
/// never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub mobile_number: String,
    #[serde(default)]
    pub role: UserRole,
    /// Device push token, refreshed by the client.
    #[serde(default)]
    pub fcm_token: Option<String>,
    #[serde(default = "default_notifications")]
    pub notifications_enabled: bool,
}

fn default_notifications() -> bool {
    true
}

impl User {
    /// New account with a fresh id, the default role and notifications on.
    pub fn new(
        username: String,
        password_hash: String,
        name: String,
        surname: String,
        mobile_number: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            password: password_hash,
            name,
            surname,
            mobile_number,
            role: UserRole::User,
            fcm_token: None,
            notifications_enabled: true,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Has a push token and has not opted out.
    pub fn is_push_recipient(&self) -> bool {
        self.notifications_enabled && self.fcm_token.is_some()
    }
}

/// A single-field change to a stored user, applied by the store in place
/// so concurrent changes to other fields survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserChange {
    /// Replace the device push token; `None` clears it.
    PushToken(Option<String>),
    NotificationsEnabled(bool),
    Role(UserRole),
}

impl User {
    /// Apply one change.
    pub fn apply(&mut self, change: UserChange) {
        match change {
            UserChange::PushToken(token) => self.fcm_token = token,
            UserChange::NotificationsEnabled(enabled) => self.notifications_enabled = enabled,
            UserChange::Role(role) => self.role = role,
        }
    }
}
