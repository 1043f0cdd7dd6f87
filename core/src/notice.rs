//! Notices: admin-authored announcements with a priority.

use crate::user::UserId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notice priority, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticePriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A notice on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub content: String,
    pub priority: NoticePriority,
    pub created_by: UserId,
    pub created_at: NaiveDateTime,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Notice {
    pub fn new(
        title: String,
        content: String,
        priority: NoticePriority,
        created_by: UserId,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            priority,
            created_by,
            created_at: now,
            is_active: true,
        }
    }
}
