//! Backing stores for events, users and notices.
//!
//! Two implementations share one contract:
//!
//! - [`LocalStore`]: JSON files on local disk, one file per key, with
//!   snapshots re-published after every local mutation.
//! - [`DocumentStore`]: in-memory document collections with a change feed
//!   that drives push notifications.
//!
//! Every partial mutation is a single atomic operation at this boundary:
//! attendance (add-if-absent-and-under-capacity, remove-if-present), field
//! edits, status transitions, account registration and single-field user
//! changes. Callers never read, modify and write back a record themselves,
//! so concurrent writers cannot erase each other's changes.

pub mod document;
pub mod local;

pub use document::DocumentStore;
pub use local::LocalStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use noticeboard_core::{Event, EventDraft, EventId, EventStatus, Notice, User, UserChange, UserId};

/// Maximum number of values in a single `IN` lookup.
pub const IN_QUERY_LIMIT: usize = 10;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StorageError>;

/// Live sequence of full snapshots. The current snapshot is yielded first.
pub type SnapshotStream<T> = BoxStream<'static, Vec<T>>;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event. No duplicate-id check.
    async fn create_event(&self, event: Event) -> StoreResult<Event>;

    /// Point lookup; `None` when absent.
    async fn get_event(&self, id: &str) -> StoreResult<Option<Event>>;

    /// All events ordered by start date.
    async fn list_events(&self) -> StoreResult<Vec<Event>>;

    /// Full-record replace, last writer wins.
    ///
    /// Rejects a status change the lifecycle does not allow.
    async fn update_event(&self, event: Event) -> StoreResult<Event>;

    /// Remove an event. Removing an absent id succeeds.
    async fn delete_event(&self, id: &str) -> StoreResult<()>;

    /// Atomically add `user_id` if the event is upcoming, not full and
    /// the user is not yet attending.
    async fn attend_event(&self, event_id: &str, user_id: &str) -> StoreResult<Event>;

    /// Atomically remove `user_id` if the event is upcoming and the user attends.
    async fn leave_event(&self, event_id: &str, user_id: &str) -> StoreResult<Event>;

    /// Atomically replace the editable fields of an upcoming event.
    /// Attendees and status are those stored at the time of the write.
    async fn edit_event(&self, event_id: &str, draft: EventDraft) -> StoreResult<Event>;

    /// Atomically move the event strictly forward to `next`.
    async fn transition_event(&self, event_id: &str, next: EventStatus) -> StoreResult<Event>;

    /// Live event list.
    fn observe_events(&self) -> SnapshotStream<Event>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or replace a user record.
    async fn save_user(&self, user: User) -> StoreResult<User>;

    /// Insert a new account unless its username is taken. The first account
    /// in an empty store becomes an administrator. Check and insert are one
    /// atomic step.
    async fn register_user(&self, user: User) -> StoreResult<User>;

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;

    /// Case-sensitive username lookup.
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Replace an existing user; fails when absent.
    async fn update_user(&self, user: User) -> StoreResult<User>;

    /// Apply one field change to the stored user in place.
    async fn change_user(&self, id: &str, change: UserChange) -> StoreResult<User>;

    async fn delete_user(&self, id: &str) -> StoreResult<()>;

    /// Users with a push token and notifications enabled.
    async fn push_recipients(&self) -> StoreResult<Vec<User>>;

    /// Push recipients among `ids`. At most [`IN_QUERY_LIMIT`] ids per call.
    async fn push_recipients_in(&self, ids: &[UserId]) -> StoreResult<Vec<User>>;

    /// Null out every listed token on its owner in one batch.
    /// Returns the number of users updated.
    async fn clear_push_tokens(&self, tokens: &[String]) -> StoreResult<usize>;
}

#[async_trait]
pub trait NoticeStore: Send + Sync {
    async fn create_notice(&self, notice: Notice) -> StoreResult<Notice>;

    async fn get_notice(&self, id: &str) -> StoreResult<Option<Notice>>;

    /// All notices, newest first.
    async fn list_notices(&self) -> StoreResult<Vec<Notice>>;

    async fn update_notice(&self, notice: Notice) -> StoreResult<Notice>;

    async fn delete_notice(&self, id: &str) -> StoreResult<()>;

    /// Live notice list.
    fn observe_notices(&self) -> SnapshotStream<Notice>;
}

/// A write to the event collection, as seen by change-feed subscribers.
#[derive(Debug, Clone)]
pub enum DocumentChange {
    Created(Event),
    Updated { before: Event, after: Event },
    Deleted(EventId),
}

/// What a store does when persisted data cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptDataPolicy {
    /// Log a warning and treat the key as holding no records.
    #[default]
    ReturnEmpty,
    /// Refuse to open the store.
    Fail,
}

impl CorruptDataPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "empty" | "return_empty" => Some(CorruptDataPolicy::ReturnEmpty),
            "fail" => Some(CorruptDataPolicy::Fail),
            _ => None,
        }
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// A domain rule refused the mutation.
    #[error(transparent)]
    Rejected(#[from] noticeboard_core::Error),

    #[error("query exceeds the IN limit of {limit} values (got {got})")]
    QueryLimit { limit: usize, got: usize },

    #[error("malformed data under key '{key}': {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn event_not_found() -> Self {
        StorageError::NotFound { entity: "Event" }
    }

    pub(crate) fn user_not_found() -> Self {
        StorageError::NotFound { entity: "User" }
    }

    pub(crate) fn notice_not_found() -> Self {
        StorageError::NotFound { entity: "Notice" }
    }
}

/// Order events for listing: by start date, then id for stability.
pub(crate) fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
}

/// Order notices for listing: newest first.
pub(crate) fn sort_notices(notices: &mut [Notice]) {
    notices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Shared update check: the stored status may only move forward.
pub(crate) fn check_replace(existing: &Event, replacement: &Event) -> StoreResult<()> {
    if !existing.status.can_transition_to(replacement.status) {
        return Err(noticeboard_core::Error::InvalidTransition {
            from: existing.status,
            to: replacement.status,
        }
        .into());
    }
    Ok(())
}
