//! Event entity, status lifecycle and attendance rules.
//!
//! # Lifecycle
//!
//! ```text
//!              ┌──────────▶ COMPLETED   (date + 24h has passed)
//!  UPCOMING ───┤
//!              └──────────▶ CANCELLED   (admin cancels)
//! ```
//!
//! COMPLETED and CANCELLED are terminal. Attendance can only change while an
//! event is UPCOMING, and never beyond its attendee limit.

use crate::error::{Error, Result};
use crate::user::UserId;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Event identifier (UUID v4 string).
pub type EventId = String;

/// Hours after the start time before an upcoming event counts as completed.
pub const COMPLETION_GRACE_HOURS: i64 = 24;

/// Event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Open for attendance.
    #[default]
    Upcoming,
    /// The event has taken place.
    Completed,
    /// Called off by an administrator.
    Cancelled,
}

impl EventStatus {
    /// Name used in storage and on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventStatus::Upcoming => "UPCOMING",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Upcoming)
    }

    /// Whether `self -> next` is allowed. Staying in place is always allowed.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        self == next
            || matches!(
                (self, next),
                (EventStatus::Upcoming, EventStatus::Completed)
                    | (EventStatus::Upcoming, EventStatus::Cancelled)
            )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editable fields of an event, as supplied on create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub location: String,
    pub attendee_limit: Option<u32>,
}

/// An event users can RSVP to.
///
/// Serialized field names match the storage format (`camelCase`).
/// Records written before attendance existed decode with an empty
/// attendee list, no limit and `UPCOMING` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub location: String,
    pub created_by: UserId,
    pub created_at: NaiveDateTime,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub status: EventStatus,
    /// User ids in RSVP order.
    #[serde(default)]
    pub attendees: Vec<UserId>,
    /// `None` means unlimited. Always serialized, as `null` when unset.
    #[serde(default)]
    pub attendee_limit: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl Event {
    /// Build a fresh upcoming event with a new id and no attendees.
    pub fn new(draft: EventDraft, created_by: UserId, now: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            description: draft.description,
            date: draft.date,
            location: draft.location,
            created_by,
            created_at: now,
            is_active: true,
            status: EventStatus::Upcoming,
            attendees: Vec::new(),
            attendee_limit: draft.attendee_limit,
        }
    }

    pub fn attendee_count(&self) -> usize {
        self.attendees.len()
    }

    /// Limit set and reached.
    pub fn is_at_capacity(&self) -> bool {
        self.attendee_limit
            .is_some_and(|limit| self.attendee_count() >= limit as usize)
    }

    pub fn is_attending(&self, user_id: &str) -> bool {
        self.attendees.iter().any(|id| id == user_id)
    }

    /// Upcoming, not full, and the user has not joined yet.
    pub fn can_user_attend(&self, user_id: &str) -> bool {
        self.status == EventStatus::Upcoming
            && !self.is_at_capacity()
            && !self.is_attending(user_id)
    }

    /// Check whether `user_id` may join, without mutating.
    ///
    /// Checks run in a fixed order: status, capacity, membership.
    pub fn check_attend(&self, user_id: &str) -> Result<()> {
        if self.status != EventStatus::Upcoming {
            return Err(Error::AttendNotUpcoming);
        }
        if self.is_at_capacity() {
            return Err(Error::AtCapacity);
        }
        if self.is_attending(user_id) {
            return Err(Error::AlreadyAttending);
        }
        Ok(())
    }

    /// Check whether `user_id` may leave, without mutating.
    pub fn check_leave(&self, user_id: &str) -> Result<()> {
        if self.status != EventStatus::Upcoming {
            return Err(Error::LeaveNotUpcoming);
        }
        if !self.is_attending(user_id) {
            return Err(Error::NotAttending);
        }
        Ok(())
    }

    /// Append `user_id` to the attendee list.
    ///
    /// On error the attendee list is left untouched.
    pub fn add_attendee(&mut self, user_id: &str) -> Result<()> {
        self.check_attend(user_id)?;
        self.attendees.push(user_id.to_string());
        Ok(())
    }

    /// Remove `user_id` from the attendee list, keeping the order of the rest.
    pub fn remove_attendee(&mut self, user_id: &str) -> Result<()> {
        self.check_leave(user_id)?;
        self.attendees.retain(|id| id != user_id);
        Ok(())
    }

    /// Move to `next` if the lifecycle allows it.
    pub fn transition_to(&mut self, next: EventStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move strictly forward to `next`. Staying in the current status is
    /// rejected, so a second cancel or completion fails.
    pub fn advance_to(&mut self, next: EventStatus) -> Result<()> {
        if self.status == next {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.transition_to(next)
    }

    /// Replace the editable fields. Attendees and status are preserved.
    pub fn apply_edit(&mut self, draft: EventDraft) -> Result<()> {
        if self.status != EventStatus::Upcoming {
            return Err(Error::EditNotUpcoming);
        }
        if let Some(limit) = draft.attendee_limit {
            if (limit as usize) < self.attendee_count() {
                return Err(Error::LimitBelowAttendance {
                    count: self.attendee_count(),
                });
            }
        }
        self.title = draft.title;
        self.description = draft.description;
        self.date = draft.date;
        self.location = draft.location;
        self.attendee_limit = draft.attendee_limit;
        Ok(())
    }

    /// Strictly more than the grace window has elapsed since the start.
    ///
    /// An event so far in the future that the window end is not
    /// representable is never past it.
    pub fn is_past_grace(&self, now: NaiveDateTime) -> bool {
        self.date
            .checked_add_signed(Duration::hours(COMPLETION_GRACE_HOURS))
            .is_some_and(|limit| now > limit)
    }

    /// Upcoming and past the grace window.
    pub fn should_complete(&self, now: NaiveDateTime) -> bool {
        self.status == EventStatus::Upcoming && self.is_past_grace(now)
    }
}
