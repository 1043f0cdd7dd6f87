//! Error types for noticeboard-core.
//!
//! Every message is written for direct display to an end user.
//!
//! # Error Categories
//!
//! - **Validation**: `InvalidArgument`
//! - **Attendance**: `AttendNotUpcoming`, `LeaveNotUpcoming`, `AtCapacity`,
//!   `AlreadyAttending`, `NotAttending`
//! - **Lifecycle**: `EditNotUpcoming`, `InvalidTransition`, `LimitBelowAttendance`
//! - **Accounts**: `UsernameTaken`

use crate::event::EventStatus;

/// Result type alias for noticeboard-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain rule violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    // ==================== Validation ====================
    /// A required field is blank or out of range.
    ///
    /// Carries the field-specific message of the first failing check.
    #[error("{0}")]
    InvalidArgument(String),

    // ==================== Attendance ====================
    /// Joining is only possible while the event is upcoming.
    #[error("Cannot attend a non-upcoming event")]
    AttendNotUpcoming,

    /// Leaving is only possible while the event is upcoming.
    #[error("Cannot leave a non-upcoming event")]
    LeaveNotUpcoming,

    /// The attendee limit has been reached.
    #[error("Event is at capacity")]
    AtCapacity,

    /// The user is already on the attendee list.
    #[error("Already attending this event")]
    AlreadyAttending,

    /// The user is not on the attendee list.
    #[error("Not attending this event")]
    NotAttending,

    // ==================== Lifecycle ====================
    /// Completed and cancelled events are frozen.
    #[error("Cannot edit a non-upcoming event")]
    EditNotUpcoming,

    /// Status change not permitted by the lifecycle.
    #[error("Cannot change event status from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: EventStatus,
        /// Requested status.
        to: EventStatus,
    },

    /// A new attendee limit would already be exceeded.
    #[error("Attendee limit cannot be lower than the current attendee count ({count})")]
    LimitBelowAttendance {
        /// Current number of attendees.
        count: usize,
    },

    // ==================== Accounts ====================
    /// Usernames are unique (case-sensitive).
    #[error("Username already exists")]
    UsernameTaken,
}

impl Error {
    /// Convenience constructor for validation failures.
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Whether this error stems from input validation rather than state.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}
