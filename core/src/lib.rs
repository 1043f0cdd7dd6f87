//! Notice Board Core - domain rules for the event and notice board.
//!
//! This library provides the pieces every backing store and every
//! use-case agrees on:
//! - Event, notice and user entities with their storage representation
//! - Event status model and the allowed transitions
//! - Attendance predicates (capacity, membership, upcoming-only)
//! - Field validation with first-failure-wins ordering
//! - Change detection and message bodies for push notifications
//!
//! # Constraints
//!
//! This library intentionally does NOT:
//! - Access the network or the file system
//! - Read the wall clock (callers pass `now`)
//! - Spawn tasks or block
//!
//! # Example: Attendance
//!
//! ```
//! use chrono::NaiveDate;
//! use noticeboard_core::{Event, EventDraft, Error};
//!
//! let now = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
//! let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap().and_hms_opt(10, 0, 0).unwrap();
//!
//! let mut event = Event::new(
//!     EventDraft {
//!         title: "Cars on Sunday".into(),
//!         description: "Monthly meet".into(),
//!         date,
//!         location: "Main street".into(),
//!         attendee_limit: Some(1),
//!     },
//!     "admin-1".into(),
//!     now,
//! );
//!
//! event.add_attendee("user-a").unwrap();
//! assert!(event.is_at_capacity());
//! assert_eq!(event.add_attendee("user-b"), Err(Error::AtCapacity));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod error;
pub mod event;
pub mod notice;
pub mod record;
pub mod user;
pub mod validation;

pub use change::{format_event_date, ChangeKind, NotificationContent};
pub use error::{Error, Result};
pub use event::{Event, EventDraft, EventId, EventStatus, COMPLETION_GRACE_HOURS};
pub use notice::{Notice, NoticePriority};
pub use user::{User, UserChange, UserId, UserRole};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
