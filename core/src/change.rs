//! Change detection and push message content for event writes.
//!
//! Only four fields count as a significant change: title, date, location
//! and description. Attendance or status updates never notify anyone.

use crate::event::Event;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

/// `type` value for a newly created event.
pub const TYPE_NEW_EVENT: &str = "new_event";

/// `type` value for an edited event.
pub const TYPE_EVENT_UPDATED: &str = "event_updated";

/// Which significant field changed, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Title,
    Date,
    Location,
    Description,
    /// Fallback wording when the changed field is not singled out.
    General,
}

impl ChangeKind {
    /// Detect the highest-precedence significant change.
    ///
    /// Returns `None` when none of title, date, location or description differ.
    pub fn detect(before: &Event, after: &Event) -> Option<Self> {
        if before.title != after.title {
            Some(ChangeKind::Title)
        } else if before.date != after.date {
            Some(ChangeKind::Date)
        } else if before.location != after.location {
            Some(ChangeKind::Location)
        } else if before.description != after.description {
            Some(ChangeKind::Description)
        } else {
            None
        }
    }

    /// Human-readable tail appended to the event title.
    pub const fn summary(self) -> &'static str {
        match self {
            ChangeKind::Title => "title has been updated",
            ChangeKind::Date => "date has been changed",
            ChangeKind::Location => "location has been changed",
            ChangeKind::Description => "details have been updated",
            ChangeKind::General => "has been updated",
        }
    }
}

/// Data-only push payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub event_id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub body: String,
}

impl NotificationContent {
    /// Announcement for a new event: `"<title> - <date>"`.
    pub fn new_event(event: &Event) -> Self {
        Self {
            event_id: event.id.clone(),
            kind: TYPE_NEW_EVENT,
            title: "New Event Available!".to_string(),
            body: format!("{} - {}", event.title, format_event_date(event.date)),
        }
    }

    /// Update notice for attendees: `"<title> <summary>"`.
    pub fn event_updated(event: &Event, change: ChangeKind) -> Self {
        Self {
            event_id: event.id.clone(),
            kind: TYPE_EVENT_UPDATED,
            title: "Event Updated".to_string(),
            body: format!("{} {}", event.title, change.summary()),
        }
    }

    /// Flatten into string key/value pairs for the push transport.
    pub fn to_data(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("eventId".to_string(), self.event_id.clone()),
            ("type".to_string(), self.kind.to_string()),
            ("title".to_string(), self.title.clone()),
            ("body".to_string(), self.body.clone()),
        ])
    }
}

/// Format an event date for display, e.g. `Sat, Oct 17, 2026, 02:30 PM`.
pub fn format_event_date(date: NaiveDateTime) -> String {
    date.format("%a, %b %-d, %Y, %I:%M %p").to_string()
}
