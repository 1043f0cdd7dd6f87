//! Field validation for user input.
//!
//! Every validator is fail-fast: checks run in a fixed order and the first
//! failing check decides the message. Callers rely on that order, e.g. a
//! blank title is reported even when the date is also in the past.

use crate::error::{Error, Result};
use crate::event::EventDraft;
use chrono::NaiveDateTime;

/// Raw event fields as received from a client.
#[derive(Debug, Clone)]
pub struct EventInput {
    pub title: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub location: String,
    /// Signed so that zero and negative limits can be reported.
    pub attendee_limit: Option<i64>,
}

/// Validate event fields against `now` and produce a draft.
///
/// Order: title, description, location, date, attendee limit.
pub fn validate_event(input: EventInput, now: NaiveDateTime) -> Result<EventDraft> {
    require("Title", &input.title)?;
    require("Description", &input.description)?;
    require("Location", &input.location)?;
    if input.date < now {
        return Err(Error::invalid("Event date cannot be in the past"));
    }
    let attendee_limit = match input.attendee_limit {
        None => None,
        Some(limit) if limit <= 0 => {
            return Err(Error::invalid("Attendee limit must be greater than 0"))
        }
        Some(limit) => Some(
            u32::try_from(limit).map_err(|_| Error::invalid("Attendee limit is too large"))?,
        ),
    };

    Ok(EventDraft {
        title: input.title,
        description: input.description,
        date: input.date,
        location: input.location,
        attendee_limit,
    })
}

/// Validate notice fields. Order: title, content.
pub fn validate_notice(title: &str, content: &str) -> Result<()> {
    require("Title", title)?;
    require("Content", content)
}

/// Validate credentials. Order: username, password.
pub fn validate_credentials(username: &str, password: &str) -> Result<()> {
    require("Username", username)?;
    require("Password", password)
}

/// Validate a registration. Order: username, password, name, surname, mobile number.
pub fn validate_registration(
    username: &str,
    password: &str,
    name: &str,
    surname: &str,
    mobile_number: &str,
) -> Result<()> {
    validate_credentials(username, password)?;
    require("Name", name)?;
    require("Surname", surname)?;
    require("Mobile number", mobile_number)
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid(format!("{field} cannot be empty")));
    }
    Ok(())
}
