//! Application use-cases.
//!
//! Each use-case takes the acting user explicitly (`None` when the caller
//! is not logged in) and reads "now" from the injected [`Clock`]. Checks run
//! in a fixed order so the first failing rule decides the message.
//!
//! [`Clock`]: crate::clock::Clock

mod accounts;
mod events;
mod notices;

pub use accounts::{AccountUseCases, Registration, Session};
pub use events::{EventFilter, EventUseCases};
pub use notices::{NoticeInput, NoticeUseCases};

use crate::repository::RepositoryError;
use noticeboard_core::User;

/// Use-case failures. The display text is the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum UseCaseError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(String),

    /// The request is valid but the current state refuses it.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Storage(String),
}

pub type UseCaseResult<T> = Result<T, UseCaseError>;

impl From<noticeboard_core::Error> for UseCaseError {
    fn from(err: noticeboard_core::Error) -> Self {
        match err {
            noticeboard_core::Error::InvalidArgument(message) => UseCaseError::InvalidArgument(message),
            other => UseCaseError::Conflict(other.to_string()),
        }
    }
}

impl From<RepositoryError> for UseCaseError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(entity) => UseCaseError::NotFound(format!("{entity} not found")),
            RepositoryError::Rejected(rule) => rule.into(),
            RepositoryError::Storage(e) => UseCaseError::Storage(e.to_string()),
        }
    }
}

/// The acting user, or `NotAuthenticated`.
fn require_user(user: Option<&User>) -> UseCaseResult<&User> {
    user.ok_or(UseCaseError::NotAuthenticated)
}

/// The acting user if it is an administrator.
fn require_admin<'a>(user: Option<&'a User>, denied: &'static str) -> UseCaseResult<&'a User> {
    let user = require_user(user)?;
    if !user.is_admin() {
        return Err(UseCaseError::Forbidden(denied));
    }
    Ok(user)
}
