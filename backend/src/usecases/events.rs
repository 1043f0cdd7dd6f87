use super::{require_admin, require_user, UseCaseError, UseCaseResult};
use crate::clock::Clock;
use crate::reconcile::reconcile_events;
use crate::repository::EventRepository;
use noticeboard_core::validation::{validate_event, EventInput};
use noticeboard_core::{Event, EventStatus, User};
use std::sync::Arc;
use tracing::info;

const ADMIN_ONLY_CREATE: &str = "Only administrators can create events";
const ADMIN_ONLY_UPDATE: &str = "Only administrators can update events";
const ADMIN_ONLY_CANCEL: &str = "Only administrators can cancel events";
const ADMIN_ONLY_DELETE: &str = "Only administrators can delete events";

/// Optional list filters
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub created_by: Option<String>,
}

/// Event use-cases
#[derive(Clone)]
pub struct EventUseCases {
    repo: EventRepository,
    clock: Arc<dyn Clock>,
}

impl EventUseCases {
    pub fn new(repo: EventRepository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub fn repository(&self) -> &EventRepository {
        &self.repo
    }

    /// Reconciled event list, filtered.
    pub async fn list_events(&self, filter: &EventFilter) -> UseCaseResult<Vec<Event>> {
        let (mut events, _) = reconcile_events(&self.repo, self.clock.now()).await?;
        if let Some(status) = filter.status {
            events.retain(|e| e.status == status);
        }
        if let Some(creator) = &filter.created_by {
            events.retain(|e| &e.created_by == creator);
        }
        Ok(events)
    }

    pub async fn get_event(&self, event_id: &str) -> UseCaseResult<Event> {
        self.load(event_id).await
    }

    /// Join an event.
    ///
    /// The pre-checks give precise messages; the store repeats them
    /// atomically with the insert.
    pub async fn attend_event(&self, event_id: &str, user: Option<&User>) -> UseCaseResult<Event> {
        let user = require_user(user)?;
        let event = self.load(event_id).await?;
        event.check_attend(&user.id)?;

        let updated = self.repo.attend_event(event_id, &user.id).await?;
        info!(event_id = %event_id, attendees = updated.attendee_count(), "User joined event");
        Ok(updated)
    }

    /// Leave an event.
    pub async fn leave_event(&self, event_id: &str, user: Option<&User>) -> UseCaseResult<Event> {
        let user = require_user(user)?;
        let event = self.load(event_id).await?;
        event.check_leave(&user.id)?;

        let updated = self.repo.leave_event(event_id, &user.id).await?;
        info!(event_id = %event_id, attendees = updated.attendee_count(), "User left event");
        Ok(updated)
    }

    /// Validate, then authorize, then persist a new upcoming event.
    pub async fn create_event(&self, input: EventInput, user: Option<&User>) -> UseCaseResult<Event> {
        let now = self.clock.now();
        let draft = validate_event(input, now)?;
        let admin = require_admin(user, ADMIN_ONLY_CREATE)?;

        let event = self
            .repo
            .create_event(Event::new(draft, admin.id.clone(), now))
            .await?;
        info!(event_id = %event.id, "Created event");
        Ok(event)
    }

    /// Replace the editable fields of an upcoming event.
    ///
    /// The edit is applied by the store to the record as stored, so
    /// attendance changes made in the meantime are kept.
    pub async fn update_event(
        &self,
        event_id: &str,
        input: EventInput,
        user: Option<&User>,
    ) -> UseCaseResult<Event> {
        let draft = validate_event(input, self.clock.now())?;
        require_admin(user, ADMIN_ONLY_UPDATE)?;

        let event = self.repo.edit_event(event_id, draft).await?;
        info!(event_id = %event.id, "Updated event");
        Ok(event)
    }

    /// Cancel an upcoming event. Cancelling twice is a conflict.
    pub async fn cancel_event(&self, event_id: &str, user: Option<&User>) -> UseCaseResult<Event> {
        require_admin(user, ADMIN_ONLY_CANCEL)?;

        let event = self
            .repo
            .transition_event(event_id, EventStatus::Cancelled)
            .await?;
        info!(event_id = %event.id, "Cancelled event");
        Ok(event)
    }

    pub async fn delete_event(&self, event_id: &str, user: Option<&User>) -> UseCaseResult<()> {
        require_admin(user, ADMIN_ONLY_DELETE)?;
        self.load(event_id).await?;

        self.repo.delete_event(event_id).await?;
        info!(event_id = %event_id, "Deleted event");
        Ok(())
    }

    /// Whether the acting user is on the attendee list.
    pub async fn is_attending(&self, event_id: &str, user: Option<&User>) -> UseCaseResult<bool> {
        let user = require_user(user)?;
        Ok(self.repo.is_user_attending(event_id, &user.id).await)
    }

    async fn load(&self, event_id: &str) -> UseCaseResult<Event> {
        self.repo
            .get_event_by_id(event_id)
            .await
            .ok_or_else(|| UseCaseError::NotFound("Event not found".to_string()))
    }
}
