//! Push notifications driven by the document store's change feed.
//!
//! - A created event is announced to every user with a push token and
//!   notifications enabled.
//! - An edit to title, date, location or description is announced to the
//!   event's attendees. Attendance and status changes are silent.
//!
//! After every multicast the tokens the push service rejected are cleared
//! from their owners. Nothing here fails the write that triggered it:
//! errors are logged. Each change is handled on its own task, so one slow
//! send never holds back the changes behind it.

use crate::push::{PushError, PushSender, MULTICAST_LIMIT};
use crate::store::{DocumentChange, DocumentStore, StorageError, UserStore, IN_QUERY_LIMIT};
use noticeboard_core::{ChangeKind, Event, NotificationContent, User};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Dispatch failures (logged, never surfaced to clients)
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("recipient lookup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("push send failed: {0}")]
    Push(#[from] PushError),
}

/// Summary of one handled change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Tokens a multicast was attempted for
    pub sent: usize,
    /// Tokens cleared after being rejected
    pub cleared: usize,
}

pub struct NotificationDispatcher {
    store: Arc<DocumentStore>,
    sender: Arc<dyn PushSender>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<DocumentStore>, sender: Arc<dyn PushSender>) -> Self {
        Self { store, sender }
    }

    /// Subscribe to the change feed and handle changes until it closes.
    ///
    /// The subscription is taken before this returns, so writes made after
    /// `start` are never missed.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut changes = self.store.subscribe_changes();
        tokio::spawn(async move {
            info!("Started notification dispatcher");
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let this = Arc::clone(&self);
                        tokio::spawn(async move {
                            this.handle_change(change).await;
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification dispatcher fell behind the change feed");
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed, stopping notification dispatcher");
                        break;
                    }
                }
            }
        })
    }

    /// Handle one change, logging any failure.
    pub async fn handle_change(&self, change: DocumentChange) -> DispatchReport {
        let result = match &change {
            DocumentChange::Created(event) => self.on_event_created(event).await,
            DocumentChange::Updated { before, after } => self.on_event_updated(before, after).await,
            DocumentChange::Deleted(_) => Ok(DispatchReport::default()),
        };

        match result {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Failed to dispatch event notification");
                DispatchReport::default()
            }
        }
    }

    /// Announce a new event to all push recipients.
    pub async fn on_event_created(&self, event: &Event) -> Result<DispatchReport, DispatchError> {
        let recipients = self.store.push_recipients().await?;
        let tokens = unique_tokens(&recipients);
        if tokens.is_empty() {
            debug!(event_id = %event.id, "No push recipients for new event");
            return Ok(DispatchReport::default());
        }

        let content = NotificationContent::new_event(event);
        self.send(&tokens, &content.to_data()).await
    }

    /// Announce a significant edit to the event's attendees.
    pub async fn on_event_updated(
        &self,
        before: &Event,
        after: &Event,
    ) -> Result<DispatchReport, DispatchError> {
        let Some(kind) = ChangeKind::detect(before, after) else {
            return Ok(DispatchReport::default());
        };
        if after.attendees.is_empty() {
            debug!(event_id = %after.id, "Updated event has no attendees");
            return Ok(DispatchReport::default());
        }

        let attendees: Vec<String> = after
            .attendees
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut recipients = Vec::new();
        for batch in attendees.chunks(IN_QUERY_LIMIT) {
            recipients.extend(self.store.push_recipients_in(batch).await?);
        }

        let tokens = unique_tokens(&recipients);
        if tokens.is_empty() {
            debug!(event_id = %after.id, "No attendee push tokens for updated event");
            return Ok(DispatchReport::default());
        }

        let content = NotificationContent::event_updated(after, kind);
        self.send(&tokens, &content.to_data()).await
    }

    async fn send(
        &self,
        tokens: &[String],
        data: &BTreeMap<String, String>,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        for chunk in tokens.chunks(MULTICAST_LIMIT) {
            let outcomes = self.sender.send_multicast(chunk, data).await?;
            report.sent += chunk.len();

            let invalid: Vec<String> = chunk
                .iter()
                .zip(&outcomes)
                .filter(|(_, outcome)| outcome.is_invalid_token())
                .map(|(token, _)| token.clone())
                .collect();
            report.cleared += self.cleanup_invalid_tokens(&invalid).await;
        }

        info!(
            kind = data.get("type").map(String::as_str).unwrap_or_default(),
            sent = report.sent,
            cleared = report.cleared,
            "Dispatched event notification"
        );
        Ok(report)
    }

    /// Clear rejected tokens in one batch. Best effort.
    async fn cleanup_invalid_tokens(&self, tokens: &[String]) -> usize {
        if tokens.is_empty() {
            return 0;
        }
        match self.store.clear_push_tokens(tokens).await {
            Ok(cleared) => {
                debug!(cleared, "Cleared invalid push tokens");
                cleared
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear invalid push tokens");
                0
            }
        }
    }
}

/// Distinct push tokens of `users`, in a stable order.
fn unique_tokens(users: &[User]) -> Vec<String> {
    users
        .iter()
        .filter_map(|u| u.fcm_token.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{RecordingPushSender, SendOutcome};
    use crate::store::EventStore;
    use chrono::{NaiveDate, NaiveDateTime};
    use noticeboard_core::EventDraft;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn event() -> Event {
        Event::new(
            EventDraft {
                title: "Cars on Sunday".into(),
                description: "Monthly meet".into(),
                date: NaiveDate::from_ymd_opt(2026, 10, 17)
                    .unwrap()
                    .and_hms_opt(14, 30, 0)
                    .unwrap(),
                location: "Main street".into(),
                attendee_limit: None,
            },
            "admin".into(),
            now(),
        )
    }

    async fn user(store: &DocumentStore, name: &str, token: Option<&str>) -> User {
        let mut user = User::new(name.into(), "h".into(), "N".into(), "S".into(), "0".into());
        user.fcm_token = token.map(str::to_string);
        store.save_user(user).await.unwrap()
    }

    fn dispatcher(store: &DocumentStore) -> (NotificationDispatcher, Arc<RecordingPushSender>) {
        let sender = Arc::new(RecordingPushSender::new());
        (
            NotificationDispatcher::new(Arc::new(store.clone()), sender.clone()),
            sender,
        )
    }

    #[tokio::test]
    async fn new_event_goes_to_all_recipients() {
        let store = DocumentStore::new();
        user(&store, "a", Some("tok-a")).await;
        user(&store, "b", Some("tok-b")).await;
        user(&store, "c", None).await;
        let mut muted = user(&store, "d", Some("tok-d")).await;
        muted.notifications_enabled = false;
        store.update_user(muted).await.unwrap();

        let (dispatcher, sender) = dispatcher(&store);
        let event = event();
        let report = dispatcher.on_event_created(&event).await.unwrap();
        assert_eq!(report.sent, 2);

        let batches = sender.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].tokens, vec!["tok-a".to_string(), "tok-b".to_string()]);
        assert_eq!(batches[0].data["type"], "new_event");
        assert_eq!(batches[0].data["title"], "New Event Available!");
        assert_eq!(
            batches[0].data["body"],
            "Cars on Sunday - Sat, Oct 17, 2026, 02:30 PM"
        );
        assert_eq!(batches[0].data["eventId"], event.id);
    }

    #[tokio::test]
    async fn new_event_without_recipients_sends_nothing() {
        let store = DocumentStore::new();
        user(&store, "a", None).await;

        let (dispatcher, sender) = dispatcher(&store);
        let report = dispatcher.on_event_created(&event()).await.unwrap();
        assert_eq!(report, DispatchReport::default());
        assert!(sender.batches().is_empty());
    }

    #[tokio::test]
    async fn insignificant_update_is_silent() {
        let store = DocumentStore::new();
        let a = user(&store, "a", Some("tok-a")).await;
        let before = event();
        let mut after = before.clone();
        after.attendees.push(a.id);
        after.status = noticeboard_core::EventStatus::Cancelled;

        let (dispatcher, sender) = dispatcher(&store);
        dispatcher.on_event_updated(&before, &after).await.unwrap();
        assert!(sender.batches().is_empty());
    }

    #[tokio::test]
    async fn update_without_attendees_is_silent() {
        let store = DocumentStore::new();
        user(&store, "a", Some("tok-a")).await;
        let before = event();
        let mut after = before.clone();
        after.title = "Renamed".into();

        let (dispatcher, sender) = dispatcher(&store);
        dispatcher.on_event_updated(&before, &after).await.unwrap();
        assert!(sender.batches().is_empty());
    }

    #[tokio::test]
    async fn update_reaches_attendees_in_batches() {
        let store = DocumentStore::new();
        let mut before = event();
        // 23 attendees spread over three IN lookups; two share a device
        for i in 0..23 {
            let token = if i == 22 {
                "tok-0".to_string()
            } else {
                format!("tok-{i}")
            };
            let u = user(&store, &format!("u{i}"), Some(&token)).await;
            before.attendees.push(u.id);
        }
        let outsider = user(&store, "outsider", Some("tok-out")).await;

        let mut after = before.clone();
        after.location = "Harbour".into();
        after.description = "New details".into();

        let (dispatcher, sender) = dispatcher(&store);
        let report = dispatcher.on_event_updated(&before, &after).await.unwrap();
        assert_eq!(report.sent, 22);

        let batches = sender.batches();
        assert_eq!(batches.len(), 1);
        assert!(!batches[0].tokens.contains(outsider.fcm_token.as_ref().unwrap()));
        assert_eq!(batches[0].data["type"], "event_updated");
        assert_eq!(batches[0].data["title"], "Event Updated");
        assert_eq!(
            batches[0].data["body"],
            "Cars on Sunday location has been changed"
        );
    }

    #[tokio::test]
    async fn rejected_tokens_are_cleared() {
        let store = DocumentStore::new();
        let live = user(&store, "live", Some("tok-live")).await;
        let dead = user(&store, "dead", Some("tok-dead")).await;

        let (dispatcher, sender) = dispatcher(&store);
        sender.reject_token("tok-dead");

        let report = dispatcher.on_event_created(&event()).await.unwrap();
        assert_eq!(report, DispatchReport { sent: 2, cleared: 1 });

        let dead = store.get_user(&dead.id).await.unwrap().unwrap();
        let live = store.get_user(&live.id).await.unwrap().unwrap();
        assert_eq!(dead.fcm_token, None);
        assert_eq!(live.fcm_token.as_deref(), Some("tok-live"));
    }

    #[tokio::test]
    async fn started_dispatcher_follows_the_feed() {
        let store = DocumentStore::new();
        user(&store, "a", Some("tok-a")).await;

        let (dispatcher, sender) = dispatcher(&store);
        let handle = Arc::new(dispatcher).start();

        store.create_event(event()).await.unwrap();

        for _ in 0..50 {
            if !sender.batches().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(sender.batches().len(), 1);
        handle.abort();
    }

    /// Hangs forever on one event's notifications, records the rest.
    struct StallingSender {
        stalled_event: String,
        inner: RecordingPushSender,
    }

    #[async_trait::async_trait]
    impl PushSender for StallingSender {
        async fn send_multicast(
            &self,
            tokens: &[String],
            data: &BTreeMap<String, String>,
        ) -> Result<Vec<SendOutcome>, PushError> {
            if data.get("eventId") == Some(&self.stalled_event) {
                std::future::pending::<()>().await;
            }
            self.inner.send_multicast(tokens, data).await
        }
    }

    #[tokio::test]
    async fn slow_send_does_not_hold_back_later_changes() {
        let store = DocumentStore::new();
        user(&store, "a", Some("tok-a")).await;

        let first = event();
        let second = event();
        let sender = Arc::new(StallingSender {
            stalled_event: first.id.clone(),
            inner: RecordingPushSender::new(),
        });
        let dispatcher = NotificationDispatcher::new(Arc::new(store.clone()), sender.clone());
        let handle = Arc::new(dispatcher).start();

        store.create_event(first).await.unwrap();
        store.create_event(second.clone()).await.unwrap();

        for _ in 0..50 {
            if !sender.inner.batches().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let batches = sender.inner.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].data["eventId"], second.id);
        handle.abort();
    }
}
