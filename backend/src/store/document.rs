//! In-memory document store with a change feed.
//!
//! Collections are `DashMap`s keyed by document id. Partial event and user
//! mutations run while holding the entry's shard lock, so the check and the
//! write cannot interleave with another writer. Registrations are serialized
//! so the username check and the insert are one step. Every event write is broadcast as a
//! [`DocumentChange`]; the notification dispatcher subscribes to that feed.

use super::{
    check_replace, sort_events, sort_notices, DocumentChange, EventStore, NoticeStore,
    SnapshotStream, StorageError, StoreResult, UserStore, IN_QUERY_LIMIT,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{stream, StreamExt};
use noticeboard_core::{
    Event, EventDraft, EventId, EventStatus, Notice, User, UserChange, UserId, UserRole,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Broadcast channel capacity for change events
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Thread-safe in-memory document store
#[derive(Clone)]
pub struct DocumentStore {
    /// Event documents by id
    events: Arc<DashMap<EventId, Event>>,

    /// User documents by id
    users: Arc<DashMap<UserId, User>>,

    /// Notice documents by id
    notices: Arc<DashMap<String, Notice>>,

    /// Held while a new account is checked and inserted
    registrations: Arc<Mutex<()>>,

    /// Event change feed
    changes: broadcast::Sender<DocumentChange>,

    /// Notice collection ticks (no payload, subscribers re-read)
    notice_changes: broadcast::Sender<()>,
}

impl DocumentStore {
    /// Create a new empty store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let (notice_changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            events: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            notices: Arc::new(DashMap::new()),
            registrations: Arc::new(Mutex::new(())),
            changes,
            notice_changes,
        }
    }

    /// Subscribe to event writes
    pub fn subscribe_changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: DocumentChange) {
        // No receivers is fine: nobody is listening yet
        let _ = self.changes.send(change);
    }

    fn snapshot_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.iter().map(|e| e.value().clone()).collect();
        sort_events(&mut events);
        events
    }

    fn snapshot_notices(&self) -> Vec<Notice> {
        let mut notices: Vec<Notice> = self.notices.iter().map(|n| n.value().clone()).collect();
        sort_notices(&mut notices);
        notices
    }

    /// Apply `mutate` to one event under its entry lock and broadcast the result.
    fn mutate_event<F>(&self, event_id: &str, mutate: F) -> StoreResult<Event>
    where
        F: FnOnce(&mut Event) -> noticeboard_core::Result<()>,
    {
        let mut entry = self
            .events
            .get_mut(event_id)
            .ok_or_else(StorageError::event_not_found)?;

        let before = entry.value().clone();
        mutate(entry.value_mut())?;
        let after = entry.value().clone();
        drop(entry);

        self.publish(DocumentChange::Updated {
            before,
            after: after.clone(),
        });
        Ok(after)
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for DocumentStore {
    async fn create_event(&self, event: Event) -> StoreResult<Event> {
        let previous = self.events.insert(event.id.clone(), event.clone());

        debug!(event_id = %event.id, "Stored event document");

        match previous {
            None => self.publish(DocumentChange::Created(event.clone())),
            Some(before) => self.publish(DocumentChange::Updated {
                before,
                after: event.clone(),
            }),
        }
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> StoreResult<Option<Event>> {
        Ok(self.events.get(id).map(|e| e.value().clone()))
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        Ok(self.snapshot_events())
    }

    async fn update_event(&self, event: Event) -> StoreResult<Event> {
        let mut entry = self
            .events
            .get_mut(&event.id)
            .ok_or_else(StorageError::event_not_found)?;

        check_replace(entry.value(), &event)?;
        let before = std::mem::replace(entry.value_mut(), event.clone());
        drop(entry);

        self.publish(DocumentChange::Updated {
            before,
            after: event.clone(),
        });
        Ok(event)
    }

    async fn delete_event(&self, id: &str) -> StoreResult<()> {
        if self.events.remove(id).is_some() {
            debug!(event_id = %id, "Deleted event document");
            self.publish(DocumentChange::Deleted(id.to_string()));
        }
        Ok(())
    }

    async fn attend_event(&self, event_id: &str, user_id: &str) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.add_attendee(user_id))
    }

    async fn leave_event(&self, event_id: &str, user_id: &str) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.remove_attendee(user_id))
    }

    async fn edit_event(&self, event_id: &str, draft: EventDraft) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.apply_edit(draft))
    }

    async fn transition_event(&self, event_id: &str, next: EventStatus) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.advance_to(next))
    }

    fn observe_events(&self) -> SnapshotStream<Event> {
        // Subscribe before taking the snapshot so no write falls in between
        let rx = self.changes.subscribe();
        let initial = self.snapshot_events();
        let store = self.clone();

        stream::once(async move { initial })
            .chain(BroadcastStream::new(rx).map(move |_| store.snapshot_events()))
            .boxed()
    }
}

#[async_trait]
impl UserStore for DocumentStore {
    async fn save_user(&self, user: User) -> StoreResult<User> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn register_user(&self, mut user: User) -> StoreResult<User> {
        let _registering = self.registrations.lock().await;

        if self.users.iter().any(|u| u.username == user.username) {
            return Err(noticeboard_core::Error::UsernameTaken.into());
        }
        if self.users.is_empty() {
            user.role = UserRole::Admin;
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.value().clone()))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn update_user(&self, user: User) -> StoreResult<User> {
        let mut entry = self
            .users
            .get_mut(&user.id)
            .ok_or_else(StorageError::user_not_found)?;
        *entry.value_mut() = user.clone();
        Ok(user)
    }

    async fn change_user(&self, id: &str, change: UserChange) -> StoreResult<User> {
        let mut entry = self
            .users
            .get_mut(id)
            .ok_or_else(StorageError::user_not_found)?;
        entry.value_mut().apply(change);
        Ok(entry.value().clone())
    }

    async fn delete_user(&self, id: &str) -> StoreResult<()> {
        self.users.remove(id);
        Ok(())
    }

    async fn push_recipients(&self) -> StoreResult<Vec<User>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.is_push_recipient())
            .map(|u| u.value().clone())
            .collect())
    }

    async fn push_recipients_in(&self, ids: &[UserId]) -> StoreResult<Vec<User>> {
        if ids.len() > IN_QUERY_LIMIT {
            return Err(StorageError::QueryLimit {
                limit: IN_QUERY_LIMIT,
                got: ids.len(),
            });
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter(|u| u.is_push_recipient())
            .map(|u| u.value().clone())
            .collect())
    }

    async fn clear_push_tokens(&self, tokens: &[String]) -> StoreResult<usize> {
        let tokens: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        let mut cleared = 0;

        for mut entry in self.users.iter_mut() {
            let stale = entry
                .fcm_token
                .as_deref()
                .is_some_and(|t| tokens.contains(t));
            if stale {
                entry.value_mut().fcm_token = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl NoticeStore for DocumentStore {
    async fn create_notice(&self, notice: Notice) -> StoreResult<Notice> {
        self.notices.insert(notice.id.clone(), notice.clone());
        let _ = self.notice_changes.send(());
        Ok(notice)
    }

    async fn get_notice(&self, id: &str) -> StoreResult<Option<Notice>> {
        Ok(self.notices.get(id).map(|n| n.value().clone()))
    }

    async fn list_notices(&self) -> StoreResult<Vec<Notice>> {
        Ok(self.snapshot_notices())
    }

    async fn update_notice(&self, notice: Notice) -> StoreResult<Notice> {
        let mut entry = self
            .notices
            .get_mut(&notice.id)
            .ok_or_else(StorageError::notice_not_found)?;
        *entry.value_mut() = notice.clone();
        drop(entry);
        let _ = self.notice_changes.send(());
        Ok(notice)
    }

    async fn delete_notice(&self, id: &str) -> StoreResult<()> {
        if self.notices.remove(id).is_some() {
            let _ = self.notice_changes.send(());
        }
        Ok(())
    }

    fn observe_notices(&self) -> SnapshotStream<Notice> {
        let rx = self.notice_changes.subscribe();
        let initial = self.snapshot_notices();
        let store = self.clone();

        stream::once(async move { initial })
            .chain(BroadcastStream::new(rx).map(move |_| store.snapshot_notices()))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use noticeboard_core::{Error, EventDraft, EventStatus};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn event(limit: Option<u32>) -> Event {
        Event::new(
            EventDraft {
                title: "Meet".into(),
                description: "d".into(),
                date: now() + chrono::Duration::days(3),
                location: "l".into(),
                attendee_limit: limit,
            },
            "admin".into(),
            now(),
        )
    }

    fn user(name: &str, token: Option<&str>) -> User {
        let mut user = User::new(name.into(), "h".into(), "N".into(), "S".into(), "1".into());
        user.fcm_token = token.map(String::from);
        user
    }

    #[tokio::test]
    async fn create_broadcasts_created_then_updated() {
        let store = DocumentStore::new();
        let mut rx = store.subscribe_changes();

        let created = store.create_event(event(None)).await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), DocumentChange::Created(e) if e.id == created.id));

        store.attend_event(&created.id, "u1").await.unwrap();
        match rx.recv().await.unwrap() {
            DocumentChange::Updated { before, after } => {
                assert!(before.attendees.is_empty());
                assert_eq!(after.attendees, vec!["u1"]);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[tokio::test]
    async fn attend_rejects_when_full() {
        let store = DocumentStore::new();
        let e = store.create_event(event(Some(1))).await.unwrap();

        store.attend_event(&e.id, "a").await.unwrap();
        let err = store.attend_event(&e.id, "b").await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(Error::AtCapacity)));

        let stored = store.get_event(&e.id).await.unwrap().unwrap();
        assert_eq!(stored.attendees, vec!["a"]);
    }

    #[tokio::test]
    async fn attend_missing_event() {
        let store = DocumentStore::new();
        let err = store.attend_event("nope", "a").await.unwrap_err();
        assert_eq!(err.to_string(), "Event not found");
    }

    #[tokio::test]
    async fn update_rejects_status_regression() {
        let store = DocumentStore::new();
        let mut e = store.create_event(event(None)).await.unwrap();

        e.status = EventStatus::Cancelled;
        store.update_event(e.clone()).await.unwrap();

        e.status = EventStatus::Upcoming;
        let err = store.update_event(e).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Rejected(Error::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn delete_is_real_and_idempotent() {
        let store = DocumentStore::new();
        let e = store.create_event(event(None)).await.unwrap();

        store.delete_event(&e.id).await.unwrap();
        assert!(store.get_event(&e.id).await.unwrap().is_none());
        store.delete_event(&e.id).await.unwrap();
    }

    #[tokio::test]
    async fn observe_yields_snapshot_then_updates() {
        let store = DocumentStore::new();
        store.create_event(event(None)).await.unwrap();

        let mut stream = store.observe_events();
        assert_eq!(stream.next().await.unwrap().len(), 1);

        store.create_event(event(None)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn in_lookup_enforces_limit() {
        let store = DocumentStore::new();
        let ids: Vec<UserId> = (0..11).map(|i| format!("u{i}")).collect();

        let err = store.push_recipients_in(&ids).await.unwrap_err();
        assert!(matches!(err, StorageError::QueryLimit { limit: 10, got: 11 }));
    }

    #[tokio::test]
    async fn push_recipient_queries() {
        let store = DocumentStore::new();
        let a = store.save_user(user("a", Some("tok-a"))).await.unwrap();
        let b = store.save_user(user("b", None)).await.unwrap();
        let mut c = user("c", Some("tok-c"));
        c.notifications_enabled = false;
        let c = store.save_user(c).await.unwrap();

        let all = store.push_recipients().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, a.id);

        let some = store
            .push_recipients_in(&[b.id.clone(), c.id.clone(), a.id.clone()])
            .await
            .unwrap();
        assert_eq!(some.len(), 1);
    }

    #[tokio::test]
    async fn clear_push_tokens_nulls_owners() {
        let store = DocumentStore::new();
        let a = store.save_user(user("a", Some("dead"))).await.unwrap();
        let b = store.save_user(user("b", Some("alive"))).await.unwrap();

        let cleared = store.clear_push_tokens(&["dead".to_string()]).await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(store.get_user(&a.id).await.unwrap().unwrap().fcm_token, None);
        assert_eq!(
            store.get_user(&b.id).await.unwrap().unwrap().fcm_token.as_deref(),
            Some("alive")
        );
    }

    #[tokio::test]
    async fn edit_keeps_stored_attendees() {
        let store = DocumentStore::new();
        let e = store.create_event(event(None)).await.unwrap();
        let stale_draft = EventDraft {
            title: "Renamed".into(),
            description: e.description.clone(),
            date: e.date,
            location: e.location.clone(),
            attendee_limit: None,
        };

        store.attend_event(&e.id, "a").await.unwrap();
        let edited = store.edit_event(&e.id, stale_draft).await.unwrap();

        assert_eq!(edited.title, "Renamed");
        assert_eq!(edited.attendees, vec!["a"]);
    }

    #[tokio::test]
    async fn transition_is_strict() {
        let store = DocumentStore::new();
        let e = store.create_event(event(None)).await.unwrap();

        store.transition_event(&e.id, EventStatus::Cancelled).await.unwrap();
        let err = store
            .transition_event(&e.id, EventStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Rejected(Error::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn register_rejects_taken_username() {
        let store = DocumentStore::new();
        let first = store.register_user(user("alice", None)).await.unwrap();
        assert_eq!(first.role, UserRole::Admin);

        let err = store.register_user(user("alice", None)).await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(Error::UsernameTaken)));

        let second = store.register_user(user("Alice", None)).await.unwrap();
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn change_user_keeps_other_fields() {
        let store = DocumentStore::new();
        let a = store.save_user(user("a", Some("tok"))).await.unwrap();

        store.change_user(&a.id, UserChange::Role(UserRole::Admin)).await.unwrap();
        let changed = store
            .change_user(&a.id, UserChange::NotificationsEnabled(false))
            .await
            .unwrap();

        assert!(changed.is_admin());
        assert!(!changed.notifications_enabled);
        assert_eq!(changed.fcm_token.as_deref(), Some("tok"));
    }
}
