//! Local key-value store backed by JSON files.
//!
//! Each key (`events`, `users`, `notices`) lives in its own file under the
//! data directory as a JSON array. The full state is held in memory behind a
//! single async mutex; every mutation rewrites the affected file (temp file,
//! then rename) and re-publishes a fresh snapshot to observers. Memory only
//! changes once the file write has succeeded.
//!
//! There is no change feed here: writes to the local store never trigger
//! push notifications.

use super::{
    check_replace, sort_events, sort_notices, CorruptDataPolicy, EventStore, NoticeStore,
    SnapshotStream, StorageError, StoreResult, UserStore, IN_QUERY_LIMIT,
};
use async_trait::async_trait;
use futures::StreamExt;
use noticeboard_core::record::{decode_list, encode_list};
use noticeboard_core::{Event, EventDraft, EventStatus, Notice, User, UserChange, UserId, UserRole};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

const KEY_EVENTS: &str = "events";
const KEY_USERS: &str = "users";
const KEY_NOTICES: &str = "notices";

#[derive(Default)]
struct LocalState {
    events: Vec<Event>,
    users: Vec<User>,
    notices: Vec<Notice>,
}

/// JSON-file store
pub struct LocalStore {
    dir: PathBuf,
    state: Mutex<LocalState>,
    events_tx: watch::Sender<Vec<Event>>,
    notices_tx: watch::Sender<Vec<Notice>>,
}

impl LocalStore {
    /// Open (or create) the store under `dir`, loading every key.
    pub async fn open(dir: impl Into<PathBuf>, policy: CorruptDataPolicy) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let state = LocalState {
            events: load_key(&dir, KEY_EVENTS, policy).await?,
            users: load_key(&dir, KEY_USERS, policy).await?,
            notices: load_key(&dir, KEY_NOTICES, policy).await?,
        };

        info!(
            dir = %dir.display(),
            events = state.events.len(),
            users = state.users.len(),
            notices = state.notices.len(),
            "Opened local store"
        );

        let (events_tx, _) = watch::channel(sorted_events(&state.events));
        let (notices_tx, _) = watch::channel(sorted_notices(&state.notices));

        Ok(Self {
            dir,
            state: Mutex::new(state),
            events_tx,
            notices_tx,
        })
    }

    // Writers hold the state lock, build the next collection on the side,
    // persist it and only then swap it in. A failed write leaves memory
    // unchanged.

    async fn commit_events(&self, state: &mut LocalState, events: Vec<Event>) -> StoreResult<()> {
        save_key(&self.dir, KEY_EVENTS, &events).await?;
        self.events_tx.send_replace(sorted_events(&events));
        state.events = events;
        Ok(())
    }

    async fn commit_users(&self, state: &mut LocalState, users: Vec<User>) -> StoreResult<()> {
        save_key(&self.dir, KEY_USERS, &users).await?;
        state.users = users;
        Ok(())
    }

    async fn commit_notices(&self, state: &mut LocalState, notices: Vec<Notice>) -> StoreResult<()> {
        save_key(&self.dir, KEY_NOTICES, &notices).await?;
        self.notices_tx.send_replace(sorted_notices(&notices));
        state.notices = notices;
        Ok(())
    }

    /// Run `mutate` on one event while holding the state lock, then persist.
    ///
    /// On a rejected mutation nothing is written.
    async fn mutate_event<F>(&self, event_id: &str, mutate: F) -> StoreResult<Event>
    where
        F: FnOnce(&mut Event) -> noticeboard_core::Result<()> + Send,
    {
        let mut state = self.state.lock().await;
        let mut events = state.events.clone();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(StorageError::event_not_found)?;

        mutate(event)?;
        let updated = event.clone();

        self.commit_events(&mut state, events).await?;
        Ok(updated)
    }
}

#[async_trait]
impl EventStore for LocalStore {
    async fn create_event(&self, event: Event) -> StoreResult<Event> {
        let mut state = self.state.lock().await;
        let mut events = state.events.clone();
        events.push(event.clone());
        self.commit_events(&mut state, events).await?;

        debug!(event_id = %event.id, "Saved event locally");
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> StoreResult<Option<Event>> {
        let state = self.state.lock().await;
        Ok(state.events.iter().find(|e| e.id == id).cloned())
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let state = self.state.lock().await;
        Ok(sorted_events(&state.events))
    }

    async fn update_event(&self, event: Event) -> StoreResult<Event> {
        let mut state = self.state.lock().await;
        let mut events = state.events.clone();
        let slot = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(StorageError::event_not_found)?;

        check_replace(slot, &event)?;
        *slot = event.clone();
        self.commit_events(&mut state, events).await?;
        Ok(event)
    }

    async fn delete_event(&self, id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let mut events = state.events.clone();
        events.retain(|e| e.id != id);
        if events.len() != state.events.len() {
            self.commit_events(&mut state, events).await?;
            debug!(event_id = %id, "Deleted local event");
        }
        Ok(())
    }

    async fn attend_event(&self, event_id: &str, user_id: &str) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.add_attendee(user_id))
            .await
    }

    async fn leave_event(&self, event_id: &str, user_id: &str) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.remove_attendee(user_id))
            .await
    }

    async fn edit_event(&self, event_id: &str, draft: EventDraft) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.apply_edit(draft))
            .await
    }

    async fn transition_event(&self, event_id: &str, next: EventStatus) -> StoreResult<Event> {
        self.mutate_event(event_id, |event| event.advance_to(next))
            .await
    }

    fn observe_events(&self) -> SnapshotStream<Event> {
        WatchStream::new(self.events_tx.subscribe()).boxed()
    }
}

#[async_trait]
impl UserStore for LocalStore {
    async fn save_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        let mut users = state.users.clone();
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user.clone(),
            None => users.push(user.clone()),
        }
        self.commit_users(&mut state, users).await?;
        Ok(user)
    }

    async fn register_user(&self, mut user: User) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(noticeboard_core::Error::UsernameTaken.into());
        }
        if state.users.is_empty() {
            user.role = UserRole::Admin;
        }

        let mut users = state.users.clone();
        users.push(user.clone());
        self.commit_users(&mut state, users).await?;
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state.users.clone())
    }

    async fn update_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        let mut users = state.users.clone();
        let slot = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(StorageError::user_not_found)?;
        *slot = user.clone();
        self.commit_users(&mut state, users).await?;
        Ok(user)
    }

    async fn change_user(&self, id: &str, change: UserChange) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        let mut users = state.users.clone();
        let slot = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(StorageError::user_not_found)?;
        slot.apply(change);
        let changed = slot.clone();
        self.commit_users(&mut state, users).await?;
        Ok(changed)
    }

    async fn delete_user(&self, id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let mut users = state.users.clone();
        users.retain(|u| u.id != id);
        if users.len() != state.users.len() {
            self.commit_users(&mut state, users).await?;
        }
        Ok(())
    }

    async fn push_recipients(&self) -> StoreResult<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|u| u.is_push_recipient())
            .cloned()
            .collect())
    }

    async fn push_recipients_in(&self, ids: &[UserId]) -> StoreResult<Vec<User>> {
        if ids.len() > IN_QUERY_LIMIT {
            return Err(StorageError::QueryLimit {
                limit: IN_QUERY_LIMIT,
                got: ids.len(),
            });
        }
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|u| ids.contains(&u.id) && u.is_push_recipient())
            .cloned()
            .collect())
    }

    async fn clear_push_tokens(&self, tokens: &[String]) -> StoreResult<usize> {
        let tokens: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        let mut state = self.state.lock().await;
        let mut users = state.users.clone();

        let mut cleared = 0;
        for user in &mut users {
            if user.fcm_token.as_deref().is_some_and(|t| tokens.contains(t)) {
                user.fcm_token = None;
                cleared += 1;
            }
        }
        if cleared > 0 {
            self.commit_users(&mut state, users).await?;
        }
        Ok(cleared)
    }
}

#[async_trait]
impl NoticeStore for LocalStore {
    async fn create_notice(&self, notice: Notice) -> StoreResult<Notice> {
        let mut state = self.state.lock().await;
        let mut notices = state.notices.clone();
        notices.push(notice.clone());
        self.commit_notices(&mut state, notices).await?;
        Ok(notice)
    }

    async fn get_notice(&self, id: &str) -> StoreResult<Option<Notice>> {
        let state = self.state.lock().await;
        Ok(state.notices.iter().find(|n| n.id == id).cloned())
    }

    async fn list_notices(&self) -> StoreResult<Vec<Notice>> {
        let state = self.state.lock().await;
        Ok(sorted_notices(&state.notices))
    }

    async fn update_notice(&self, notice: Notice) -> StoreResult<Notice> {
        let mut state = self.state.lock().await;
        let mut notices = state.notices.clone();
        let slot = notices
            .iter_mut()
            .find(|n| n.id == notice.id)
            .ok_or_else(StorageError::notice_not_found)?;
        *slot = notice.clone();
        self.commit_notices(&mut state, notices).await?;
        Ok(notice)
    }

    async fn delete_notice(&self, id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let mut notices = state.notices.clone();
        notices.retain(|n| n.id != id);
        if notices.len() != state.notices.len() {
            self.commit_notices(&mut state, notices).await?;
        }
        Ok(())
    }

    fn observe_notices(&self) -> SnapshotStream<Notice> {
        WatchStream::new(self.notices_tx.subscribe()).boxed()
    }
}

fn sorted_events(events: &[Event]) -> Vec<Event> {
    let mut events = events.to_vec();
    sort_events(&mut events);
    events
}

fn sorted_notices(notices: &[Notice]) -> Vec<Notice> {
    let mut notices = notices.to_vec();
    sort_notices(&mut notices);
    notices
}

fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

/// Read one key, applying `policy` when the content cannot be parsed.
async fn load_key<T: DeserializeOwned>(
    dir: &Path,
    key: &'static str,
    policy: CorruptDataPolicy,
) -> StoreResult<Vec<T>> {
    let raw = match tokio::fs::read_to_string(key_path(dir, key)).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    match decode_list(&raw) {
        Ok(records) => Ok(records),
        Err(source) => match policy {
            CorruptDataPolicy::ReturnEmpty => {
                warn!(key, error = %source, "Malformed local data, starting empty");
                Ok(Vec::new())
            }
            CorruptDataPolicy::Fail => Err(StorageError::Corrupt { key, source }),
        },
    }
}

/// Write one key atomically: temp file, then rename over the original.
async fn save_key<T: Serialize>(dir: &Path, key: &str, records: &[T]) -> StoreResult<()> {
    let raw = encode_list(records)?;
    let path = key_path(dir, key);
    let tmp = dir.join(format!("{key}.json.tmp"));

    tokio::fs::write(&tmp, raw).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use noticeboard_core::{Error, EventDraft, NoticePriority};

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

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let id = {
            let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
            let e = store.create_event(event(Some(3))).await.unwrap();
            store.attend_event(&e.id, "a").await.unwrap();
            e.id
        };

        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        let reloaded = store.get_event(&id).await.unwrap().unwrap();
        assert_eq!(reloaded.attendees, vec!["a"]);
        assert_eq!(reloaded.attendee_limit, Some(3));
    }

    #[tokio::test]
    async fn corrupt_file_returns_empty_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("events.json"), "{not json").unwrap();

        let store = LocalStore::open(dir.path(), CorruptDataPolicy::ReturnEmpty)
            .await
            .unwrap();
        assert!(store.list_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_fails_under_strict_policy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("users.json"), r#"[{"id": 1}]"#).unwrap();

        let err = LocalStore::open(dir.path(), CorruptDataPolicy::Fail)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Corrupt { key: "users", .. }));
    }

    #[tokio::test]
    async fn rejected_attend_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        let e = store.create_event(event(None)).await.unwrap();

        store.attend_event(&e.id, "a").await.unwrap();
        let err = store.attend_event(&e.id, "a").await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(Error::AlreadyAttending)));

        let err = store.leave_event(&e.id, "b").await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(Error::NotAttending)));

        assert_eq!(store.get_event(&e.id).await.unwrap().unwrap().attendees, vec!["a"]);
    }

    #[tokio::test]
    async fn observe_republishes_after_each_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();

        let mut stream = store.observe_events();
        assert!(stream.next().await.unwrap().is_empty());

        let e = store.create_event(event(None)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().len(), 1);

        store.attend_event(&e.id, "a").await.unwrap();
        assert_eq!(stream.next().await.unwrap()[0].attendees, vec!["a"]);

        store.delete_event(&e.id).await.unwrap();
        assert!(stream.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notices_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();

        let older = Notice::new("old".into(), "c".into(), NoticePriority::Low, "a".into(), now());
        let newer = Notice::new(
            "new".into(),
            "c".into(),
            NoticePriority::Urgent,
            "a".into(),
            now() + chrono::Duration::hours(1),
        );
        store.create_notice(older).await.unwrap();
        store.create_notice(newer).await.unwrap();

        let titles: Vec<String> = store
            .list_notices()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        let kept = store.create_event(event(None)).await.unwrap();

        // A directory where the temp file should go makes every events write fail
        let blocker = dir.path().join("events.json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        assert!(store.create_event(event(None)).await.is_err());
        assert!(store.attend_event(&kept.id, "a").await.is_err());
        assert!(store.delete_event(&kept.id).await.is_err());

        let events = store.list_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].attendees.is_empty());

        std::fs::remove_dir(&blocker).unwrap();
        let reopened = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        assert_eq!(reopened.list_events().await.unwrap(), events);
    }

    #[tokio::test]
    async fn failed_user_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        std::fs::create_dir(dir.path().join("users.json.tmp")).unwrap();

        let user = User::new("a".into(), "h".into(), "N".into(), "S".into(), "1".into());
        assert!(store.register_user(user).await.is_err());
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_is_unique_and_bootstraps_admin() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        let user = |name: &str| User::new(name.into(), "h".into(), "N".into(), "S".into(), "1".into());

        let first = store.register_user(user("alice")).await.unwrap();
        assert_eq!(first.role, UserRole::Admin);

        let err = store.register_user(user("alice")).await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(Error::UsernameTaken)));

        let second = store.register_user(user("bob")).await.unwrap();
        assert_eq!(second.role, UserRole::User);
        assert_eq!(store.list_users().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn edit_and_transition_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        let e = store.create_event(event(None)).await.unwrap();
        store.attend_event(&e.id, "a").await.unwrap();

        let draft = EventDraft {
            title: "Renamed".into(),
            description: e.description.clone(),
            date: e.date,
            location: e.location.clone(),
            attendee_limit: None,
        };
        store.edit_event(&e.id, draft).await.unwrap();
        store.transition_event(&e.id, EventStatus::Cancelled).await.unwrap();

        let reopened = LocalStore::open(dir.path(), CorruptDataPolicy::Fail).await.unwrap();
        let stored = reopened.get_event(&e.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.attendees, vec!["a"]);
        assert_eq!(stored.status, EventStatus::Cancelled);
    }
}
