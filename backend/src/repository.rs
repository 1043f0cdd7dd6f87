//! Repositories over the active backing store.
//!
//! [`DataSourceManager`] owns both stores and a runtime switch selecting
//! which one serves requests. The switch is persisted in `settings.json`
//! under the data directory so it survives restarts. Repositories resolve
//! the active store on every call, so a switch takes effect immediately
//! without touching call sites.
//!
//! Point lookups downgrade storage failures to "absent" (logged); every
//! mutation surfaces failures as [`RepositoryError`].

use crate::config::{Config, StorageMode};
use crate::store::{
    DocumentStore, EventStore, LocalStore, NoticeStore, SnapshotStream, StorageError,
    StoreResult, UserStore,
};
use noticeboard_core::{Event, EventDraft, EventStatus, Notice, User, UserChange};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A domain rule refused the mutation at the storage boundary.
    #[error(transparent)]
    Rejected(noticeboard_core::Error),

    #[error("Storage failure: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity } => RepositoryError::NotFound(entity),
            StorageError::Rejected(rule) => RepositoryError::Rejected(rule),
            other => RepositoryError::Storage(other),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persisted form of the storage switch
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageSettings {
    storage_mode: StorageMode,
}

/// Holds both stores and selects the active one
pub struct DataSourceManager {
    local: Arc<LocalStore>,
    remote: Arc<DocumentStore>,
    use_remote: AtomicBool,
    settings_path: PathBuf,
}

impl DataSourceManager {
    /// Open the local store and a fresh document store, restoring the
    /// persisted switch or falling back to the configured mode.
    ///
    /// The document store lives in process memory: its users, events and
    /// notices start empty on every start. Only the local store persists.
    pub async fn open(config: &Config) -> StoreResult<Self> {
        let local = Arc::new(LocalStore::open(&config.data_dir, config.corrupt_data_policy).await?);
        let remote = Arc::new(DocumentStore::new());
        let settings_path = config.settings_path();

        let mode = match read_settings(&settings_path).await {
            Some(settings) => settings.storage_mode,
            None => config.storage_mode,
        };

        info!(storage_mode = ?mode, "Selected backing store");
        if mode.is_remote() {
            warn!("Document store is in-memory; its data does not survive a restart");
        }

        Ok(Self::new(local, remote, mode, settings_path))
    }

    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<DocumentStore>,
        mode: StorageMode,
        settings_path: PathBuf,
    ) -> Self {
        Self {
            local,
            remote,
            use_remote: AtomicBool::new(mode.is_remote()),
            settings_path,
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        if self.use_remote.load(Ordering::SeqCst) {
            StorageMode::Remote
        } else {
            StorageMode::Local
        }
    }

    /// Switch stores and persist the choice.
    pub async fn set_storage_mode(&self, mode: StorageMode) -> StoreResult<()> {
        let raw = serde_json::to_string(&StorageSettings { storage_mode: mode })?;
        tokio::fs::write(&self.settings_path, raw).await?;
        self.use_remote.store(mode.is_remote(), Ordering::SeqCst);

        info!(storage_mode = ?mode, "Switched backing store");
        Ok(())
    }

    pub fn event_store(&self) -> Arc<dyn EventStore> {
        if self.use_remote.load(Ordering::SeqCst) {
            self.remote.clone()
        } else {
            self.local.clone()
        }
    }

    pub fn user_store(&self) -> Arc<dyn UserStore> {
        if self.use_remote.load(Ordering::SeqCst) {
            self.remote.clone()
        } else {
            self.local.clone()
        }
    }

    pub fn notice_store(&self) -> Arc<dyn NoticeStore> {
        if self.use_remote.load(Ordering::SeqCst) {
            self.remote.clone()
        } else {
            self.local.clone()
        }
    }

    /// The document store, regardless of the switch (change feed source)
    pub fn document_store(&self) -> &Arc<DocumentStore> {
        &self.remote
    }

    pub fn local_store(&self) -> &Arc<LocalStore> {
        &self.local
    }
}

async fn read_settings(path: &Path) -> Option<StorageSettings> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed storage settings");
            None
        }
    }
}

// === Events ===

/// Event CRUD, attendance and live list over the active store
#[derive(Clone)]
pub struct EventRepository {
    sources: Arc<DataSourceManager>,
}

impl EventRepository {
    pub fn new(sources: Arc<DataSourceManager>) -> Self {
        Self { sources }
    }

    pub async fn create_event(&self, event: Event) -> RepositoryResult<Event> {
        Ok(self.sources.event_store().create_event(event).await?)
    }

    /// `None` when absent or unreadable.
    pub async fn get_event_by_id(&self, id: &str) -> Option<Event> {
        match self.sources.event_store().get_event(id).await {
            Ok(event) => event,
            Err(e) => {
                warn!(event_id = %id, error = %e, "Event lookup failed");
                None
            }
        }
    }

    pub async fn list_events(&self) -> RepositoryResult<Vec<Event>> {
        Ok(self.sources.event_store().list_events().await?)
    }

    pub async fn events_by_creator(&self, creator_id: &str) -> RepositoryResult<Vec<Event>> {
        let mut events = self.list_events().await?;
        events.retain(|e| e.created_by == creator_id);
        Ok(events)
    }

    pub async fn events_by_status(&self, status: EventStatus) -> RepositoryResult<Vec<Event>> {
        let mut events = self.list_events().await?;
        events.retain(|e| e.status == status);
        Ok(events)
    }

    pub async fn update_event(&self, event: Event) -> RepositoryResult<Event> {
        Ok(self.sources.event_store().update_event(event).await?)
    }

    pub async fn delete_event(&self, id: &str) -> RepositoryResult<()> {
        Ok(self.sources.event_store().delete_event(id).await?)
    }

    /// Replace the editable fields in place, keeping the stored attendees.
    pub async fn edit_event(&self, event_id: &str, draft: EventDraft) -> RepositoryResult<Event> {
        Ok(self.sources.event_store().edit_event(event_id, draft).await?)
    }

    pub async fn transition_event(
        &self,
        event_id: &str,
        next: EventStatus,
    ) -> RepositoryResult<Event> {
        Ok(self.sources.event_store().transition_event(event_id, next).await?)
    }

    pub async fn attend_event(&self, event_id: &str, user_id: &str) -> RepositoryResult<Event> {
        Ok(self.sources.event_store().attend_event(event_id, user_id).await?)
    }

    pub async fn leave_event(&self, event_id: &str, user_id: &str) -> RepositoryResult<Event> {
        Ok(self.sources.event_store().leave_event(event_id, user_id).await?)
    }

    pub async fn is_user_attending(&self, event_id: &str, user_id: &str) -> bool {
        self.get_event_by_id(event_id)
            .await
            .is_some_and(|e| e.is_attending(user_id))
    }

    /// Live event list from the store active at subscription time.
    pub fn get_events(&self) -> SnapshotStream<Event> {
        self.sources.event_store().observe_events()
    }
}

// === Users ===

/// User records over the active store
#[derive(Clone)]
pub struct UserRepository {
    sources: Arc<DataSourceManager>,
}

impl UserRepository {
    pub fn new(sources: Arc<DataSourceManager>) -> Self {
        Self { sources }
    }

    pub async fn save_user(&self, user: User) -> RepositoryResult<User> {
        Ok(self.sources.user_store().save_user(user).await?)
    }

    /// Insert a new account; fails with `UsernameTaken` on a duplicate.
    pub async fn register_user(&self, user: User) -> RepositoryResult<User> {
        Ok(self.sources.user_store().register_user(user).await?)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Option<User> {
        match self.sources.user_store().get_user(id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "User lookup failed");
                None
            }
        }
    }

    pub async fn get_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self.sources.user_store().get_user_by_username(username).await?)
    }

    pub async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        Ok(self.sources.user_store().list_users().await?)
    }

    pub async fn update_user(&self, user: User) -> RepositoryResult<User> {
        Ok(self.sources.user_store().update_user(user).await?)
    }

    pub async fn change_user(&self, id: &str, change: UserChange) -> RepositoryResult<User> {
        Ok(self.sources.user_store().change_user(id, change).await?)
    }

    pub async fn delete_user(&self, id: &str) -> RepositoryResult<()> {
        Ok(self.sources.user_store().delete_user(id).await?)
    }
}

// === Notices ===

/// Notice CRUD and live list over the active store
#[derive(Clone)]
pub struct NoticeRepository {
    sources: Arc<DataSourceManager>,
}

impl NoticeRepository {
    pub fn new(sources: Arc<DataSourceManager>) -> Self {
        Self { sources }
    }

    pub async fn create_notice(&self, notice: Notice) -> RepositoryResult<Notice> {
        Ok(self.sources.notice_store().create_notice(notice).await?)
    }

    pub async fn get_notice_by_id(&self, id: &str) -> Option<Notice> {
        match self.sources.notice_store().get_notice(id).await {
            Ok(notice) => notice,
            Err(e) => {
                warn!(notice_id = %id, error = %e, "Notice lookup failed");
                None
            }
        }
    }

    pub async fn list_notices(&self) -> RepositoryResult<Vec<Notice>> {
        Ok(self.sources.notice_store().list_notices().await?)
    }

    pub async fn notices_by_creator(&self, creator_id: &str) -> RepositoryResult<Vec<Notice>> {
        let mut notices = self.list_notices().await?;
        notices.retain(|n| n.created_by == creator_id);
        Ok(notices)
    }

    pub async fn update_notice(&self, notice: Notice) -> RepositoryResult<Notice> {
        Ok(self.sources.notice_store().update_notice(notice).await?)
    }

    pub async fn delete_notice(&self, id: &str) -> RepositoryResult<()> {
        Ok(self.sources.notice_store().delete_notice(id).await?)
    }

    pub fn get_notices(&self) -> SnapshotStream<Notice> {
        self.sources.notice_store().observe_notices()
    }
}
