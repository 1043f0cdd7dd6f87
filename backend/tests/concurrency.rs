//! Concurrent attendance against both stores.
//!
//! A read-modify-write through `update_event` loses updates when two
//! writers interleave. `attend_event` re-checks and writes in one step,
//! so concurrent joins never exceed the limit or duplicate an attendee.
//! Admin edits go through `edit_event` and never erase a join either.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use noticeboard_backend::store::{CorruptDataPolicy, DocumentStore, EventStore, LocalStore};
use noticeboard_core::{Error, Event, EventDraft};
use std::collections::HashSet;
use std::sync::Arc;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 17)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn event(limit: Option<u32>) -> Event {
    Event::new(
        EventDraft {
            title: "Cars on Sunday".into(),
            description: "Monthly meet".into(),
            date: now() + Duration::days(1),
            location: "Main street".into(),
            attendee_limit: limit,
        },
        "admin".into(),
        now(),
    )
}

/// Two clients read the same snapshot, each appends itself and writes
/// the whole record back. The second write erases the first join.
async fn naive_join_loses_update(store: Arc<dyn EventStore>) {
    let created = store.create_event(event(Some(10))).await.unwrap();

    let mut seen_by_a = store.get_event(&created.id).await.unwrap().unwrap();
    let mut seen_by_b = store.get_event(&created.id).await.unwrap().unwrap();

    seen_by_a.attendees.push("user-a".into());
    seen_by_b.attendees.push("user-b".into());
    store.update_event(seen_by_a).await.unwrap();
    store.update_event(seen_by_b).await.unwrap();

    let stored = store.get_event(&created.id).await.unwrap().unwrap();
    assert_eq!(stored.attendees, vec!["user-b".to_string()]);
}

/// Many users race for a small event through the atomic join.
async fn atomic_join_respects_limit(store: Arc<dyn EventStore>) {
    const LIMIT: u32 = 5;
    const USERS: usize = 40;

    let created = store.create_event(event(Some(LIMIT))).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..USERS {
        let store = store.clone();
        let id = created.id.clone();
        // Every user tries twice to also race against itself
        tasks.push(tokio::spawn(async move {
            let user = format!("user-{}", i % (USERS / 2));
            store.attend_event(&id, &user).await
        }));
    }

    let mut joined = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => joined += 1,
            Err(e) => {
                let message = e.to_string();
                assert!(
                    message == Error::AtCapacity.to_string()
                        || message == Error::AlreadyAttending.to_string(),
                    "unexpected error: {message}"
                );
            }
        }
    }

    let stored = store.get_event(&created.id).await.unwrap().unwrap();
    let unique: HashSet<&String> = stored.attendees.iter().collect();
    assert_eq!(joined, LIMIT as usize);
    assert_eq!(stored.attendees.len(), LIMIT as usize);
    assert_eq!(unique.len(), stored.attendees.len());
}

/// Concurrent leaves of the same user succeed exactly once.
async fn atomic_leave_is_exclusive(store: Arc<dyn EventStore>) {
    let created = store.create_event(event(None)).await.unwrap();
    store.attend_event(&created.id, "user-a").await.unwrap();
    store.attend_event(&created.id, "user-b").await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let id = created.id.clone();
        tasks.push(tokio::spawn(async move { store.leave_event(&id, "user-a").await }));
    }

    let mut left = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            left += 1;
        }
    }

    let stored = store.get_event(&created.id).await.unwrap().unwrap();
    assert_eq!(left, 1);
    assert_eq!(stored.attendees, vec!["user-b".to_string()]);
}

/// Joins racing admin edits all survive in the stored attendees.
async fn edit_keeps_concurrent_joins(store: Arc<dyn EventStore>) {
    const USERS: usize = 20;

    let created = store.create_event(event(None)).await.unwrap();

    let mut joins = Vec::new();
    let mut edits = Vec::new();
    for i in 0..USERS {
        let join_store = store.clone();
        let id = created.id.clone();
        joins.push(tokio::spawn(async move {
            join_store.attend_event(&id, &format!("user-{i}")).await
        }));

        if i % 2 == 0 {
            let store = store.clone();
            let id = created.id.clone();
            let draft = EventDraft {
                title: format!("Cars on Sunday #{i}"),
                description: created.description.clone(),
                date: created.date,
                location: created.location.clone(),
                attendee_limit: None,
            };
            edits.push(tokio::spawn(async move { store.edit_event(&id, draft).await }));
        }
    }

    for task in joins {
        task.await.unwrap().unwrap();
    }
    for task in edits {
        task.await.unwrap().unwrap();
    }

    let stored = store.get_event(&created.id).await.unwrap().unwrap();
    let attendees: HashSet<_> = stored.attendees.iter().cloned().collect();
    assert_eq!(attendees.len(), USERS);
    for i in 0..USERS {
        assert!(attendees.contains(&format!("user-{i}")));
    }
    assert!(stored.title.starts_with("Cars on Sunday #"));
}

// =============================================================================
// Document Store
// =============================================================================

#[tokio::test]
async fn document_store_naive_join_loses_update() {
    naive_join_loses_update(Arc::new(DocumentStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn document_store_atomic_join_respects_limit() {
    atomic_join_respects_limit(Arc::new(DocumentStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn document_store_atomic_leave_is_exclusive() {
    atomic_leave_is_exclusive(Arc::new(DocumentStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn document_store_edit_keeps_concurrent_joins() {
    edit_keeps_concurrent_joins(Arc::new(DocumentStore::new())).await;
}

// =============================================================================
// Local Store
// =============================================================================

async fn local_store(dir: &tempfile::TempDir) -> Arc<dyn EventStore> {
    Arc::new(
        LocalStore::open(dir.path(), CorruptDataPolicy::default())
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn local_store_naive_join_loses_update() {
    let dir = tempfile::tempdir().unwrap();
    naive_join_loses_update(local_store(&dir).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_store_atomic_join_respects_limit() {
    let dir = tempfile::tempdir().unwrap();
    atomic_join_respects_limit(local_store(&dir).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_store_atomic_leave_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    atomic_leave_is_exclusive(local_store(&dir).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_store_edit_keeps_concurrent_joins() {
    let dir = tempfile::tempdir().unwrap();
    edit_keeps_concurrent_joins(local_store(&dir).await).await;
}
