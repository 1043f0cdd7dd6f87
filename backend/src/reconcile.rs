//! Event status reconciliation.
//!
//! Upcoming events whose start is more than the grace window in the past
//! are moved to COMPLETED. Runs on every full list read and periodically
//! from [`Reconciler`].

use crate::clock::Clock;
use crate::repository::{EventRepository, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use noticeboard_core::{Event, EventStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Complete overdue events and return the fresh list with the number of
/// events changed.
///
/// A failed write is logged and skipped; the event is retried on the next
/// pass. The list is reloaded at most once, only if something changed.
pub async fn reconcile_events(
    repo: &EventRepository,
    now: NaiveDateTime,
) -> RepositoryResult<(Vec<Event>, usize)> {
    let events = repo.list_events().await?;

    let mut completed = 0;
    let mut stale = false;
    for event in events.iter().filter(|e| e.should_complete(now)) {
        match repo.transition_event(&event.id, EventStatus::Completed).await {
            Ok(_) => {
                debug!(event_id = %event.id, "Marked event completed");
                completed += 1;
            }
            // Cancelled, completed or deleted by another writer since the read
            Err(RepositoryError::Rejected(_) | RepositoryError::NotFound(_)) => {
                debug!(event_id = %event.id, "Event changed before completion");
                stale = true;
            }
            Err(e) => warn!(event_id = %event.id, error = %e, "Failed to complete event"),
        }
    }

    if completed == 0 && !stale {
        return Ok((events, 0));
    }
    Ok((repo.list_events().await?, completed))
}

/// Periodic reconciliation sweep
pub struct Reconciler {
    repo: EventRepository,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(repo: EventRepository, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            repo,
            clock,
            interval,
        }
    }

    /// Start the background sweep
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            info!(
                interval_secs = worker.interval.as_secs(),
                "Started reconciliation worker"
            );

            let mut ticker = tokio::time::interval(worker.interval);
            loop {
                ticker.tick().await;
                worker.sweep().await;
            }
        })
    }

    /// One pass over the active store. Returns the number of events completed.
    pub async fn sweep(&self) -> usize {
        match reconcile_events(&self.repo, self.clock.now()).await {
            Ok((_, 0)) => 0,
            Ok((_, completed)) => {
                info!(completed, "Completed past events");
                completed
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation sweep failed");
                0
            }
        }
    }
}
