//! Job persistence plus the events that accompany every status change.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::model::JobRecord;
use crate::types::{Event, JobId, JobStatus};

/// Loads and saves jobs on behalf of the pipeline stages
#[derive(Clone)]
pub struct JobStore {
    db: Arc<Database>,
    events: broadcast::Sender<Event>,
}

impl JobStore {
    /// Wrap a database and an event channel
    pub fn new(db: Arc<Database>, events: broadcast::Sender<Event>) -> Self {
        Self { db, events }
    }

    /// The underlying database
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: Event) {
        self.events.send(event).ok();
    }

    /// New receiver on the event channel
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Load the latest persisted snapshot of a job
    pub async fn load(&self, id: JobId) -> Result<JobRecord> {
        self.db
            .load_job(id)
            .await?
            .ok_or_else(|| Error::not_found("job", id.to_string()))
    }

    /// Persist a snapshot; `false` if the store refused it as stale
    pub async fn save(&self, job: &JobRecord) -> Result<bool> {
        self.db.save_job(job).await
    }

    /// Move a job to `next`, persist it and announce the change
    ///
    /// Returns `false` without writing anything when the monotonic rule
    /// forbids the move (including when the job already has that status).
    pub async fn advance(&self, job: &mut JobRecord, next: JobStatus) -> Result<bool> {
        let from = job.status;
        if !job.advance(next) {
            return Ok(false);
        }

        if !self.save(job).await? {
            tracing::warn!(
                job_id = %job.id,
                from = %from,
                to = %next,
                "status change refused by the job store, a newer snapshot exists"
            );
            return Ok(false);
        }

        tracing::info!(job_id = %job.id, from = %from, to = %next, "job status changed");
        self.emit(Event::StatusChanged {
            id: job.id,
            from,
            to: next,
        });
        Ok(true)
    }
}
