//! Job pipeline split into focused submodules.
//!
//! The [`Pipeline`] facade is the trigger boundary: it validates and persists a
//! new job, then hands it to the stage controller and returns immediately.
//! Everything after that is driven by task completion callbacks:
//! - [`stage`] - stage continuations and status transitions
//! - [`upload`] - per-destination upload fan-out and fan-in
//! - [`store`] - job persistence plus the accompanying events
//! - [`supervisor`] - republishes unhandled callback faults as events
//! - [`lifecycle`] - startup recovery and graceful shutdown

mod lifecycle;
mod stage;
mod store;
mod supervisor;
mod upload;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use stage::{StageController, StageOutput};
pub use store::JobStore;
pub use upload::{UploadFanOut, upload_record};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::destinations::{DatabaseDestinationResolver, DestinationResolver};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fetch::{FetchAdapter, FetchEngine, select_engine};
use crate::model::{JobRecord, NewJob};
use crate::types::{Event, JobId};

/// Fetch-and-distribute pipeline (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Pipeline {
    /// Configuration the pipeline was built with
    pub(crate) config: Arc<Config>,
    /// Job persistence and event channel
    pub(crate) store: JobStore,
    /// Worker pool shared by every stage
    pub(crate) executor: Executor,
    /// Stage continuations
    pub(crate) stages: StageController,
    /// Whether new jobs are accepted (cleared during shutdown)
    pub(crate) accepting: Arc<AtomicBool>,
    /// Stops the fault supervisor
    pub(crate) supervisor: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline from configuration
    ///
    /// This initializes all core components:
    /// - Opens/creates the SQLite database and runs migrations
    /// - Chooses the fetch engine (`fetch.engine`)
    /// - Resolves destinations from the database
    /// - Starts the fault supervisor and recovers interrupted jobs
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let engine = select_engine(&config.fetch)?;
        let resolver: Arc<dyn DestinationResolver> = Arc::new(DatabaseDestinationResolver::new(
            Arc::clone(&db),
            config.destinations.file_collision,
        ));

        Self::with_collaborators(config, db, engine, resolver).await
    }

    /// Create a pipeline with explicitly supplied collaborators
    pub async fn with_collaborators(
        config: Config,
        db: Arc<Database>,
        engine: Arc<dyn FetchEngine>,
        resolver: Arc<dyn DestinationResolver>,
    ) -> Result<Self> {
        config.validate()?;

        let download_dir = config.download_dir().clone();
        tokio::fs::create_dir_all(&download_dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create download directory '{}': {}",
                    download_dir.display(),
                    e
                ),
            ))
        })?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);
        let store = JobStore::new(db, event_tx);
        let executor = Executor::new(&config.executor);
        let fetcher = FetchAdapter::new(store.clone(), engine, download_dir);

        tracing::info!(
            workers = executor.workers(),
            engine = fetcher.engine_name(),
            "pipeline initialized"
        );

        let stages = StageController::new(executor.clone(), store.clone(), fetcher, resolver);
        let supervisor = CancellationToken::new();
        supervisor::spawn(executor.subscribe_faults(), store.clone(), supervisor.clone());

        let pipeline = Self {
            config: Arc::new(config),
            store,
            executor,
            stages,
            accepting: Arc::new(AtomicBool::new(true)),
            supervisor,
        };

        pipeline.recover_interrupted().await?;
        Ok(pipeline)
    }

    /// Submit a job
    ///
    /// Persists the job as QUEUED, starts the fetch stage and returns the
    /// queued snapshot without waiting for any stage to run.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`Pipeline::shutdown`] has begun
    /// - [`Error::Validation`] if the URL is empty
    /// - [`Error::NotFound`] if the profile is not registered
    pub async fn create_job(&self, request: NewJob) -> Result<JobRecord> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if request.url.trim().is_empty() {
            return Err(Error::Validation("job url must not be empty".to_string()));
        }

        let profile = self
            .store
            .db()
            .get_profile_by_name(&request.profile)
            .await?
            .ok_or_else(|| Error::not_found("profile", request.profile.as_str()))?;

        let job = JobRecord::new(request);
        self.store.save(&job).await?;

        tracing::info!(
            job_id = %job.id,
            url = %job.meta.url,
            profile = %profile.name,
            destinations = job.meta.destinations().len(),
            "job queued"
        );
        self.store.emit(Event::Queued {
            id: job.id,
            url: job.meta.url.clone(),
        });

        self.stages.begin_fetch(job.id, profile);
        Ok(job)
    }

    /// Latest persisted snapshot of a job
    pub async fn get_job(&self, id: JobId) -> Result<JobRecord> {
        self.store.load(id).await
    }

    /// Subscribe to pipeline events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently; one that falls more than `event_buffer` events behind
    /// receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.store.subscribe()
    }

    /// The database backing the pipeline
    pub fn db(&self) -> &Arc<Database> {
        self.store.db()
    }

    /// The worker pool
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The configuration the pipeline was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}
