//! Stage controller: moves a job between stages from task completion callbacks.
//!
//! There is no scheduler loop. Each stage is submitted to the executor with a
//! continuation attached, and that continuation decides what happens next:
//!
//! ```text
//! QUEUED -> FETCHING -> PROCESSING -> UPLOADING -> COMPLETED
//!                                 \-------------> COMPLETED   (no destinations)
//! any in-flight stage -------------------------> FAILED
//! ```

use std::sync::Arc;

use crate::destinations::DestinationResolver;
use crate::error::{Error, Result};
use crate::executor::{Executor, TaskHandle, TaskOutcome};
use crate::fetch::FetchAdapter;
use crate::model::{JobFailure, JobMeta, JobRecord, NormalizedInfo, ProfileRecord, UploadResults};
use crate::types::{Event, JobId, JobStatus, Stage};

use super::store::JobStore;
use super::upload::UploadFanOut;

/// A stage's result value and where it lives in the job metadata
pub trait StageOutput: Clone + Send + Sync + 'static {
    /// Shallow-merge the value into `meta` under its key
    fn merge_into(self, meta: &mut JobMeta);
}

impl StageOutput for NormalizedInfo {
    fn merge_into(self, meta: &mut JobMeta) {
        meta.set_info(self);
    }
}

impl StageOutput for UploadResults {
    fn merge_into(self, meta: &mut JobMeta) {
        meta.set_result(self);
    }
}

/// Submits stages and handles their completion
#[derive(Clone)]
pub struct StageController {
    executor: Executor,
    store: JobStore,
    fetcher: FetchAdapter,
    uploader: UploadFanOut,
}

impl StageController {
    /// Wire a controller to its collaborators
    pub fn new(
        executor: Executor,
        store: JobStore,
        fetcher: FetchAdapter,
        resolver: Arc<dyn DestinationResolver>,
    ) -> Self {
        let uploader = UploadFanOut::new(executor.clone(), store.clone(), resolver);
        Self {
            executor,
            store,
            fetcher,
            uploader,
        }
    }

    /// Submit the fetch stage for a job; returns without waiting
    pub fn begin_fetch(&self, job_id: JobId, profile: ProfileRecord) -> TaskHandle<NormalizedInfo> {
        let fetcher = self.fetcher.clone();
        let handle = self
            .executor
            .submit(format!("fetch:{}", job_id), async move {
                fetcher.run(job_id, profile).await
            });

        self.continue_with(&handle, job_id, Stage::Fetching);
        handle
    }

    /// Persist UPLOADING, then submit the upload fan-out for a job
    ///
    /// The status write completes before any upload work is submitted, so a
    /// reader never sees a job mid-upload with a stale status.
    pub async fn begin_upload(&self, mut job: JobRecord) -> Result<TaskHandle<UploadResults>> {
        self.store.advance(&mut job, JobStatus::Uploading).await?;

        let job_id = job.id;
        let uploader = self.uploader.clone();
        let handle = self
            .executor
            .submit(format!("upload-fanout:{}", job_id), async move {
                uploader.run(job).await
            });

        self.continue_with(&handle, job_id, Stage::Uploading);
        Ok(handle)
    }

    fn continue_with<T: StageOutput>(&self, handle: &TaskHandle<T>, job_id: JobId, stage: Stage) {
        let controller = self.clone();
        handle.on_complete(move |finished: TaskHandle<T>| async move {
            let outcome = finished.outcome().ok_or_else(|| {
                Error::Execution(format!("{} completed without an outcome", finished.name()))
            })?;
            controller.on_stage_complete(job_id, stage, outcome).await
        });
    }

    /// Continuation shared by every stage
    ///
    /// Errors raised while advancing are caught here and recorded as a
    /// failed job. Only a failure to record that failure is returned.
    pub async fn on_stage_complete<T: StageOutput>(
        &self,
        job_id: JobId,
        stage: Stage,
        outcome: TaskOutcome<T>,
    ) -> Result<()> {
        match self.advance_stage(job_id, stage, outcome).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::error!(job_id = %job_id, stage = %stage, error = %error, "stage continuation failed");
                self.fail_job(job_id, Some(stage), &error).await
            }
        }
    }

    async fn advance_stage<T: StageOutput>(
        &self,
        job_id: JobId,
        stage: Stage,
        outcome: TaskOutcome<T>,
    ) -> Result<()> {
        let mut job = self.store.load(job_id).await?;
        if job.status.is_terminal() {
            tracing::debug!(job_id = %job_id, stage = %stage, status = %job.status, "job already terminal");
            return Ok(());
        }

        if let Some(error) = outcome.raised() {
            return self.fail_with(&mut job, Some(stage), error).await;
        }
        if outcome.cancelled {
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| Arc::new(Error::Cancelled(format!("{}:{}", stage, job_id))));
            return self.fail_with(&mut job, Some(stage), &error).await;
        }

        if let Some(value) = outcome.value {
            value.merge_into(&mut job.meta);
            self.store.save(&job).await?;
        }

        match stage {
            Stage::Fetching if !job.meta.destinations().is_empty() => {
                self.begin_upload(job).await?;
                Ok(())
            }
            Stage::Fetching | Stage::Uploading => self.complete(job).await,
        }
    }

    async fn complete(&self, mut job: JobRecord) -> Result<()> {
        if self.store.advance(&mut job, JobStatus::Completed).await? {
            self.store.emit(Event::Completed { id: job.id });
        }
        Ok(())
    }

    /// Mark a job FAILED with `error` recorded in its metadata
    pub async fn fail_job(&self, job_id: JobId, stage: Option<Stage>, error: &Error) -> Result<()> {
        let mut job = self.store.load(job_id).await?;
        self.fail_with(&mut job, stage, error).await
    }

    async fn fail_with(&self, job: &mut JobRecord, stage: Option<Stage>, error: &Error) -> Result<()> {
        if job.status.is_terminal() {
            return Ok(());
        }

        tracing::error!(
            job_id = %job.id,
            stage = ?stage,
            code = error.error_code(),
            error = %error,
            "job failed"
        );

        job.meta.set_error(JobFailure::from_error(stage, error));
        if self.store.advance(job, JobStatus::Failed).await? {
            self.store.emit(Event::Failed {
                id: job.id,
                stage,
                error: error.to_string(),
            });
        }
        Ok(())
    }
}
