//! Startup recovery and shutdown coordination.

use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::types::{Event, JobStatus, Stage};

use super::Pipeline;

/// Statuses a job can only hold while a continuation is in flight
const IN_FLIGHT: [JobStatus; 4] = [
    JobStatus::Queued,
    JobStatus::Fetching,
    JobStatus::Processing,
    JobStatus::Uploading,
];

impl Pipeline {
    /// Gracefully shut down the pipeline
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new jobs
    /// 2. Drains the executor, cancelling outstanding tasks once
    ///    `executor.shutdown_grace` elapses
    /// 3. Stops the fault supervisor
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Jobs whose tasks were cancelled end up FAILED with code `cancelled`.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        let grace = self.config.executor.shutdown_grace;
        if self.executor.shutdown(grace).await {
            tracing::info!("All in-flight tasks completed gracefully");
        } else {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Outstanding tasks were cancelled after the grace period"
            );
        }

        self.supervisor.cancel();
        self.store.emit(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Fail jobs a previous process left mid-pipeline
    ///
    /// Continuations live only in memory, so a job persisted in an in-flight
    /// status with no running process behind it can never advance. Such jobs
    /// are marked FAILED with code `interrupted`; nothing is retried.
    pub(crate) async fn recover_interrupted(&self) -> Result<usize> {
        let stranded = self.store.db().list_jobs_by_status(&IN_FLIGHT).await?;
        if stranded.is_empty() {
            tracing::debug!("No interrupted jobs to recover");
            return Ok(0);
        }

        for job in &stranded {
            let stage = match job.status {
                JobStatus::Uploading => Stage::Uploading,
                _ => Stage::Fetching,
            };
            tracing::debug!(job_id = %job.id, status = %job.status, "Failing interrupted job");
            self.stages
                .fail_job(job.id, Some(stage), &Error::Interrupted(job.id.to_string()))
                .await?;
        }

        tracing::warn!(
            count = stranded.len(),
            "Marked {} interrupted job(s) as failed",
            stranded.len()
        );
        Ok(stranded.len())
    }
}
