//! Upload fan-out: one upload task per destination, joined by a barrier.

use serde_json::Value;
use std::sync::Arc;

use crate::destinations::{DestinationResolver, upload_to_destination};
use crate::error::{Error, Result};
use crate::executor::{Executor, TaskOutcome};
use crate::model::{JobRecord, UploadRecord, UploadResults};
use crate::types::Event;

use super::store::JobStore;

/// Distributes a fetched file to every destination of a job
#[derive(Clone)]
pub struct UploadFanOut {
    executor: Executor,
    store: JobStore,
    resolver: Arc<dyn DestinationResolver>,
}

impl UploadFanOut {
    /// Create a fan-out over `resolver`
    pub fn new(executor: Executor, store: JobStore, resolver: Arc<dyn DestinationResolver>) -> Self {
        Self {
            executor,
            store,
            resolver,
        }
    }

    /// Upload the job's file everywhere and aggregate per-destination results
    ///
    /// Fails before dispatching anything if the job has no downloaded file.
    /// Individual upload failures never fail the fan-out; they are recorded
    /// in that destination's entry.
    pub async fn run(&self, job: JobRecord) -> Result<UploadResults> {
        let filename = job
            .meta
            .downloaded_filename()
            .ok_or_else(|| {
                Error::Validation(format!("job {} has no downloaded filename to upload", job.id))
            })?
            .to_string();

        let destinations = job.meta.destinations().to_vec();
        tracing::info!(
            job_id = %job.id,
            filename = %filename,
            destinations = destinations.len(),
            "starting upload fan-out"
        );

        let handles: Vec<_> = destinations
            .iter()
            .map(|name| {
                let resolver = Arc::clone(&self.resolver);
                let filename = filename.clone();
                let name = name.clone();
                self.executor
                    .submit(format!("upload:{}", name), async move {
                        upload_to_destination(resolver.as_ref(), &filename, &name).await
                    })
            })
            .collect();

        let outcomes = self.executor.join_all(&handles).await;

        let mut results = UploadResults::new();
        for (name, outcome) in destinations.into_iter().zip(outcomes) {
            let record = upload_record(&outcome);
            if let Some(error) = &record.error {
                tracing::warn!(job_id = %job.id, destination = %name, error = %error, "upload failed");
            }

            self.store.emit(Event::UploadFinished {
                id: job.id,
                destination: name.clone(),
                success: outcome.is_success(),
            });
            results.insert(name, record);
        }

        Ok(results)
    }
}

/// Result record for one destination
///
/// `error` and `result` come from two independent checks, so an outcome that
/// carries both a value and an error yields a record with both keys.
pub fn upload_record(outcome: &TaskOutcome<Value>) -> UploadRecord {
    let mut record = UploadRecord::default();
    if let Some(error) = outcome.raised() {
        record.error = Some(error.to_string());
    }
    if let Some(value) = &outcome.value {
        record.result = Some(value.clone());
    }
    record
}
