//! Job-aware wrapper around a fetch engine.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{JobRecord, NormalizedInfo, ProfileRecord, RawInfo, normalize};
use crate::pipeline::JobStore;
use crate::types::{JobId, JobStatus};

use super::{EXT_PLACEHOLDER, FetchEngine, FetchHooks, FetchOptions, OUTPUT_TEMPLATE_KEY, ProgressUpdate};

/// Runs a fetch for one job and keeps the job record in step with the engine
#[derive(Clone)]
pub struct FetchAdapter {
    store: JobStore,
    engine: Arc<dyn FetchEngine>,
    download_dir: PathBuf,
}

impl FetchAdapter {
    /// Create an adapter writing into `download_dir`
    pub fn new(store: JobStore, engine: Arc<dyn FetchEngine>, download_dir: PathBuf) -> Self {
        Self {
            store,
            engine,
            download_dir,
        }
    }

    /// Engine name
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Profile options with the pipeline overrides applied last
    pub fn options_for(&self, job_id: JobId, profile: &ProfileRecord) -> FetchOptions {
        let mut options = profile.options.clone();
        let template = self
            .download_dir
            .join(format!("{}.{}", job_id, EXT_PLACEHOLDER));
        options.insert(
            OUTPUT_TEMPLATE_KEY.to_string(),
            Value::String(template.to_string_lossy().into_owned()),
        );
        options
    }

    /// Fetch the job's URL and return the normalized info document
    ///
    /// Moves the job to FETCHING first, then lets engine progress drive it.
    pub async fn run(&self, job_id: JobId, profile: ProfileRecord) -> Result<NormalizedInfo> {
        let mut job = self.store.load(job_id).await?;
        self.store.advance(&mut job, JobStatus::Fetching).await?;

        let url = job.meta.url.clone();
        let options = self.options_for(job_id, &profile);

        tracing::info!(
            job_id = %job_id,
            url = %url,
            profile = %profile.name,
            engine = self.engine.name(),
            "starting fetch"
        );

        let hooks = JobHooks {
            store: &self.store,
            job: Mutex::new(job),
        };

        self.engine.fetch(&url, &options, &hooks).await?;

        let job = hooks.job.into_inner();
        job.meta.info.ok_or_else(|| {
            Error::Execution(format!(
                "{} finished without producing an info document",
                self.engine.name()
            ))
        })
    }
}

struct JobHooks<'a> {
    store: &'a JobStore,
    job: Mutex<JobRecord>,
}

#[async_trait]
impl FetchHooks for JobHooks<'_> {
    async fn on_progress(&self, update: ProgressUpdate) -> Result<()> {
        let Some(next) = update.status.job_status() else {
            tracing::trace!(status = update.status.as_str(), "ignoring engine status");
            return Ok(());
        };

        let mut job = self.job.lock().await;
        if job.status == next {
            return Ok(());
        }
        if !job.status.can_advance_to(next) {
            tracing::debug!(
                job_id = %job.id,
                current = %job.status,
                reported = update.status.as_str(),
                "suppressing backward progress report"
            );
            return Ok(());
        }

        tracing::debug!(job_id = %job.id, status = update.status.as_str(), "engine progress");
        job.meta.set_extractor(Value::Object(update.raw));
        self.store.advance(&mut job, next).await?;
        Ok(())
    }

    async fn on_finished(&self, raw: RawInfo) -> Result<NormalizedInfo> {
        let info = normalize(&raw);

        let mut job = self.job.lock().await;
        job.meta.set_info(info.clone());
        self.store.save(&job).await?;

        tracing::debug!(
            job_id = %job.id,
            filename = info.downloaded.filename.as_deref().unwrap_or("<none>"),
            "engine produced info document"
        );
        Ok(info)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::fetch::EngineStatus;
    use crate::model::NewJob;
    use crate::types::Event;
    use serde_json::{Map, json};
    use tempfile::NamedTempFile;
    use tokio::sync::broadcast;

    /// Engine that replays a fixed list of progress statuses
    struct Replay {
        statuses: Vec<&'static str>,
        info: Option<Value>,
    }

    #[async_trait]
    impl FetchEngine for Replay {
        async fn fetch(&self, _url: &str, _options: &FetchOptions, hooks: &dyn FetchHooks) -> Result<()> {
            for status in &self.statuses {
                hooks
                    .on_progress(ProgressUpdate::status_only(EngineStatus::parse(status)))
                    .await?;
            }
            if let Some(info) = &self.info {
                hooks.on_finished(info.as_object().cloned().unwrap()).await?;
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "replay"
        }
    }

    async fn setup(engine: Replay) -> (FetchAdapter, JobStore, JobId, broadcast::Receiver<Event>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
        let (tx, rx) = broadcast::channel(64);
        let store = JobStore::new(db, tx);

        let job = JobRecord::new(NewJob {
            url: "https://example.com/v".into(),
            profile: "best".into(),
            destinations: None,
        });
        store.save(&job).await.unwrap();

        let adapter = FetchAdapter::new(store.clone(), Arc::new(engine), PathBuf::from("/dl"));
        (adapter, store, job.id, rx, temp_file)
    }

    fn profile() -> ProfileRecord {
        ProfileRecord {
            id: 1,
            name: "best".into(),
            options: json!({"format": "best", "outtmpl": "ignored"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn observed_statuses(rx: &mut broadcast::Receiver<Event>) -> Vec<JobStatus> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::StatusChanged { to, .. } = event {
                seen.push(to);
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_finished_is_remapped_to_processing() {
        let (adapter, store, id, mut rx, _db) = setup(Replay {
            statuses: vec!["downloading", "downloading", "finished"],
            info: Some(json!({"filepath": "/dl/x.mp4"})),
        })
        .await;

        let info = adapter.run(id, profile()).await.unwrap();
        assert_eq!(info.downloaded.filename.as_deref(), Some("/dl/x.mp4"));

        assert_eq!(
            observed_statuses(&mut rx),
            vec![JobStatus::Fetching, JobStatus::Processing]
        );

        let job = store.load(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.meta.extractor, Some(json!({"status": "finished"})));
        assert_eq!(job.meta.downloaded_filename(), Some("/dl/x.mp4"));
    }

    #[tokio::test]
    async fn test_backward_progress_is_suppressed() {
        let (adapter, store, id, mut rx, _db) = setup(Replay {
            statuses: vec!["downloading", "finished", "downloading", "finished"],
            info: Some(json!({})),
        })
        .await;

        adapter.run(id, profile()).await.unwrap();

        assert_eq!(
            observed_statuses(&mut rx),
            vec![JobStatus::Fetching, JobStatus::Processing]
        );
        assert_eq!(store.load(id).await.unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_unknown_engine_statuses_change_nothing() {
        let (adapter, store, id, _rx, _db) = setup(Replay {
            statuses: vec!["error", "postprocessing"],
            info: Some(json!({})),
        })
        .await;

        adapter.run(id, profile()).await.unwrap();

        let job = store.load(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Fetching);
        assert!(job.meta.extractor.is_none());
    }

    #[tokio::test]
    async fn test_engine_that_never_finishes_is_an_execution_error() {
        let (adapter, _store, id, _rx, _db) = setup(Replay {
            statuses: vec!["downloading"],
            info: None,
        })
        .await;

        assert!(matches!(
            adapter.run(id, profile()).await,
            Err(Error::Execution(_))
        ));
    }

    #[tokio::test]
    async fn test_output_template_overrides_profile() {
        let (adapter, _store, id, _rx, _db) = setup(Replay {
            statuses: vec![],
            info: None,
        })
        .await;

        let options = adapter.options_for(id, &profile());
        assert_eq!(options["format"], "best");
        assert_eq!(
            options[OUTPUT_TEMPLATE_KEY],
            format!("/dl/{}.%(ext)s", id)
        );

        let bare = ProfileRecord {
            options: Map::new(),
            ..profile()
        };
        assert_eq!(adapter.options_for(id, &bare).len(), 1);
    }
}
