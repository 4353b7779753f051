//! Shared test helpers for building pipelines with scripted collaborators.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

use crate::config::Config;
use crate::db::Database;
use crate::destinations::{Destination, DestinationResolver, DestinationWriter};
use crate::error::{Error, Result};
use crate::fetch::{
    EXT_PLACEHOLDER, EngineStatus, FetchEngine, FetchHooks, FetchOptions, OUTPUT_TEMPLATE_KEY,
    ProgressUpdate,
};
use crate::model::JobRecord;
use crate::types::JobId;

use super::Pipeline;

/// Profile every test pipeline is seeded with
pub(crate) const PROFILE: &str = "default";

/// What a [`ScriptedEngine`] does once its progress script has played
#[derive(Clone, Debug)]
pub(crate) enum Finish {
    /// Write a small file at the output template and report its path
    WriteFile,
    /// Report an info document without a file path
    NoFile,
    /// Fail the fetch with an external tool error
    Fail(String),
    /// Never finish
    Stall,
}

/// Fetch engine that replays a progress script
pub(crate) struct ScriptedEngine {
    statuses: Vec<&'static str>,
    finish: Finish,
}

impl ScriptedEngine {
    /// `downloading`, `finished`, then a file on disk
    pub(crate) fn downloads() -> Self {
        Self::new(vec!["downloading", "finished"], Finish::WriteFile)
    }

    pub(crate) fn new(statuses: Vec<&'static str>, finish: Finish) -> Self {
        Self { statuses, finish }
    }
}

#[async_trait]
impl FetchEngine for ScriptedEngine {
    async fn fetch(&self, url: &str, options: &FetchOptions, hooks: &dyn FetchHooks) -> Result<()> {
        for status in &self.statuses {
            hooks
                .on_progress(ProgressUpdate::status_only(EngineStatus::parse(status)))
                .await?;
        }

        let mut raw = Map::new();
        raw.insert("webpage_url".to_string(), json!(url));
        raw.insert("title".to_string(), json!("clip"));

        match &self.finish {
            Finish::WriteFile => {
                let template = options[OUTPUT_TEMPLATE_KEY].as_str().unwrap();
                let path = PathBuf::from(template.replace(EXT_PLACEHOLDER, "mp4"));
                tokio::fs::write(&path, b"media").await?;
                raw.insert("filepath".to_string(), json!(path.to_string_lossy()));
            }
            Finish::NoFile => {}
            Finish::Fail(message) => return Err(Error::ExternalTool(message.clone())),
            Finish::Stall => std::future::pending::<()>().await,
        }

        hooks.on_finished(raw).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// In-memory destination recording the files written to it
#[derive(Default)]
pub(crate) struct MemoryDestination {
    files: Arc<Mutex<Vec<String>>>,
    fail_write: bool,
}

impl MemoryDestination {
    pub(crate) fn failing() -> Self {
        Self {
            fail_write: true,
            ..Self::default()
        }
    }

    pub(crate) fn written(&self) -> Vec<String> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn open(&self) -> Result<Box<dyn DestinationWriter>> {
        Ok(Box::new(MemoryWriter {
            pending: Vec::new(),
            fail_write: self.fail_write,
            sink: Arc::clone(&self.files),
        }))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

struct MemoryWriter {
    pending: Vec<String>,
    fail_write: bool,
    sink: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DestinationWriter for MemoryWriter {
    async fn write_file(&mut self, name: &str, source: &Path) -> Result<u64> {
        if self.fail_write {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        let bytes = tokio::fs::metadata(source).await?.len();
        self.pending.push(name.to_string());
        Ok(bytes)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Writes only become visible once the handle is released
        self.sink.lock().unwrap().extend(self.pending);
        Ok(())
    }
}

/// Resolver over a fixed set of in-memory destinations
#[derive(Default)]
pub(crate) struct MemoryResolver {
    destinations: HashMap<String, Arc<MemoryDestination>>,
}

impl MemoryResolver {
    pub(crate) fn with(mut self, name: &str, destination: MemoryDestination) -> Self {
        self.destinations
            .insert(name.to_string(), Arc::new(destination));
        self
    }

    pub(crate) fn get(&self, name: &str) -> Arc<MemoryDestination> {
        Arc::clone(&self.destinations[name])
    }
}

#[async_trait]
impl DestinationResolver for MemoryResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Destination>> {
        self.destinations
            .get(name)
            .map(|destination| Arc::clone(destination) as Arc<dyn Destination>)
            .ok_or_else(|| Error::not_found("destination", name))
    }
}

/// Configuration rooted in `dir`
pub(crate) fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.path().join("test.db");
    config.fetch.download_dir = dir.path().join("downloads");
    config.executor.workers = 2;
    config.executor.shutdown_grace = Duration::from_millis(200);
    config
}

/// Helper to create a test pipeline with a persistent database.
/// Returns the pipeline and the tempdir (which must be kept alive).
pub(crate) async fn create_test_pipeline(
    engine: ScriptedEngine,
    resolver: Arc<MemoryResolver>,
) -> (Pipeline, TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(&temp_dir);

    let db = Arc::new(
        Database::new(&config.persistence.database_path)
            .await
            .unwrap(),
    );
    let options = json!({"format": "best"});
    db.insert_profile(PROFILE, options.as_object().unwrap())
        .await
        .unwrap();

    let pipeline = Pipeline::with_collaborators(config, db, Arc::new(engine), resolver)
        .await
        .unwrap();
    (pipeline, temp_dir)
}

/// Poll until the job reaches COMPLETED or FAILED
pub(crate) async fn wait_for_terminal(pipeline: &Pipeline, id: JobId) -> JobRecord {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = pipeline.get_job(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not reach a terminal status")
}

/// `meta` as plain JSON
pub(crate) fn meta_json(job: &JobRecord) -> Value {
    serde_json::to_value(&job.meta).unwrap()
}
