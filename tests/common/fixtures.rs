//! Scripted collaborators and pipeline construction for integration tests

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tubedl::fetch::{
    EXT_PLACEHOLDER, EngineStatus, FetchOptions, OUTPUT_TEMPLATE_KEY, ProgressUpdate,
};
use tubedl::{
    Config, Database, Destination, DestinationResolver, DestinationWriter, Error, FetchEngine,
    FetchHooks, NewJob, Pipeline, Result,
};

/// Profile name every fixture database carries
pub const PROFILE: &str = "default";

/// Fetch engine that plays back a list of engine statuses, then writes a file
pub struct ScriptedEngine {
    pub statuses: Vec<&'static str>,
    /// Extra raw info fields handed to `on_finished`
    pub info: Map<String, Value>,
    /// Options each fetch was called with
    pub seen_options: Mutex<Vec<FetchOptions>>,
}

impl ScriptedEngine {
    pub fn new(statuses: Vec<&'static str>) -> Self {
        Self {
            statuses,
            info: Map::new(),
            seen_options: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FetchEngine for ScriptedEngine {
    async fn fetch(&self, url: &str, options: &FetchOptions, hooks: &dyn FetchHooks) -> Result<()> {
        self.seen_options.lock().unwrap().push(options.clone());

        for status in &self.statuses {
            let mut raw = Map::new();
            raw.insert("status".to_string(), json!(status));
            raw.insert("url".to_string(), json!(url));
            let update = ProgressUpdate {
                status: EngineStatus::parse(status),
                raw,
            };
            hooks.on_progress(update).await?;
        }

        let template = options[OUTPUT_TEMPLATE_KEY].as_str().unwrap();
        let path = PathBuf::from(template.replace(EXT_PLACEHOLDER, "webm"));
        tokio::fs::write(&path, b"scripted media").await?;

        let mut raw = self.info.clone();
        raw.insert("filepath".to_string(), json!(path.to_string_lossy()));
        raw.insert("webpage_url".to_string(), json!(url));
        hooks.on_finished(raw).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Destination that records uploaded file names
#[derive(Default)]
pub struct RecordingDestination {
    pub uploads: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Destination for RecordingDestination {
    async fn open(&self) -> Result<Box<dyn DestinationWriter>> {
        Ok(Box::new(RecordingWriter {
            uploads: Arc::clone(&self.uploads),
        }))
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

struct RecordingWriter {
    uploads: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DestinationWriter for RecordingWriter {
    async fn write_file(&mut self, name: &str, source: &Path) -> Result<u64> {
        let bytes = tokio::fs::metadata(source).await?.len();
        self.uploads.lock().unwrap().push(name.to_string());
        Ok(bytes)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Resolver over named recording destinations; unknown names are not found
#[derive(Default)]
pub struct RecordingResolver {
    pub destinations: HashMap<String, Arc<RecordingDestination>>,
}

impl RecordingResolver {
    pub fn with_names(names: &[&str]) -> Self {
        Self {
            destinations: names
                .iter()
                .map(|name| (name.to_string(), Arc::new(RecordingDestination::default())))
                .collect(),
        }
    }

    pub fn uploads(&self, name: &str) -> Vec<String> {
        self.destinations[name].uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationResolver for RecordingResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Destination>> {
        self.destinations
            .get(name)
            .map(|destination| Arc::clone(destination) as Arc<dyn Destination>)
            .ok_or_else(|| Error::not_found("destination", name))
    }
}

/// Configuration with every path inside `dir`
pub fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.path().join("tubedl.db");
    config.fetch.download_dir = dir.path().join("downloads");
    config.executor.workers = 3;
    config.executor.task_timeout = Some(Duration::from_secs(30));
    config.executor.shutdown_grace = Duration::from_secs(1);
    config
}

/// Open the fixture database and register the default profile
pub async fn seeded_database(config: &Config) -> Arc<Database> {
    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();
    let options = json!({"format": "bestaudio", "outtmpl": "from-profile"});
    db.insert_profile(PROFILE, options.as_object().unwrap())
        .await
        .unwrap();
    Arc::new(db)
}

/// Pipeline wired to scripted collaborators
pub async fn scripted_pipeline(
    dir: &TempDir,
    engine: Arc<ScriptedEngine>,
    resolver: Arc<RecordingResolver>,
) -> Pipeline {
    let config = config_in(dir);
    let db = seeded_database(&config).await;
    Pipeline::with_collaborators(config, db, engine, resolver)
        .await
        .unwrap()
}

/// Job request using the default profile
pub fn job(url: &str, destinations: Option<&[&str]>) -> NewJob {
    NewJob {
        url: url.to_string(),
        profile: PROFILE.to_string(),
        destinations: destinations.map(|names| names.iter().map(|n| n.to_string()).collect()),
    }
}
