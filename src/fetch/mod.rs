//! Fetch stage
//!
//! A [`FetchEngine`] turns a URL plus opaque profile options into a file on
//! disk. While it works it reports progress through [`FetchHooks`], and once
//! its processing chain ends it hands the raw info document to
//! [`FetchHooks::on_finished`], which returns the normalized metadata.
//!
//! The [`FetchAdapter`] owns the job side of that conversation: it maps engine
//! progress onto job statuses, persists snapshots and produces the fetch
//! task's result.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{FetchConfig, FetchEngineKind};
use crate::error::{Error, Result};
use crate::model::{NormalizedInfo, RawInfo};
use crate::types::JobStatus;

mod adapter;
mod http;
mod ytdlp;

pub use adapter::FetchAdapter;
pub use http::HttpFetchEngine;
pub use ytdlp::YtDlpEngine;

/// Options handed to a fetch engine: profile options plus pipeline overrides
pub type FetchOptions = Map<String, Value>;

/// Option key naming the output path template
pub const OUTPUT_TEMPLATE_KEY: &str = "outtmpl";

/// Placeholder in the output template that the engine replaces with the file extension
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Status an engine reports in a progress update
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    /// Bytes are still arriving
    Downloading,
    /// Bytes are fully on disk; post-processing may follow
    Finished,
    /// The engine hit an error on one of its downloads
    Error,
    /// Anything else the engine chose to report
    Other(String),
}

impl EngineStatus {
    /// Parse an engine status string
    pub fn parse(status: &str) -> Self {
        match status {
            "downloading" => EngineStatus::Downloading,
            "finished" => EngineStatus::Finished,
            "error" => EngineStatus::Error,
            other => EngineStatus::Other(other.to_string()),
        }
    }

    /// Engine-side name
    pub fn as_str(&self) -> &str {
        match self {
            EngineStatus::Downloading => "downloading",
            EngineStatus::Finished => "finished",
            EngineStatus::Error => "error",
            EngineStatus::Other(other) => other,
        }
    }

    /// Job status this engine status maps to, if any
    ///
    /// "finished" means the bytes are down, not that the job is done, so it
    /// maps to [`JobStatus::Processing`] and never to a terminal status.
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            EngineStatus::Downloading => Some(JobStatus::Fetching),
            EngineStatus::Finished => Some(JobStatus::Processing),
            EngineStatus::Error | EngineStatus::Other(_) => None,
        }
    }
}

/// One progress report from an engine
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// Reported status
    pub status: EngineStatus,
    /// The full raw snapshot, `status` included
    pub raw: Map<String, Value>,
}

impl ProgressUpdate {
    /// Build an update from a raw snapshot; `None` if it carries no `status` string
    pub fn from_raw(raw: Map<String, Value>) -> Option<Self> {
        let status = EngineStatus::parse(raw.get("status")?.as_str()?);
        Some(Self { status, raw })
    }

    /// Build an update with only a status field
    pub fn status_only(status: EngineStatus) -> Self {
        let mut raw = Map::new();
        raw.insert("status".to_string(), Value::String(status.as_str().to_string()));
        Self { status, raw }
    }
}

/// Callbacks an engine drives during a fetch
#[async_trait]
pub trait FetchHooks: Send + Sync {
    /// Called on every observable engine state change
    async fn on_progress(&self, update: ProgressUpdate) -> Result<()>;

    /// Called exactly once, at the end of the engine's processing chain
    async fn on_finished(&self, raw: RawInfo) -> Result<NormalizedInfo>;
}

/// External content-fetch engine
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Fetch `url`
    ///
    /// Must call [`FetchHooks::on_progress`] with a status on each observable
    /// change and [`FetchHooks::on_finished`] exactly once on success. A failed
    /// fetch returns `Err`.
    async fn fetch(&self, url: &str, options: &FetchOptions, hooks: &dyn FetchHooks) -> Result<()>;

    /// Name of the engine, for logs
    fn name(&self) -> &'static str;
}

/// Build the engine the configuration asks for
///
/// `auto` prefers yt-dlp (explicit path, then `PATH` if searching is
/// enabled) and falls back to direct HTTP downloads.
pub fn select_engine(config: &FetchConfig) -> Result<Arc<dyn FetchEngine>> {
    let ytdlp = match &config.ytdlp_path {
        Some(path) => Some(YtDlpEngine::new(path.clone())),
        None if config.search_path => YtDlpEngine::from_path(),
        None => None,
    };

    let engine: Arc<dyn FetchEngine> = match (config.engine, ytdlp) {
        (FetchEngineKind::Http, _) => Arc::new(HttpFetchEngine::new()?),
        (FetchEngineKind::YtDlp | FetchEngineKind::Auto, Some(engine)) => Arc::new(engine),
        (FetchEngineKind::YtDlp, None) => {
            return Err(Error::NotSupported(
                "yt-dlp engine requested but no binary was configured or found in PATH"
                    .to_string(),
            ));
        }
        (FetchEngineKind::Auto, None) => {
            tracing::warn!("yt-dlp not found, falling back to direct HTTP downloads");
            Arc::new(HttpFetchEngine::new()?)
        }
    };

    tracing::info!(engine = engine.name(), "fetch engine initialized");
    Ok(engine)
}
