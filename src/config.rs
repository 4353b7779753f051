//! Configuration types for tubedl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker slots shared by every task in the pipeline (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on the runtime of a single task (None = no timeout)
    ///
    /// Applies to fetch tasks, fan-out tasks and per-destination uploads alike.
    /// A task that exceeds it fails with a timeout error.
    #[serde(default, with = "optional_duration_serde")]
    pub task_timeout: Option<Duration>,

    /// How long shutdown waits for in-flight tasks before cancelling them (default: 30 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            task_timeout: None,
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Which fetch engine backs the fetch stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchEngineKind {
    /// yt-dlp when it can be found, otherwise direct HTTP (default)
    #[default]
    Auto,
    /// Always use the external yt-dlp binary
    YtDlp,
    /// Always download the URL directly over HTTP
    Http,
}

/// Fetch stage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Engine selection
    #[serde(default)]
    pub engine: FetchEngineKind,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Directory fetched files are written to (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            engine: FetchEngineKind::default(),
            ytdlp_path: None,
            search_path: true,
            download_dir: default_download_dir(),
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Fail the upload, keep existing
    Skip,
}

/// Destination backend configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// What local destinations do when the target file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./tubedl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`Pipeline`](crate::Pipeline)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Fetch stage settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Destination backend settings
    #[serde(default)]
    pub destinations: DestinationConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            fetch: FetchConfig::default(),
            destinations: DestinationConfig::default(),
            persistence: PersistenceConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.executor.workers == 0 {
            return Err(config_error(
                "worker pool needs at least one worker",
                "executor.workers",
            ));
        }
        if self.executor.task_timeout == Some(Duration::ZERO) {
            return Err(config_error(
                "task timeout must be positive; omit it to disable",
                "executor.task_timeout",
            ));
        }
        if self.event_buffer == 0 {
            return Err(config_error(
                "event buffer must hold at least one event",
                "event_buffer",
            ));
        }
        Ok(())
    }

    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.fetch.download_dir
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_workers() -> usize {
    4
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tubedl.db")
}

fn default_event_buffer() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.executor.workers, 4);
        assert_eq!(config.executor.task_timeout, None);
        assert_eq!(config.executor.shutdown_grace, Duration::from_secs(30));
        assert_eq!(config.fetch.engine, FetchEngineKind::Auto);
        assert!(config.fetch.search_path);
        assert_eq!(config.download_dir(), &PathBuf::from("downloads"));
        assert_eq!(
            config.destinations.file_collision,
            FileCollisionAction::Rename
        );
        assert_eq!(config.persistence.database_path, PathBuf::from("tubedl.db"));
        assert_eq!(config.event_buffer, 1000);
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn durations_are_integer_seconds() {
        let json = r#"{"executor":{"workers":2,"task_timeout":90,"shutdown_grace":5}}"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.executor.task_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.executor.shutdown_grace, Duration::from_secs(5));

        let value = serde_json::to_value(&config).expect("serialize failed");
        assert_eq!(value["executor"]["task_timeout"], 90);
        assert_eq!(value["executor"]["shutdown_grace"], 5);
    }

    #[test]
    fn engine_kind_is_snake_case() {
        let config: Config =
            serde_json::from_str(r#"{"fetch":{"engine":"yt_dlp"}}"#).expect("deserialize failed");
        assert_eq!(config.fetch.engine, FetchEngineKind::YtDlp);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = Config::default();
        config.executor.workers = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("executor.workers")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = Config::default();
        config.executor.task_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_event_buffer_is_rejected() {
        let config = Config {
            event_buffer: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_collision_action_fails_to_parse() {
        let result = serde_json::from_str::<Config>(r#"{"destinations":{"file_collision":"merge"}}"#);
        assert!(result.is_err());
    }
}
