//! Records the pipeline reads and writes.
//!
//! [`JobRecord`] is the only record the pipeline mutates. Its [`JobMeta`] has an
//! explicit schema for the keys the pipeline knows about and a bounded extension
//! map for anything else (engine passthrough fields, caller annotations).
//! All metadata mutation is a shallow merge-update: named top-level keys are
//! replaced wholesale, every other key is left untouched.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{JobId, JobStatus, Stage};

mod info;

pub use info::{Codecs, Downloaded, NormalizedInfo, RawInfo, Source, Uploader, normalize};

/// Maximum number of top-level metadata keys outside the known schema
pub const MAX_EXTENSION_KEYS: usize = 32;

/// Per-destination upload results, keyed by destination name
pub type UploadResults = BTreeMap<String, UploadRecord>;

/// Outcome of one destination upload as recorded in `meta.result`
///
/// `error` and `result` are filled from two independent conditions, so a
/// record may carry both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Error message if the upload task raised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Value the upload task produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Why a job failed, as recorded in `meta.error`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Stage the failure is attributed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl JobFailure {
    /// Build a failure record from an error
    pub fn from_error(stage: Option<Stage>, error: &Error) -> Self {
        Self {
            stage,
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Job metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMeta {
    /// URL to fetch
    pub url: String,
    /// Name of the profile whose options drive the fetch engine
    pub profile: String,
    /// Destination names, in dispatch order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destinations: Option<Vec<String>>,
    /// Normalized fetch metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<NormalizedInfo>,
    /// Latest raw progress snapshot from the fetch engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<Value>,
    /// Per-destination upload outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<UploadResults>,
    /// Failure details once the job is failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Top-level keys outside the known schema
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobMeta {
    /// Destination names, empty when none were requested
    pub fn destinations(&self) -> &[String] {
        self.destinations.as_deref().unwrap_or(&[])
    }

    /// Downloaded filename recorded by the fetch stage, if any
    pub fn downloaded_filename(&self) -> Option<&str> {
        self.info
            .as_ref()
            .and_then(|info| info.downloaded.filename.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Shallow merge-update
    ///
    /// Every key in `update` replaces the top-level key of the same name;
    /// nested values are replaced wholesale, never deep-merged. Keys not named
    /// in `update` are preserved. The update is rejected as a whole if a known
    /// key receives a value of the wrong shape, or if it would push the
    /// extension map past [`MAX_EXTENSION_KEYS`].
    pub fn merge_update(&mut self, update: Map<String, Value>) -> Result<()> {
        let Value::Object(mut current) = serde_json::to_value(&*self)? else {
            return Err(Error::Validation(
                "job metadata did not serialize to an object".to_string(),
            ));
        };

        for (key, value) in update {
            current.insert(key, value);
        }

        let merged: JobMeta = serde_json::from_value(Value::Object(current))
            .map_err(|e| Error::Validation(format!("metadata update rejected: {}", e)))?;

        if merged.extra.len() > MAX_EXTENSION_KEYS {
            return Err(Error::Validation(format!(
                "metadata may carry at most {} extension keys, update would leave {}",
                MAX_EXTENSION_KEYS,
                merged.extra.len()
            )));
        }

        *self = merged;
        Ok(())
    }

    /// Replace `info`
    pub fn set_info(&mut self, info: NormalizedInfo) {
        self.info = Some(info);
    }

    /// Replace `extractor`
    pub fn set_extractor(&mut self, snapshot: Value) {
        self.extractor = Some(snapshot);
    }

    /// Replace `result`
    pub fn set_result(&mut self, results: UploadResults) {
        self.result = Some(results);
    }

    /// Replace `error`
    pub fn set_error(&mut self, failure: JobFailure) {
        self.error = Some(failure);
    }
}

/// Job submission request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewJob {
    /// URL to fetch
    pub url: String,
    /// Profile name
    pub profile: String,
    /// Destination names (absent or empty = fetch only)
    #[serde(default)]
    pub destinations: Option<Vec<String>>,
}

/// A fetch-and-distribute job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job ID (immutable)
    pub id: JobId,
    /// Creation time (immutable, millisecond precision to match storage)
    pub created_at: DateTime<Utc>,
    /// Current status
    pub status: JobStatus,
    /// Job metadata
    pub meta: JobMeta,
}

impl JobRecord {
    /// Create a queued job from a submission request
    pub fn new(request: NewJob) -> Self {
        Self {
            id: JobId::new(),
            created_at: Utc::now().trunc_subsecs(3),
            status: JobStatus::Queued,
            meta: JobMeta {
                url: request.url,
                profile: request.profile,
                destinations: request.destinations,
                ..JobMeta::default()
            },
        }
    }

    /// Move the job to `next` if the monotonic rule allows it
    ///
    /// Returns whether the status actually changed.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status == next {
            return false;
        }
        if !self.status.can_advance_to(next) {
            tracing::debug!(
                job_id = %self.id,
                from = %self.status,
                to = %next,
                "ignoring backward status transition"
            );
            return false;
        }
        self.status = next;
        true
    }
}

/// Fetch profile (collaborator-owned, read-only to the pipeline)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Database ID
    pub id: i64,
    /// Unique profile name
    pub name: String,
    /// Opaque engine options, forwarded verbatim
    pub options: Map<String, Value>,
}

/// Storage destination (collaborator-owned, read-only to the pipeline)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecord {
    /// Database ID
    pub id: i64,
    /// Unique destination name
    pub name: String,
    /// Backing store URL (e.g. `file:///srv/media`)
    pub url: String,
}

impl DestinationRecord {
    /// The destination URL with any password masked
    pub fn sanitized_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                if parsed.set_password(Some("****")).is_err() {
                    return self.url.clone();
                }
                parsed.to_string()
            }
            _ => self.url.clone(),
        }
    }
}
