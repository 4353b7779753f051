//! Core types for tubedl

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Job status
///
/// Statuses are ranked in pipeline order. A job only ever moves forward, and
/// once it reaches [`JobStatus::Completed`] or [`JobStatus::Failed`] it stays there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created and waiting for the fetch stage to start
    Queued,
    /// Fetch engine is downloading the resource
    Fetching,
    /// Bytes are on disk, the engine is post-processing
    Processing,
    /// Distributing the file to destinations
    Uploading,
    /// Pipeline finished
    Completed,
    /// A stage failed fatally
    Failed,
}

impl JobStatus {
    /// Convert integer status code to JobStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => JobStatus::Queued,
            1 => JobStatus::Fetching,
            2 => JobStatus::Processing,
            3 => JobStatus::Uploading,
            4 => JobStatus::Completed,
            _ => JobStatus::Failed, // Unknown codes are treated as failed
        }
    }

    /// Convert JobStatus to integer status code (also its rank)
    pub fn to_i32(&self) -> i32 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Fetching => 1,
            JobStatus::Processing => 2,
            JobStatus::Uploading => 3,
            JobStatus::Completed => 4,
            JobStatus::Failed => 5,
        }
    }

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Fetching => "fetching",
            JobStatus::Processing => "processing",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the monotonic rule
    ///
    /// Staying put is always allowed. Terminal statuses accept nothing else,
    /// and no status may move to a lower rank.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.to_i32() > self.to_i32()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage whose completion is being handled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Fetching the remote resource
    Fetching,
    /// Uploading to destinations
    Uploading,
}

impl Stage {
    /// Wire name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Uploading => "uploading",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job created and persisted as queued
    Queued {
        /// Job ID
        id: JobId,
        /// URL the job will fetch
        url: String,
    },

    /// Job status moved forward
    StatusChanged {
        /// Job ID
        id: JobId,
        /// Previous status
        from: JobStatus,
        /// New status
        to: JobStatus,
    },

    /// One destination upload reached a terminal state
    UploadFinished {
        /// Job ID
        id: JobId,
        /// Destination name
        destination: String,
        /// Whether the upload succeeded
        success: bool,
    },

    /// Job finished the pipeline
    Completed {
        /// Job ID
        id: JobId,
    },

    /// Job failed fatally
    Failed {
        /// Job ID
        id: JobId,
        /// Stage that failed, if the failure is attributable to one
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
        /// Error message
        error: String,
    },

    /// A worker callback failed and nothing else could absorb the error
    Fault {
        /// Name of the task whose callback failed
        task: String,
        /// Error message
        error: String,
    },

    /// Pipeline is shutting down
    Shutdown,
}
