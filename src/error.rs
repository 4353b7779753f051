//! Error types for tubedl
//!
//! This module provides the crate-wide error type and its taxonomy:
//! - Validation failures (a stage precondition does not hold)
//! - Not-found conditions (unknown job, profile or destination)
//! - Execution failures (a fetch or upload task raised, panicked, timed out)
//! - Persistence failures (the job store rejected a read or write)
//!
//! Every variant maps to a stable, machine-readable code via [`Error::error_code`].
//! That code is what gets recorded in a failed job's metadata.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for tubedl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tubedl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "executor.workers")
        key: Option<String>,
    },

    /// A required precondition was not met before a stage could run
    #[error("validation error: {0}")]
    Validation(String),

    /// A named record could not be found
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of record that was looked up ("job", "profile", "destination")
        kind: &'static str,
        /// The name or identifier that was looked up
        name: String,
    },

    /// A fetch or upload task raised an error or panicked
    #[error("execution error: {0}")]
    Execution(String),

    /// A task exceeded the configured task timeout
    #[error("task {task} timed out after {}s", after.as_secs())]
    TimedOut {
        /// Name of the task that timed out
        task: String,
        /// The timeout that was exceeded
        after: Duration,
    },

    /// A task was cancelled before it could finish
    #[error("task {0} was cancelled")]
    Cancelled(String),

    /// A job was left mid-pipeline by a process that stopped
    #[error("job {0} was interrupted by a restart")]
    Interrupted(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (unknown destination scheme, missing binary, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Shutdown in progress - not accepting new jobs or tasks
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded into a record
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// Constraint violation (e.g., duplicate name)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl Error {
    /// Shorthand for a not-found error
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::NotFound { kind, .. } => match *kind {
                "job" => "job_not_found",
                "profile" => "profile_not_found",
                "destination" => "destination_not_found",
                _ => "not_found",
            },
            Error::Execution(_) => "execution_error",
            Error::TimedOut { .. } => "timed_out",
            Error::Cancelled(_) => "cancelled",
            Error::Interrupted(_) => "interrupted",
            Error::Database(_) | Error::Sqlx(_) => "persistence_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::ShuttingDown => "shutting_down",
        }
    }

    /// Whether this error belongs to the persistence class
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Sqlx(_))
    }
}
