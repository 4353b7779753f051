//! Database layer for tubedl
//!
//! Handles SQLite persistence for jobs, fetch profiles and destinations.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`jobs`] — Job load/save (the pipeline's persistence collaborator)
//! - [`profiles`] — Fetch profile lookup and registration
//! - [`destinations`] — Destination lookup and registration

use sqlx::{FromRow, sqlite::SqlitePool};

mod destinations;
mod jobs;
mod migrations;
mod profiles;

/// Job row as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Job UUID as text
    pub id: String,
    /// Unix timestamp when the job was created
    pub created_at: i64,
    /// Status code (see [`JobStatus::to_i32`](crate::types::JobStatus::to_i32))
    pub status: i32,
    /// JSON-encoded job metadata
    pub meta: String,
    /// Unix timestamp of the last applied write
    pub updated_at: i64,
}

/// Profile row as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    /// Unique database ID
    pub id: i64,
    /// Unique profile name
    pub name: String,
    /// JSON-encoded engine options
    pub options: String,
}

/// Destination row as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct DestinationRow {
    /// Unique database ID
    pub id: i64,
    /// Unique destination name
    pub name: String,
    /// Backing store URL
    pub url: String,
}

/// Database handle for tubedl
pub struct Database {
    pool: SqlitePool,
}
