//! Job persistence: the load/save collaborator the stage controller talks to.

use crate::error::DatabaseError;
use crate::model::{JobMeta, JobRecord};
use crate::types::{JobId, JobStatus};
use crate::{Error, Result};

use super::{Database, JobRow};

impl TryFrom<JobRow> for JobRecord {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let id: JobId = row.id.parse().map_err(|e| {
            Error::Database(DatabaseError::CorruptRecord(format!(
                "job id {:?} is not a UUID: {}",
                row.id, e
            )))
        })?;

        let created_at = chrono::DateTime::from_timestamp_millis(row.created_at).ok_or_else(|| {
            Error::Database(DatabaseError::CorruptRecord(format!(
                "job {} has an out-of-range created_at: {}",
                id, row.created_at
            )))
        })?;

        let meta: JobMeta = serde_json::from_str(&row.meta).map_err(|e| {
            Error::Database(DatabaseError::CorruptRecord(format!(
                "job {} has unreadable metadata: {}",
                id, e
            )))
        })?;

        Ok(JobRecord {
            id,
            created_at,
            status: JobStatus::from_i32(row.status),
            meta,
        })
    }
}

impl Database {
    /// Persist a job snapshot
    ///
    /// Inserts the job if it is new, otherwise replaces its status and metadata.
    /// The write is guarded in SQL so that a stale snapshot can never move a
    /// stored job backwards or out of a terminal status; such a write is
    /// dropped and `Ok(false)` is returned.
    pub async fn save_job(&self, job: &JobRecord) -> Result<bool> {
        let meta = serde_json::to_string(&job.meta)?;
        let now = chrono::Utc::now().timestamp_millis();

        // Statuses 4 and 5 are terminal; ranks only grow
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, created_at, status, meta, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                meta = excluded.meta,
                updated_at = excluded.updated_at
            WHERE excluded.status >= jobs.status
              AND (jobs.status < 4 OR excluded.status = jobs.status)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.created_at.timestamp_millis())
        .bind(job.status.to_i32())
        .bind(&meta)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save job {}: {}",
                job.id, e
            )))
        })?;

        let applied = result.rows_affected() > 0;
        if !applied {
            tracing::debug!(
                job_id = %job.id,
                status = %job.status,
                "stale job write dropped"
            );
        }

        Ok(applied)
    }

    /// Load a job by ID
    pub async fn load_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, created_at, status, meta, updated_at
            FROM jobs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load job {}: {}",
                id, e
            )))
        })?;

        row.map(JobRecord::try_from).transpose()
    }

    /// List jobs in any of the given statuses, oldest first
    pub async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<JobRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT id, created_at, status, meta, updated_at FROM jobs \
             WHERE status IN ({}) ORDER BY created_at ASC",
            placeholders
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        for status in statuses {
            query = query.bind(status.to_i32());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list jobs: {}",
                e
            )))
        })?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }
}
