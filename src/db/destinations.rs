//! Destination registration and lookup.

use crate::error::DatabaseError;
use crate::model::DestinationRecord;
use crate::{Error, Result};

use super::profiles::insert_error;
use super::{Database, DestinationRow};

impl From<DestinationRow> for DestinationRecord {
    fn from(row: DestinationRow) -> Self {
        DestinationRecord {
            id: row.id,
            name: row.name,
            url: row.url,
        }
    }
}

impl Database {
    /// Register a destination
    ///
    /// Fails with a constraint violation if the name is taken.
    pub async fn insert_destination(&self, name: &str, url: &str) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result =
            sqlx::query("INSERT INTO destinations (name, url, created_at) VALUES (?, ?, ?)")
                .bind(name)
                .bind(url)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| insert_error("destination", name, e))?;

        Ok(result.last_insert_rowid())
    }

    /// Get a destination by name
    pub async fn get_destination_by_name(&self, name: &str) -> Result<Option<DestinationRecord>> {
        let row = sqlx::query_as::<_, DestinationRow>(
            "SELECT id, name, url FROM destinations WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get destination: {}",
                e
            )))
        })?;

        Ok(row.map(DestinationRecord::from))
    }
}
