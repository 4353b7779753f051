//! Fetch profile registration and lookup.

use serde_json::{Map, Value};

use crate::error::DatabaseError;
use crate::model::ProfileRecord;
use crate::{Error, Result};

use super::{Database, ProfileRow};

impl TryFrom<ProfileRow> for ProfileRecord {
    type Error = Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        let options: Map<String, Value> = serde_json::from_str(&row.options).map_err(|e| {
            Error::Database(DatabaseError::CorruptRecord(format!(
                "profile {:?} has unreadable options: {}",
                row.name, e
            )))
        })?;

        Ok(ProfileRecord {
            id: row.id,
            name: row.name,
            options,
        })
    }
}

impl Database {
    /// Register a fetch profile
    ///
    /// Fails with a constraint violation if the name is taken.
    pub async fn insert_profile(&self, name: &str, options: &Map<String, Value>) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let options = serde_json::to_string(options)?;

        let result = sqlx::query("INSERT INTO profiles (name, options, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(&options)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("profile", name, e))?;

        Ok(result.last_insert_rowid())
    }

    /// Get a profile by name
    pub async fn get_profile_by_name(&self, name: &str) -> Result<Option<ProfileRecord>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, name, options FROM profiles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get profile: {}",
                e
            )))
        })?;

        row.map(ProfileRecord::try_from).transpose()
    }

    /// List all profiles by name
    pub async fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let rows =
            sqlx::query_as::<_, ProfileRow>("SELECT id, name, options FROM profiles ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to list profiles: {}",
                        e
                    )))
                })?;

        rows.into_iter().map(ProfileRecord::try_from).collect()
    }
}

/// Map an INSERT failure, separating duplicate names from other failures
pub(super) fn insert_error(kind: &str, name: &str, e: sqlx::Error) -> Error {
    let duplicate = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());

    if duplicate {
        Error::Database(DatabaseError::ConstraintViolation(format!(
            "{} {:?} already exists",
            kind, name
        )))
    } else {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Failed to insert {}: {}",
            kind, e
        )))
    }
}
