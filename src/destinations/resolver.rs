//! Destination lookup against the database

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::FileCollisionAction;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::model::DestinationRecord;

use super::{Destination, DestinationResolver, LocalDestination};

/// Resolves destinations registered in the `destinations` table
///
/// The backend is chosen by URL scheme; `file://` is the only scheme with a
/// built-in backend.
pub struct DatabaseDestinationResolver {
    db: Arc<Database>,
    collision: FileCollisionAction,
}

impl DatabaseDestinationResolver {
    /// Create a resolver; `collision` applies to local destinations
    pub fn new(db: Arc<Database>, collision: FileCollisionAction) -> Self {
        Self { db, collision }
    }

    /// Build the backend for a stored record
    pub fn backend_for(&self, record: &DestinationRecord) -> Result<Arc<dyn Destination>> {
        let parsed = url::Url::parse(&record.url).map_err(|e| {
            Error::Validation(format!(
                "destination {} has an invalid URL {}: {}",
                record.name,
                record.sanitized_url(),
                e
            ))
        })?;

        match parsed.scheme() {
            "file" => Ok(Arc::new(LocalDestination::from_url(&parsed, self.collision)?)),
            other => Err(Error::NotSupported(format!(
                "destination {} uses unsupported scheme {}",
                record.name, other
            ))),
        }
    }
}

#[async_trait]
impl DestinationResolver for DatabaseDestinationResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Destination>> {
        let record = self
            .db
            .get_destination_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("destination", name))?;

        tracing::debug!(
            destination = %record.name,
            url = %record.sanitized_url(),
            "resolved destination"
        );

        self.backend_for(&record)
    }
}
