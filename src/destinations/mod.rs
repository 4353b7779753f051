//! Storage destinations
//!
//! A destination is resolved by name to a [`Destination`], which opens a
//! scoped [`DestinationWriter`] for the duration of one upload. Writers are
//! always closed, whether the write succeeded or not.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

mod local;
mod resolver;

pub use local::LocalDestination;
pub use resolver::DatabaseDestinationResolver;

/// Resolves destination names to writable backends
#[async_trait]
pub trait DestinationResolver: Send + Sync {
    /// Look up `name`; fails with a not-found error if it is unregistered
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Destination>>;
}

/// A writable backing store
#[async_trait]
pub trait Destination: Send + Sync {
    /// Acquire a write handle
    async fn open(&self) -> Result<Box<dyn DestinationWriter>>;

    /// Backend kind, for logs
    fn kind(&self) -> &'static str;
}

/// Scoped write handle to a destination
#[async_trait]
pub trait DestinationWriter: Send {
    /// Copy the local file at `source` into the store under `name`
    ///
    /// Returns the number of bytes written.
    async fn write_file(&mut self, name: &str, source: &Path) -> Result<u64>;

    /// Release the handle
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Copy `filename` into the destination registered as `destination`
///
/// The writer is closed on every path. If the write fails, that error is
/// returned even if closing fails too; a close failure after a successful
/// write fails the upload.
pub async fn upload_to_destination(
    resolver: &dyn DestinationResolver,
    filename: &str,
    destination: &str,
) -> Result<Value> {
    tracing::info!(filename = %filename, destination = %destination, "uploading file");

    let target = resolver.resolve(destination).await?;
    let source = Path::new(filename);
    let name = source
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename);

    let mut writer = target.open().await?;
    let written = writer.write_file(name, source).await;
    let closed = writer.close().await;

    match (written, closed) {
        (Err(write_error), Err(close_error)) => {
            tracing::warn!(
                destination = %destination,
                error = %close_error,
                "closing destination after a failed write also failed"
            );
            Err(write_error)
        }
        (Err(write_error), Ok(())) => Err(write_error),
        (Ok(_), Err(close_error)) => Err(close_error),
        (Ok(bytes), Ok(())) => {
            tracing::debug!(
                destination = %destination,
                kind = target.kind(),
                bytes,
                "upload complete"
            );
            Ok(json!({"success": true}))
        }
    }
}
