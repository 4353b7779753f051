//! Destination backed by a local directory

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::utils::get_unique_path;

use super::{Destination, DestinationWriter};

/// Writes uploads into a directory on the local filesystem
#[derive(Clone, Debug)]
pub struct LocalDestination {
    root: PathBuf,
    collision: FileCollisionAction,
}

impl LocalDestination {
    /// Destination rooted at `root`
    pub fn new(root: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            root: root.into(),
            collision,
        }
    }

    /// Build from a `file://` URL
    pub fn from_url(url: &url::Url, collision: FileCollisionAction) -> Result<Self> {
        let root = url
            .to_file_path()
            .map_err(|()| Error::Validation(format!("{} is not a local directory URL", url)))?;
        Ok(Self::new(root, collision))
    }

    /// Directory uploads land in
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Destination for LocalDestination {
    async fn open(&self) -> Result<Box<dyn DestinationWriter>> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(Box::new(LocalWriter {
            root: self.root.clone(),
            collision: self.collision,
            written: Vec::new(),
        }))
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

struct LocalWriter {
    root: PathBuf,
    collision: FileCollisionAction,
    written: Vec<PathBuf>,
}

#[async_trait]
impl DestinationWriter for LocalWriter {
    async fn write_file(&mut self, name: &str, source: &Path) -> Result<u64> {
        let target = get_unique_path(&self.root.join(name), self.collision)?;
        let bytes = tokio::fs::copy(source, &target).await?;
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            bytes,
            "copied file to local destination"
        );
        self.written.push(target);
        Ok(bytes)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Copies are synchronous to completion; nothing is buffered
        tracing::trace!(root = %self.root.display(), files = self.written.len(), "local writer closed");
        Ok(())
    }
}
