//! Fetch engine that downloads the URL directly over HTTP

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::utils::extract_filename_from_response;

use super::{
    EXT_PLACEHOLDER, EngineStatus, FetchEngine, FetchHooks, FetchOptions, OUTPUT_TEMPLATE_KEY,
    ProgressUpdate,
};

/// Extension used when the served filename has none
const FALLBACK_EXTENSION: &str = "bin";

/// Direct HTTP download engine
///
/// Useful for plain file URLs and as the fallback when yt-dlp is not
/// installed. Profile options other than the output template are ignored.
pub struct HttpFetchEngine {
    client: reqwest::Client,
}

impl HttpFetchEngine {
    /// Create an engine with a default client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("tubedl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create an engine around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Output path for a served filename under `template`
fn output_path(template: &str, served_name: &str) -> PathBuf {
    let extension = Path::new(served_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(FALLBACK_EXTENSION);
    PathBuf::from(template.replace(EXT_PLACEHOLDER, extension))
}

fn progress(status: EngineStatus, downloaded: u64, total: Option<u64>, path: &Path) -> ProgressUpdate {
    let mut raw = Map::new();
    raw.insert("status".to_string(), json!(status.as_str()));
    raw.insert("downloaded_bytes".to_string(), json!(downloaded));
    raw.insert("total_bytes".to_string(), json!(total));
    raw.insert("filename".to_string(), json!(path.to_string_lossy()));
    ProgressUpdate { status, raw }
}

#[async_trait]
impl FetchEngine for HttpFetchEngine {
    async fn fetch(&self, url: &str, options: &FetchOptions, hooks: &dyn FetchHooks) -> Result<()> {
        let template = options
            .get(OUTPUT_TEMPLATE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Validation(format!("fetch options are missing {}", OUTPUT_TEMPLATE_KEY))
            })?;

        let response = self.client.get(url).send().await?.error_for_status()?;
        let served_name = extract_filename_from_response(&response, url);
        let path = output_path(template, &served_name);
        let total = response.content_length();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!(url = %url, path = %path.display(), total_bytes = ?total, "downloading");
        hooks
            .on_progress(progress(EngineStatus::Downloading, 0, total, &path))
            .await?;

        let mut file = tokio::fs::File::create(&path).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        hooks
            .on_progress(progress(EngineStatus::Finished, downloaded, total, &path))
            .await?;

        let title = Path::new(&served_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&served_name)
            .to_string();

        let mut raw = Map::new();
        raw.insert("filepath".to_string(), json!(path.to_string_lossy()));
        raw.insert("filesize".to_string(), json!(downloaded));
        raw.insert("webpage_url".to_string(), json!(url));
        raw.insert("title".to_string(), json!(title));

        hooks.on_finished(raw).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
