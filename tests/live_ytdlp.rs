//! Runs a real yt-dlp binary against a local HTTP server
//!
//! yt-dlp's generic extractor downloads a direct media link, so no network
//! access beyond localhost is needed.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features live-tests --test live_ytdlp
//! ```

#![cfg(feature = "live-tests")]

mod common;

use common::*;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tubedl::{Database, JobStatus, Pipeline, YtDlpEngine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn ytdlp_fetches_direct_media_link() {
    let Some(engine) = YtDlpEngine::from_path() else {
        eprintln!("yt-dlp not found in PATH, skipping");
        return;
    };

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sample.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(vec![0u8; 4096]),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();
    let options = json!({"quiet": true, "no_warnings": true});
    db.insert_profile(PROFILE, options.as_object().unwrap())
        .await
        .unwrap();
    let db = std::sync::Arc::new(db);

    let resolver = std::sync::Arc::new(RecordingResolver::with_names(&["a"]));
    let pipeline = Pipeline::with_collaborators(
        config,
        db,
        std::sync::Arc::new(engine),
        std::sync::Arc::clone(&resolver) as std::sync::Arc<dyn tubedl::DestinationResolver>,
    )
    .await
    .unwrap();

    let job = pipeline
        .create_job(job(&format!("{}/sample.mp4", server.uri()), Some(&["a"])))
        .await
        .unwrap();
    let job = wait_for_terminal(&pipeline, job.id, Duration::from_secs(60)).await;

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.meta.error);
    assert!(job.meta.downloaded_filename().is_some());
    assert_eq!(resolver.uploads("a").len(), 1);
}
