//! # tubedl
//!
//! Asynchronous fetch-and-distribute pipeline for remote media.
//!
//! A job names a URL, a fetch profile and zero or more storage destinations.
//! The pipeline fetches the resource with an external engine, records
//! normalized metadata, then copies the downloaded file to every destination
//! in parallel and records a per-destination outcome.
//!
//! ## Design Philosophy
//!
//! - **Callback-driven** - each stage schedules the next one from its completion callback; there is no scheduler loop
//! - **Monotonic** - a job's status only moves forward and never leaves COMPLETED or FAILED
//! - **Library-first** - no CLI or HTTP routes, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use tubedl::{Config, NewJob, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(Config::default()).await?;
//!
//!     // Profiles and destinations are owned by the embedding application
//!     let options = serde_json::json!({"format": "bestvideo+bestaudio"});
//!     pipeline.db().insert_profile("best", options.as_object().unwrap()).await?;
//!     pipeline.db().insert_destination("nas", "file:///srv/media").await?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let job = pipeline
//!         .create_job(NewJob {
//!             url: "https://example.com/watch?v=1".to_string(),
//!             profile: "best".to_string(),
//!             destinations: Some(vec!["nas".to_string()]),
//!         })
//!         .await?;
//!     println!("queued {}", job.id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Storage destinations
pub mod destinations;
/// Error types
pub mod error;
/// Bounded worker pool
pub mod executor;
/// Fetch engines and the fetch adapter
pub mod fetch;
/// Job, profile and destination records
pub mod model;
/// Job pipeline (decomposed into focused submodules)
pub mod pipeline;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FetchEngineKind, FileCollisionAction};
pub use db::Database;
pub use destinations::{Destination, DestinationResolver, DestinationWriter};
pub use error::{DatabaseError, Error, Result};
pub use executor::{Executor, ExecutorFault, TaskHandle, TaskOutcome};
pub use fetch::{FetchEngine, FetchHooks, HttpFetchEngine, YtDlpEngine};
pub use model::{
    DestinationRecord, JobFailure, JobMeta, JobRecord, NewJob, NormalizedInfo, ProfileRecord,
    UploadRecord, UploadResults,
};
pub use pipeline::Pipeline;
pub use types::{Event, JobId, JobStatus, Stage};

/// Helper function to run the pipeline with graceful signal handling.
///
/// Waits for a termination signal and then calls the pipeline's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tubedl::{Config, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(pipeline).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: Pipeline) -> Result<()> {
    wait_for_signal().await;
    pipeline.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(term_error), Err(int_error)) => {
            tracing::error!(
                sigterm_error = %term_error,
                sigint_error = %int_error,
                "Could not register any signal handlers, using ctrl_c fallback"
            );
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
