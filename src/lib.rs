//! # media-dl
//!
//! Highly configurable backend library for media download applications.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Highly configurable** - Almost every behavior can be customized
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! The crate orchestrates an external media-extraction tool: it bounds
//! concurrent extraction work across a pool of isolated executors, tracks
//! each job through an explicit state machine, caches expensive metadata
//! lookups with time-bounded validity, and periodically reclaims disk space
//! consumed by finished jobs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, JobOptions, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!     downloader.start_background_services();
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let job_id = downloader
//!         .start_job("https://example.com/watch?v=abc", JobOptions::default())
//!         .await?;
//!     println!("submitted job {job_id}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Time-bounded metadata cache
pub mod cache;
/// Configuration types
pub mod config;
/// Core download coordinator (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// External media-extraction tool seam
pub mod extractor;
/// Retention sweeper for reclaiming disk space
pub mod retention;
/// Retry logic with exponential backoff
pub mod retry;
/// In-memory job store
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Bounded executor pool
pub mod worker_pool;

// Re-export commonly used types
pub use cache::TtlCache;
pub use config::{
    ApiConfig, CacheConfig, Config, DownloadConfig, RetentionConfig, RetryConfig, ToolsConfig,
};
pub use downloader::MediaDownloader;
pub use error::{ApiError, Error, ErrorDetail, JobError, Result, ToHttpStatus};
pub use extractor::{
    CliExtractor, ExtractRequest, ExtractorRunner, MediaExtractor, TagEditRequest, TaskKind,
};
pub use retention::{RetentionSweeper, SweepStats};
pub use store::JobStore;
pub use types::{
    ArtifactInfo, ArtifactRef, Event, JobId, JobOptions, JobProgress, JobRecord, JobStatus,
    MediaFormat, MediaMetadata,
};
pub use worker_pool::{TaskRunner, WorkerPool};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     downloader.start_background_services();
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
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
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
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
