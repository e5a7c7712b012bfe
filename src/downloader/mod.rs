//! Download coordinator split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`jobs`] - Job admission and the async download pipeline
//! - [`queries`] - Progress and artifact query boundaries
//!
//! The coordinator owns the shared components (job store, metadata cache,
//! worker pool, extractor) and the background sweepers' lifecycles.

mod jobs;
mod queries;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::{CliExtractor, ExtractorRunner, MediaExtractor, TaskKind};
use crate::retention::RetentionSweeper;
use crate::store::JobStore;
use crate::types::{Event, MediaMetadata};
use crate::worker_pool::WorkerPool;

/// Main coordinator instance (cloneable - all fields are Arc-wrapped)
///
/// Validates admission against the concurrency ceiling, resolves job metadata
/// through the cache, dispatches extraction work to the worker pool, updates
/// the job store as work proceeds, and exposes the final artifact location.
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Job store holding one record per submitted job
    pub(crate) store: Arc<JobStore>,
    /// Metadata cache keyed by source URL
    pub(crate) cache: Arc<TtlCache<MediaMetadata>>,
    /// Bounded pool executing extraction and tag-edit tasks
    pub(crate) pool: Arc<WorkerPool<TaskKind>>,
    /// External extraction tool behind its trait seam
    pub(crate) extractor: Arc<dyn MediaExtractor>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// HTTP client for the direct-URL safety probe
    pub(crate) http: reqwest::Client,
    /// Flag cleared during shutdown so new jobs are refused
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Token cancelling the background sweepers
    pub(crate) shutdown_token: CancellationToken,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// Resolves the external extractor binary from configuration (explicit
    /// path or PATH search) and initializes all core components. Fails when
    /// no extractor binary can be located.
    pub async fn new(config: Config) -> Result<Self> {
        let extractor = CliExtractor::resolve(&config.tools, &config.download)?;
        Self::with_extractor(config, Arc::new(extractor)).await
    }

    /// Create a MediaDownloader with a custom extractor implementation
    ///
    /// Embedders (and tests) can supply any [`MediaExtractor`]; everything
    /// else behaves identically to [`new`](Self::new).
    pub async fn with_extractor(
        config: Config,
        extractor: Arc<dyn MediaExtractor>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        // Broadcast channel with a generous buffer; a subscriber that falls
        // behind receives RecvError::Lagged rather than blocking producers
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let cache = Arc::new(TtlCache::new(
            config.cache.max_entries,
            config.cache.default_ttl,
        ));

        let runner = ExtractorRunner::new(Arc::clone(&extractor));
        let pool = Arc::new(WorkerPool::new(config.download.max_workers, Arc::new(runner)));

        let http = reqwest::Client::builder()
            .timeout(config.download.probe_timeout)
            .build()?;

        tracing::info!(
            extractor = extractor.name(),
            max_active_jobs = config.download.max_active_jobs,
            max_workers = config.download.max_workers,
            "Media downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(JobStore::new()),
            cache,
            pool,
            extractor,
            event_tx,
            http,
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Subscribe to job lifecycle events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently; one that falls behind by more than 1000 events receives
    /// a `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Start the cache expiry sweep background task
    pub fn start_cache_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.cache.spawn_sweeper(
            self.config.cache.sweep_interval,
            self.shutdown_token.child_token(),
        )
    }

    /// Start the retention sweeper background task
    ///
    /// Returns a no-op handle when retention is disabled in configuration.
    pub fn start_retention_sweeper(&self) -> tokio::task::JoinHandle<()> {
        if !self.config.retention.enabled {
            tracing::info!("Retention sweeping disabled, skipping sweeper task");
            return tokio::spawn(async {});
        }

        let sweeper = Arc::new(RetentionSweeper::new(
            self.config.download.download_dir.clone(),
            self.config.retention.max_age,
            Arc::clone(&self.store),
            self.event_tx.clone(),
        ));
        sweeper.spawn(
            self.config.retention.sweep_interval,
            self.shutdown_token.child_token(),
        )
    }

    /// Start all background services (cache sweep, retention sweep)
    pub fn start_background_services(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![self.start_cache_sweeper(), self.start_retention_sweeper()]
    }

    /// Gracefully shut down the downloader
    ///
    /// Stops accepting new jobs, cancels the background sweepers, and waits
    /// (bounded) for in-flight jobs to reach a terminal state. Running
    /// extractions are not killed; a job only leaves the active set by
    /// finishing or erroring.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        let shutdown_timeout = std::time::Duration::from_secs(30);
        let wait_result =
            tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await;
        match wait_result {
            Ok(()) => tracing::info!("All active jobs reached a terminal state"),
            Err(_) => tracing::warn!("Timeout waiting for active jobs, proceeding with shutdown"),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active = self.store.active_count().await;
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for active jobs to complete");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is silently dropped; job
    /// processing never depends on anyone listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server runs concurrently with job processing and listens on the
    /// configured bind address (default: 127.0.0.1:8750).
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = Arc::clone(self);
        let config = Arc::clone(&self.config);

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
