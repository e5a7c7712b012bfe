//! Retention sweeper for reclaiming disk space
//!
//! Background loop that deletes artifacts of finished jobs once they are
//! older than the configured age, and prunes the matching terminal records
//! from the job store. Individual deletion failures are logged as warnings
//! and do not stop the pass.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::JobStore;
use crate::types::Event;

/// Outcome of one sweeper pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Artifact files deleted from disk
    pub files_removed: usize,
    /// Terminal job records pruned from the store
    pub records_removed: usize,
}

/// Deletes artifacts and job records older than a configured age
pub struct RetentionSweeper {
    artifact_root: PathBuf,
    max_age: Duration,
    store: Arc<JobStore>,
    event_tx: broadcast::Sender<Event>,
}

impl RetentionSweeper {
    /// Create a sweeper over `artifact_root`
    pub fn new(
        artifact_root: PathBuf,
        max_age: Duration,
        store: Arc<JobStore>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            artifact_root,
            max_age,
            store,
            event_tx,
        }
    }

    /// Run a single pass: delete old artifact files, then prune old records
    ///
    /// Files are judged by modification time, records by creation time. A
    /// pass never fails; problems with individual entries are logged and
    /// skipped.
    pub async fn run_once(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        let mut entries = match tokio::fs::read_dir(&self.artifact_root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    path = %self.artifact_root.display(),
                    error = %e,
                    "artifact root not readable, skipping file sweep"
                );
                stats.records_removed = self.store.sweep(self.max_age).await;
                return stats;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to stat artifact");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            let Some(age) = age else {
                warn!(path = %path.display(), "artifact has no usable modification time");
                continue;
            };

            if age > self.max_age {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!(path = %path.display(), age_secs = age.as_secs(), "reclaimed artifact");
                        stats.files_removed += 1;
                        self.event_tx
                            .send(Event::ArtifactReclaimed { path })
                            .ok();
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to delete artifact");
                    }
                }
            }
        }

        stats.records_removed = self.store.sweep(self.max_age).await;

        if stats.files_removed > 0 || stats.records_removed > 0 {
            tracing::info!(
                files_removed = stats.files_removed,
                records_removed = stats.records_removed,
                "retention sweep complete"
            );
        }

        stats
    }

    /// Spawn the periodic sweep as a background task
    ///
    /// Runs [`run_once`](Self::run_once) every `interval` until the token is
    /// cancelled. Tests that need deterministic behavior call `run_once`
    /// directly instead of relying on the timer.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Skip the immediate first tick; nothing can be expired at startup
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = cancel_token.cancelled() => {
                        break;
                    }
                }
            }
        })
    }
}
