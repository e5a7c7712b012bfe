//! Progress and artifact query boundaries.

use super::MediaDownloader;
use crate::error::{Error, JobError, Result};
use crate::types::{ArtifactInfo, ArtifactRef, JobId, JobProgress, JobStatus};

impl MediaDownloader {
    /// Query a job's progress
    ///
    /// Unknown ids yield a typed not-found error, distinct from the job-state
    /// enum; polling for a not-yet-visible id is an expected caller pattern.
    pub async fn get_progress(&self, id: &JobId) -> Result<JobProgress> {
        self.store
            .get(id)
            .await
            .map(|record| JobProgress::from(&record))
            .ok_or_else(|| Error::Job(JobError::UnknownJob { id: id.clone() }))
    }

    /// Fetch the artifact location for a completed job
    ///
    /// Fails with [`Error::NotReady`] while the job is still running (or has
    /// failed), and with [`Error::ArtifactIntegrity`] when a recorded local
    /// artifact is no longer on disk - a reclaimed file is never served as a
    /// stale handle.
    pub async fn get_artifact(&self, id: &JobId) -> Result<ArtifactInfo> {
        let record = self
            .store
            .get(id)
            .await
            .ok_or_else(|| Error::Job(JobError::UnknownJob { id: id.clone() }))?;

        if record.status != JobStatus::Completed {
            return Err(Error::NotReady {
                id: id.clone(),
                status: record.status,
            });
        }

        let artifact = record.artifact.ok_or_else(|| {
            Error::Other(format!("completed job {id} has no artifact recorded"))
        })?;

        // Re-verify local artifacts on every serve: the retention sweeper (or
        // an operator) may have removed the file since completion
        if let ArtifactRef::Local { path, .. } = &artifact {
            match tokio::fs::metadata(path).await {
                Ok(metadata) if metadata.len() > 0 => {}
                Ok(_) => {
                    return Err(Error::ArtifactIntegrity {
                        path: path.clone(),
                        reason: "artifact file is empty".to_string(),
                    });
                }
                Err(_) => {
                    return Err(Error::ArtifactIntegrity {
                        path: path.clone(),
                        reason: "artifact no longer on disk (reclaimed or removed)".to_string(),
                    });
                }
            }
        }

        Ok(ArtifactInfo {
            id: id.clone(),
            artifact,
        })
    }

    /// Progress views for all known jobs, newest first
    pub async fn list_jobs(&self) -> Vec<JobProgress> {
        self.store
            .list()
            .await
            .iter()
            .map(JobProgress::from)
            .collect()
    }

    /// Number of jobs currently counting against the concurrency ceiling
    pub async fn active_jobs(&self) -> usize {
        self.store.active_count().await
    }
}
