//! In-memory job store
//!
//! Holds one record per submitted job and owns every mutation to it. All
//! access serializes on an internal mutex; reads hand out clones so callers
//! can never mutate a record behind the store's back.
//!
//! Records walk the state machine `Queued -> Processing -> {Completed,
//! Failed}` (with the direct short-circuit `Queued -> Completed` also legal).
//! Terminal states are final: any update that would leave them is rejected
//! with a typed error.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{Error, JobError, Result};
use crate::types::{ArtifactRef, JobId, JobRecord, JobStatus};

/// Store of job records, keyed by job id
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl JobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Queued record without an admission check
    ///
    /// Most callers want [`try_admit`](Self::try_admit); this exists for the
    /// cases (and tests) where the ceiling is enforced elsewhere.
    pub async fn create(&self, source_url: impl Into<String>) -> JobRecord {
        let record = JobRecord::new(JobId::new(), source_url);
        self.jobs
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        record
    }

    /// Atomically check the concurrency ceiling and create a Queued record
    ///
    /// The active-job count and the insertion happen under one lock, so
    /// concurrent admissions can never overshoot the ceiling.
    pub async fn try_admit(&self, source_url: impl Into<String>, ceiling: usize) -> Result<JobRecord> {
        let mut jobs = self.jobs.lock().await;

        let active = jobs.values().filter(|job| job.status.is_active()).count();
        if active >= ceiling {
            return Err(Error::CapacityExceeded {
                active,
                limit: ceiling,
            });
        }

        let record = JobRecord::new(JobId::new(), source_url);
        jobs.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    /// Fetch a copy of a record; `None` for unknown ids
    ///
    /// Polling for a not-yet-visible id is an expected caller pattern, so an
    /// unknown id is not an error at this layer.
    pub async fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.lock().await.get(id).cloned()
    }

    /// Copies of all records, newest first
    pub async fn list(&self) -> Vec<JobRecord> {
        let jobs = self.jobs.lock().await;
        let mut records: Vec<JobRecord> = jobs.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Number of jobs in a non-terminal state
    pub async fn active_count(&self) -> usize {
        self.jobs
            .lock()
            .await
            .values()
            .filter(|job| job.status.is_active())
            .count()
    }

    /// Transition a record to Processing
    pub async fn mark_processing(&self, id: &JobId) -> Result<()> {
        self.transition(id, JobStatus::Processing, |_| {}).await
    }

    /// Record a progress update
    ///
    /// Progress is monotonic while a job is active: a lower percentage than
    /// the current one is ignored, as is any update on a terminal record
    /// (a late progress line racing a completion is expected, not an error).
    pub async fn set_progress(&self, id: &JobId, percent: u8) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::UnknownJob { id: id.clone() })?;

        if record.status.is_terminal() {
            tracing::debug!(job_id = %id, percent, "ignoring progress update on terminal job");
            return Ok(());
        }

        record.progress_percent = record.progress_percent.max(percent.min(100));
        Ok(())
    }

    /// Complete a job with a locally produced artifact
    pub async fn complete_local(
        &self,
        id: &JobId,
        path: std::path::PathBuf,
        size: u64,
        content_type: String,
        display_name: String,
    ) -> Result<()> {
        self.transition(id, JobStatus::Completed, move |record| {
            record.progress_percent = 100;
            record.artifact = Some(ArtifactRef::Local {
                path,
                size,
                content_type,
                display_name,
            });
        })
        .await
    }

    /// Complete a job by reference to a directly fetchable remote location
    pub async fn complete_direct(
        &self,
        id: &JobId,
        url: String,
        size: Option<u64>,
        content_type: String,
        display_name: String,
    ) -> Result<()> {
        self.transition(id, JobStatus::Completed, move |record| {
            record.progress_percent = 100;
            record.artifact = Some(ArtifactRef::Direct {
                url,
                size,
                content_type,
                display_name,
            });
        })
        .await
    }

    /// Fail a job with a human-readable reason
    pub async fn fail(&self, id: &JobId, error_detail: impl Into<String>) -> Result<()> {
        let error_detail = error_detail.into();
        self.transition(id, JobStatus::Failed, move |record| {
            record.error_detail = Some(error_detail);
        })
        .await
    }

    /// Remove terminal records older than `max_age`; returns how many were removed
    ///
    /// Non-terminal records are never swept: a job that is still running
    /// keeps its record until it resolves, however long that takes.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;

        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, record| record.status.is_active() || record.created_at > cutoff);
        before - jobs.len()
    }

    async fn transition(
        &self,
        id: &JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut JobRecord),
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::UnknownJob { id: id.clone() })?;

        let legal = matches!(
            (record.status, to),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Completed)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        );
        if !legal {
            return Err(Error::Job(JobError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to,
            }));
        }

        record.status = to;
        apply(record);
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    const URL: &str = "https://example.com/watch?v=abc";

    #[tokio::test]
    async fn create_produces_a_queued_record() {
        let store = JobStore::new();
        let record = store.create(URL).await;

        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress_percent, 0);

        let fetched = store.get(&record.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.source_url, URL);
    }

    #[tokio::test]
    async fn get_unknown_id_returns_none() {
        let store = JobStore::new();
        assert!(store.get(&JobId::from("nope")).await.is_none());
    }

    #[tokio::test]
    async fn reads_are_defensive_copies() {
        let store = JobStore::new();
        let record = store.create(URL).await;

        let mut copy = store.get(&record.id).await.unwrap();
        copy.status = JobStatus::Failed;
        copy.progress_percent = 99;

        let fresh = store.get(&record.id).await.unwrap();
        assert_eq!(
            fresh.status,
            JobStatus::Queued,
            "mutating a returned copy must not touch the stored record"
        );
        assert_eq!(fresh.progress_percent, 0);
    }

    #[tokio::test]
    async fn happy_path_walks_queued_processing_completed() {
        let store = JobStore::new();
        let record = store.create(URL).await;

        store.mark_processing(&record.id).await.unwrap();
        assert_eq!(
            store.get(&record.id).await.unwrap().status,
            JobStatus::Processing
        );

        store
            .complete_local(
                &record.id,
                PathBuf::from("/tmp/out.mp4"),
                2048,
                "video/mp4".into(),
                "clip.mp4".into(),
            )
            .await
            .unwrap();

        let done = store.get(&record.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress_percent, 100);
        match done.artifact.unwrap() {
            ArtifactRef::Local { path, size, .. } => {
                assert_eq!(path, PathBuf::from("/tmp/out.mp4"));
                assert_eq!(size, 2048);
            }
            other => panic!("expected local artifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_short_circuit_completes_straight_from_queued() {
        let store = JobStore::new();
        let record = store.create(URL).await;

        store
            .complete_direct(
                &record.id,
                "https://cdn.example.com/v.mp4".into(),
                Some(1024),
                "video/mp4".into(),
                "clip.mp4".into(),
            )
            .await
            .unwrap();

        let done = store.get(&record.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(matches!(done.artifact, Some(ArtifactRef::Direct { .. })));
    }

    #[tokio::test]
    async fn queued_can_fail_directly() {
        let store = JobStore::new();
        let record = store.create(URL).await;

        store.fail(&record.id, "upstream timed out after 15s").await.unwrap();

        let failed = store.get(&record.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_detail.as_deref(),
            Some("upstream timed out after 15s")
        );
        assert!(failed.artifact.is_none(), "failed jobs carry no artifact");
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let store = JobStore::new();
        let record = store.create(URL).await;
        store.fail(&record.id, "boom").await.unwrap();

        let err = store.mark_processing(&record.id).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Job(JobError::InvalidTransition {
                    from: JobStatus::Failed,
                    to: JobStatus::Processing,
                    ..
                })
            ),
            "got {err:?}"
        );

        // Completing a failed job must also be rejected
        let err = store
            .complete_direct(
                &record.id,
                "https://cdn.example.com/v".into(),
                None,
                "video/mp4".into(),
                "v".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Job(JobError::InvalidTransition { .. })));

        // And the record is unchanged
        let unchanged = store.get(&record.id).await.unwrap();
        assert_eq!(unchanged.status, JobStatus::Failed);
        assert_eq!(unchanged.error_detail.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn processing_cannot_regress_to_processing() {
        let store = JobStore::new();
        let record = store.create(URL).await;
        store.mark_processing(&record.id).await.unwrap();

        let err = store.mark_processing(&record.id).await.unwrap_err();
        assert!(matches!(err, Error::Job(JobError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_capped() {
        let store = JobStore::new();
        let record = store.create(URL).await;
        store.mark_processing(&record.id).await.unwrap();

        store.set_progress(&record.id, 40).await.unwrap();
        store.set_progress(&record.id, 25).await.unwrap();
        assert_eq!(
            store.get(&record.id).await.unwrap().progress_percent,
            40,
            "a lower percentage must not regress the recorded progress"
        );

        store.set_progress(&record.id, 200).await.unwrap();
        assert_eq!(
            store.get(&record.id).await.unwrap().progress_percent,
            100,
            "progress is capped at 100"
        );
    }

    #[tokio::test]
    async fn progress_on_terminal_record_is_ignored_not_applied() {
        let store = JobStore::new();
        let record = store.create(URL).await;
        store.fail(&record.id, "boom").await.unwrap();

        store.set_progress(&record.id, 55).await.unwrap();

        assert_eq!(
            store.get(&record.id).await.unwrap().progress_percent,
            0,
            "late progress lines must not mutate a terminal record"
        );
    }

    #[tokio::test]
    async fn try_admit_rejects_at_the_ceiling() {
        let store = JobStore::new();
        store.try_admit(URL, 2).await.unwrap();
        store.try_admit(URL, 2).await.unwrap();

        let err = store.try_admit(URL, 2).await.unwrap_err();
        match err {
            Error::CapacityExceeded { active, limit } => {
                assert_eq!(active, 2);
                assert_eq!(limit, 2);
            }
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_jobs_free_their_admission_slot() {
        let store = JobStore::new();
        let first = store.try_admit(URL, 1).await.unwrap();
        assert!(store.try_admit(URL, 1).await.is_err());

        store.fail(&first.id, "gone").await.unwrap();

        assert!(
            store.try_admit(URL, 1).await.is_ok(),
            "a failed job no longer counts against the ceiling"
        );
    }

    #[tokio::test]
    async fn concurrent_admissions_never_overshoot_the_ceiling() {
        let store = Arc::new(JobStore::new());
        let ceiling = 5;

        let attempts: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.try_admit(URL, ceiling).await.is_ok() })
            })
            .collect();

        let admitted = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|result| *result.as_ref().unwrap())
            .count();

        assert_eq!(
            admitted, ceiling,
            "exactly ceiling admissions may succeed under contention"
        );
        assert_eq!(store.active_count().await, ceiling);
    }

    #[tokio::test]
    async fn sweep_removes_only_old_terminal_records() {
        let store = JobStore::new();

        let old_done = store.create(URL).await;
        store.fail(&old_done.id, "old failure").await.unwrap();
        let still_active = store.create(URL).await;
        let fresh_done = store.create(URL).await;
        store.fail(&fresh_done.id, "fresh failure").await.unwrap();

        // Backdate the first terminal record past the cutoff
        {
            let mut jobs = store.jobs.lock().await;
            let record = jobs.get_mut(&old_done.id).unwrap();
            record.created_at = Utc::now() - chrono::Duration::hours(2);
            // Backdate the active record too: age alone must not sweep it
            let record = jobs.get_mut(&still_active.id).unwrap();
            record.created_at = Utc::now() - chrono::Duration::hours(2);
        }

        let removed = store.sweep(Duration::from_secs(3600)).await;

        assert_eq!(removed, 1, "only the old terminal record is swept");
        assert!(store.get(&old_done.id).await.is_none());
        assert!(
            store.get(&still_active.id).await.is_some(),
            "active records are never swept regardless of age"
        );
        assert!(store.get(&fresh_done.id).await.is_some());
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let store = JobStore::new();
        let first = store.create("https://example.com/1").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = store.create("https://example.com/2").await;

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }
}
