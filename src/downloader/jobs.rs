//! Job admission and the asynchronous download pipeline.
//!
//! `start_job` validates input, atomically checks the concurrency ceiling,
//! and returns a job id promptly; the pipeline continues in a spawned task.
//! Every failure path taxonomizes its cause and writes it into the record's
//! error detail before the job reaches its terminal state.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::io::AsyncReadExt;

use super::MediaDownloader;
use crate::error::{Error, Result};
use crate::extractor::{self, ExtractRequest, TagEditRequest, TaskKind};
use crate::types::{Event, JobId, JobOptions, MediaFormat, MediaMetadata};
use crate::utils;

impl MediaDownloader {
    /// Submit a download job
    ///
    /// Returns the job id as soon as the job is admitted; the actual work
    /// continues asynchronously. Progress is observable via
    /// [`get_progress`](Self::get_progress) and the event stream.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] when shutdown has begun
    /// - [`Error::Validation`] for URLs that can never work
    /// - [`Error::CapacityExceeded`] when the concurrency ceiling is reached
    pub async fn start_job(&self, url: &str, options: JobOptions) -> Result<JobId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        utils::validate_source_url(url)?;

        let record = self
            .store
            .try_admit(url, self.config.max_active_jobs())
            .await?;
        let id = record.id.clone();

        tracing::info!(job_id = %id, url, "Job admitted");
        self.emit_event(Event::Queued {
            id: id.clone(),
            url: url.to_string(),
        });

        let downloader = self.clone();
        let pipeline_id = id.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            downloader.run_job(pipeline_id, url, options).await;
        });

        Ok(id)
    }

    /// Resolve metadata for a source URL, for callers that only want the probe
    ///
    /// Uses the same cache and timeout as the job pipeline.
    pub async fn probe_media(&self, url: &str) -> Result<MediaMetadata> {
        utils::validate_source_url(url)?;
        self.resolve_metadata(url).await
    }

    /// Run the pipeline for one admitted job and record its terminal state
    async fn run_job(&self, id: JobId, url: String, options: JobOptions) {
        match self.execute_job(&id, &url, &options).await {
            Ok(direct) => {
                tracing::info!(job_id = %id, direct, "Job completed");
                self.emit_event(Event::Completed {
                    id: id.clone(),
                    direct,
                });
            }
            Err(e) => {
                let detail = e.to_string();
                tracing::warn!(job_id = %id, error = %detail, "Job failed");
                if let Err(store_err) = self.store.fail(&id, detail.clone()).await {
                    tracing::error!(
                        job_id = %id,
                        error = %store_err,
                        "Could not record job failure"
                    );
                }
                self.emit_event(Event::Failed { id, error: detail });
            }
        }
    }

    /// Steps 2-5 of the pipeline; returns whether the job completed directly
    async fn execute_job(&self, id: &JobId, url: &str, options: &JobOptions) -> Result<bool> {
        // Metadata through the cache, bounded by the configured timeout
        let metadata = self.resolve_metadata(url).await?;
        self.store.set_progress(id, 10).await?;

        let display_base = utils::sanitize_display_name(&metadata.title);

        // Direct-artifact short-circuit: a safe directly fetchable location
        // completes the job without consuming an executor slot
        if !options.extract_audio
            && let Some(format) = extractor::select_format(&metadata, options)
            && let Some((direct_url, size)) = self.validate_direct_candidate(format).await
        {
            let ext = format.ext.as_deref().unwrap_or("mp4");
            let display_name = utils::display_name_from_url(&direct_url)
                .unwrap_or_else(|| format!("{display_base}.{ext}"));
            let content_type = utils::content_type_for_ext(ext).to_string();

            self.store
                .complete_direct(id, direct_url, size, content_type, display_name)
                .await?;
            tracing::debug!(job_id = %id, "Completed via direct short-circuit");
            return Ok(true);
        }

        // Local extraction through the worker pool
        self.store.mark_processing(id).await?;
        self.emit_event(Event::Processing { id: id.clone() });

        let (format_spec, ext) =
            extractor::format_spec_for(options, self.config.download.max_resolution);
        let dest_path = self
            .config
            .download
            .download_dir
            .join(format!("{id}.{ext}"));

        let (artifact_path, size) = match self
            .run_extraction(id, url, options, &format_spec, &dest_path)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                // Never leave partial output behind a failed job
                tokio::fs::remove_file(&dest_path).await.ok();
                return Err(e);
            }
        };

        // Tag editing is best-effort: an untagged artifact is still a result
        if options.extract_audio {
            let tag_task = TaskKind::TagEdit(TagEditRequest {
                path: artifact_path.clone(),
                title: metadata.title.clone(),
                artist: metadata.uploader.clone(),
            });
            if let Err(e) = self.pool.execute(tag_task).await {
                tracing::warn!(job_id = %id, error = %e, "Tag edit failed, keeping untagged artifact");
            }
        }

        // Name the download after the actual extension: the tool's
        // post-processors may have replaced the one we asked for
        let final_ext = artifact_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(&ext)
            .to_string();
        let content_type = utils::content_type_for_path(&artifact_path).to_string();
        self.store
            .complete_local(
                id,
                artifact_path,
                size,
                content_type,
                format!("{display_base}.{final_ext}"),
            )
            .await?;
        Ok(false)
    }

    /// Submit the extraction task and verify the produced artifact
    async fn run_extraction(
        &self,
        id: &JobId,
        url: &str,
        options: &JobOptions,
        format_spec: &str,
        dest_path: &Path,
    ) -> Result<(std::path::PathBuf, u64)> {
        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();

        // Forward parsed progress percents into the record; the store keeps
        // the sequence monotonic even if lines arrive out of order
        let store = Arc::clone(&self.store);
        let event_tx = self.event_tx.clone();
        let progress_id = id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(percent) = progress_rx.recv().await {
                store.set_progress(&progress_id, percent).await.ok();
                event_tx
                    .send(Event::Progress {
                        id: progress_id.clone(),
                        percent,
                    })
                    .ok();
            }
        });

        let task = TaskKind::Extract(ExtractRequest {
            source_url: url.to_string(),
            format_spec: format_spec.to_string(),
            dest_path: dest_path.to_path_buf(),
            extract_audio: options.extract_audio,
            audio_format: options
                .audio_format
                .clone()
                .unwrap_or_else(|| extractor::DEFAULT_AUDIO_FORMAT.to_string()),
            progress_tx: Some(progress_tx),
        });

        let pool_result = self.pool.execute(task).await;
        forwarder.await.ok();
        pool_result?;

        self.verify_artifact(id, dest_path).await
    }

    /// Resolve metadata through the cache, probing upstream on a miss
    pub(crate) async fn resolve_metadata(&self, url: &str) -> Result<MediaMetadata> {
        if let Some(metadata) = self.cache.get(url).await {
            tracing::debug!(url, "Metadata cache hit");
            return Ok(metadata);
        }

        let timeout = self.config.download.metadata_timeout;
        let metadata = tokio::time::timeout(timeout, self.extractor.probe(url))
            .await
            .map_err(|_| Error::UpstreamTimeout {
                seconds: timeout.as_secs(),
            })??;

        self.cache.set(url, metadata.clone()).await;
        Ok(metadata)
    }

    /// Check whether a resolved format qualifies for the direct short-circuit
    ///
    /// Requires secure transport and a declared (or probed) length within the
    /// configured bound. A candidate that fails any check falls through to
    /// local extraction; this is never an error.
    async fn validate_direct_candidate(&self, format: &MediaFormat) -> Option<(String, Option<u64>)> {
        let raw = format.url.as_deref()?;
        let parsed = url::Url::parse(raw).ok()?;
        if parsed.scheme() != "https" && !self.config.download.allow_insecure_direct {
            tracing::debug!(url = raw, "Direct candidate rejected: not https");
            return None;
        }

        let size = match format.filesize {
            Some(size) => size,
            None => self.probe_content_length(raw).await?,
        };
        if size > self.config.download.direct_max_bytes {
            tracing::debug!(
                url = raw,
                size,
                limit = self.config.download.direct_max_bytes,
                "Direct candidate rejected: declared size over limit"
            );
            return None;
        }

        Some((raw.to_string(), Some(size)))
    }

    /// HEAD-probe a direct URL for its content length
    ///
    /// Reads the Content-Length header directly: a HEAD response carries no
    /// body, so the body-based size hint would report zero.
    async fn probe_content_length(&self, url: &str) -> Option<u64> {
        let response = self.http.head(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    /// Verify the produced artifact exists, is non-empty, and is readable
    ///
    /// The producing process and this check may race on slow filesystems, so
    /// the check retries with a bounded delay before declaring the artifact
    /// broken. When the expected path is absent, the artifact root is scanned
    /// for another file named by the job id - the tool's post-processors can
    /// land the output under a different extension than requested.
    async fn verify_artifact(
        &self,
        id: &JobId,
        expected: &Path,
    ) -> Result<(std::path::PathBuf, u64)> {
        let attempts = self.config.download.verify_attempts.max(1);
        let delay = std::time::Duration::from_millis(self.config.download.verify_delay_ms);
        let mut last_reason = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            let Some(candidate) = self.locate_artifact(id, expected).await else {
                last_reason = "no output file found".to_string();
                continue;
            };

            match tokio::fs::metadata(&candidate).await {
                Err(e) => {
                    last_reason = format!("file not found: {e}");
                    continue;
                }
                Ok(metadata) if metadata.len() == 0 => {
                    last_reason = "file is empty".to_string();
                    continue;
                }
                Ok(metadata) => match Self::read_first_byte(&candidate).await {
                    Ok(()) => return Ok((candidate, metadata.len())),
                    Err(e) => {
                        last_reason = format!("file not readable: {e}");
                        continue;
                    }
                },
            }
        }

        Err(Error::ArtifactIntegrity {
            path: expected.to_path_buf(),
            reason: last_reason,
        })
    }

    /// Find the produced file: the expected path, or any file in the
    /// artifact root named by the job id
    async fn locate_artifact(&self, id: &JobId, expected: &Path) -> Option<std::path::PathBuf> {
        if tokio::fs::metadata(expected).await.is_ok() {
            return Some(expected.to_path_buf());
        }

        let mut entries = tokio::fs::read_dir(&self.config.download.download_dir)
            .await
            .ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(id.as_str())
            {
                tracing::debug!(
                    job_id = %id,
                    path = %entry.path().display(),
                    "Found artifact under an alternative name"
                );
                return Some(entry.path());
            }
        }
        None
    }

    async fn read_first_byte(path: &Path) -> std::io::Result<()> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut buffer = [0u8; 1];
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "no bytes readable",
            ));
        }
        Ok(())
    }
}
