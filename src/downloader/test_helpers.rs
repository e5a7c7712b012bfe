//! Shared helpers for downloader tests: a scripted extractor and config
//! constructors with test-friendly timings.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::{ExtractRequest, MediaExtractor, TagEditRequest};
use crate::types::{MediaFormat, MediaMetadata};

/// What a scripted fetch call should do
pub(crate) enum FetchBehavior {
    /// Write these bytes to the destination path and succeed
    WriteBytes(Vec<u8>),
    /// Fail with an upstream error carrying this message
    Fail(String),
    /// Succeed without producing any file (simulates a lying tool)
    SkipWrite,
}

/// Scripted in-process extractor
pub(crate) struct MockExtractor {
    metadata: MediaMetadata,
    probe_delay: Option<Duration>,
    fetch_behavior: FetchBehavior,
    /// When set, fetch blocks until a permit is added
    fetch_gate: Option<Arc<tokio::sync::Semaphore>>,
    pub(crate) probe_calls: AtomicUsize,
    pub(crate) fetch_calls: AtomicUsize,
    pub(crate) tag_edit_calls: AtomicUsize,
}

impl MockExtractor {
    pub(crate) fn returning(metadata: MediaMetadata) -> Self {
        Self {
            metadata,
            probe_delay: None,
            fetch_behavior: FetchBehavior::WriteBytes(b"fake media payload".to_vec()),
            fetch_gate: None,
            probe_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            tag_edit_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    pub(crate) fn with_fetch(mut self, behavior: FetchBehavior) -> Self {
        self.fetch_behavior = behavior;
        self
    }

    pub(crate) fn gated(mut self, gate: Arc<tokio::sync::Semaphore>) -> Self {
        self.fetch_gate = Some(gate);
        self
    }
}

#[async_trait]
impl MediaExtractor for MockExtractor {
    async fn probe(&self, _url: &str) -> Result<MediaMetadata> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.metadata.clone())
    }

    async fn fetch(&self, request: ExtractRequest) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.fetch_gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        if let Some(tx) = &request.progress_tx {
            tx.send(42).ok();
            tx.send(97).ok();
        }

        match &self.fetch_behavior {
            FetchBehavior::WriteBytes(bytes) => {
                tokio::fs::write(&request.dest_path, bytes).await?;
                Ok(())
            }
            FetchBehavior::Fail(message) => Err(Error::UpstreamFailure(message.clone())),
            FetchBehavior::SkipWrite => Ok(()),
        }
    }

    async fn edit_tags(&self, _request: TagEditRequest) -> Result<()> {
        self.tag_edit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Metadata with a single 720p format and no direct URL
pub(crate) fn basic_metadata() -> MediaMetadata {
    MediaMetadata {
        id: "vid1".into(),
        title: "Test: A <Video>!".into(),
        thumbnail: None,
        duration_seconds: Some(120),
        uploader: Some("Test Channel".into()),
        formats: vec![MediaFormat {
            format_id: "f720".into(),
            resolution: "720p".into(),
            fps: Some(30.0),
            filesize: Some(4096),
            ext: Some("mp4".into()),
            vcodec: Some("avc1".into()),
            acodec: Some("mp4a".into()),
            url: None,
        }],
        has_audio_only: true,
    }
}

/// Metadata whose best format advertises a direct URL
pub(crate) fn direct_metadata(url: &str, filesize: Option<u64>) -> MediaMetadata {
    let mut metadata = basic_metadata();
    metadata.formats[0].url = Some(url.to_string());
    metadata.formats[0].filesize = filesize;
    metadata
}

/// Config pointing at a scratch directory, with fast verification timings
pub(crate) fn test_config(download_dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = download_dir.to_path_buf();
    config.download.verify_attempts = 2;
    config.download.verify_delay_ms = 10;
    config
}
