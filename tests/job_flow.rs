//! End-to-end job lifecycle tests against the public library API.
//!
//! A scripted extractor stands in for the external tool so every scenario is
//! deterministic: the happy path, the direct-URL short-circuit, the metadata
//! timeout, the concurrency ceiling, and retention reclamation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use media_dl::{
    ArtifactRef, Config, Error, ExtractRequest, JobId, JobOptions, JobStatus, MediaDownloader,
    MediaExtractor, MediaFormat, MediaMetadata, RetentionSweeper, TagEditRequest,
};

const URL: &str = "https://example.com/watch?v=integration";

/// Scripted extractor: configurable probe result/delay and fetch payload.
struct ScriptedExtractor {
    metadata: MediaMetadata,
    probe_delay: Option<Duration>,
    payload: Option<Vec<u8>>,
    fetch_gate: Option<Arc<tokio::sync::Semaphore>>,
    probe_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn new(metadata: MediaMetadata) -> Self {
        Self {
            metadata,
            probe_delay: None,
            payload: Some(b"0123456789abcdef".to_vec()),
            fetch_gate: None,
            probe_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MediaExtractor for ScriptedExtractor {
    async fn probe(&self, _url: &str) -> media_dl::Result<MediaMetadata> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.metadata.clone())
    }

    async fn fetch(&self, request: ExtractRequest) -> media_dl::Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        match &self.payload {
            Some(bytes) => {
                tokio::fs::write(&request.dest_path, bytes).await?;
                Ok(())
            }
            None => Err(Error::UpstreamFailure("scripted failure".into())),
        }
    }

    async fn edit_tags(&self, _request: TagEditRequest) -> media_dl::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn metadata(direct_url: Option<&str>, filesize: Option<u64>) -> MediaMetadata {
    MediaMetadata {
        id: "it1".into(),
        title: "Integration Clip".into(),
        thumbnail: None,
        duration_seconds: Some(42),
        uploader: Some("it channel".into()),
        formats: vec![MediaFormat {
            format_id: "f1".into(),
            resolution: "720p".into(),
            fps: Some(30.0),
            filesize,
            ext: Some("mp4".into()),
            vcodec: Some("avc1".into()),
            acodec: Some("mp4a".into()),
            url: direct_url.map(String::from),
        }],
        has_audio_only: false,
    }
}

fn config_for(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.to_path_buf();
    config.download.verify_attempts = 2;
    config.download.verify_delay_ms = 10;
    config
}

async fn wait_terminal(downloader: &MediaDownloader, id: &JobId) -> media_dl::JobProgress {
    for _ in 0..250 {
        let progress = downloader.get_progress(id).await.expect("job visible");
        if progress.status.is_terminal() {
            return progress;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal state in time");
}

#[tokio::test]
async fn happy_path_produces_servable_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(metadata(None, None)));
    let downloader = MediaDownloader::with_extractor(
        config_for(dir.path()),
        Arc::clone(&extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let id = downloader.start_job(URL, JobOptions::default()).await.unwrap();

    // Visible immediately after submission, in a non-terminal state or done
    let early = downloader.get_progress(&id).await.unwrap();
    assert!(matches!(
        early.status,
        JobStatus::Queued | JobStatus::Processing | JobStatus::Completed
    ));

    let done = wait_terminal(&downloader, &id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress_percent, 100);

    let artifact = downloader.get_artifact(&id).await.unwrap();
    match artifact.artifact {
        ArtifactRef::Local { path, size, .. } => {
            let on_disk = std::fs::metadata(&path).unwrap().len();
            assert_eq!(size, on_disk);
            assert_eq!(on_disk, 16, "payload length must match");
        }
        other => panic!("expected local artifact, got {other:?}"),
    }
    assert_eq!(extractor.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn direct_short_circuit_never_starts_an_executor() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(metadata(
        Some("https://cdn.example.com/clip.mp4"),
        Some(1024),
    )));
    let downloader = MediaDownloader::with_extractor(
        config_for(dir.path()),
        Arc::clone(&extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let id = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    let done = wait_terminal(&downloader, &id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        extractor.fetch_calls.load(Ordering::SeqCst),
        0,
        "no executor task may be created for a direct completion"
    );

    match downloader.get_artifact(&id).await.unwrap().artifact {
        ArtifactRef::Direct { url, size, .. } => {
            assert_eq!(url, "https://cdn.example.com/clip.mp4");
            assert_eq!(size, Some(1024));
        }
        other => panic!("expected direct artifact, got {other:?}"),
    }

    // No file was written into the artifact root
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn head_probe_supplies_missing_length_for_direct_candidates() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    // A 2 KiB body: hyper advertises its length on HEAD responses
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let direct_url = format!("{}/clip.mp4", server.uri());
    let extractor = Arc::new(ScriptedExtractor::new(metadata(Some(&direct_url), None)));

    let mut config = config_for(dir.path());
    // The mock server is plain http; allow it so the probe path is exercised
    config.download.allow_insecure_direct = true;

    let downloader = MediaDownloader::with_extractor(
        config,
        Arc::clone(&extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let id = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    let done = wait_terminal(&downloader, &id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(extractor.fetch_calls.load(Ordering::SeqCst), 0);
    match downloader.get_artifact(&id).await.unwrap().artifact {
        ArtifactRef::Direct { size, .. } => {
            assert_eq!(size, Some(2048), "size must come from the HEAD probe");
        }
        other => panic!("expected direct artifact, got {other:?}"),
    }
}

#[tokio::test]
async fn head_probe_over_the_bound_falls_back_to_extraction() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let direct_url = format!("{}/huge.mp4", server.uri());
    let extractor = Arc::new(ScriptedExtractor::new(metadata(Some(&direct_url), None)));

    let mut config = config_for(dir.path());
    config.download.allow_insecure_direct = true;
    // Bound below the probed length so the candidate is rejected
    config.download.direct_max_bytes = 1024;

    let downloader = MediaDownloader::with_extractor(
        config,
        Arc::clone(&extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let id = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    let done = wait_terminal(&downloader, &id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        extractor.fetch_calls.load(Ordering::SeqCst),
        1,
        "an oversized direct candidate must fall back to local extraction"
    );
}

#[tokio::test]
async fn metadata_timeout_fails_the_job_and_frees_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut extractor = ScriptedExtractor::new(metadata(None, None));
    extractor.probe_delay = Some(Duration::from_secs(600));

    let mut config = config_for(dir.path());
    config.download.metadata_timeout = Duration::from_millis(50);
    config.download.max_active_jobs = 1;

    let extractor = Arc::new(extractor);
    let downloader = MediaDownloader::with_extractor(
        config,
        Arc::clone(&extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let id = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    let done = wait_terminal(&downloader, &id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error_detail.unwrap().contains("timed out"));
    assert_eq!(
        extractor.fetch_calls.load(Ordering::SeqCst),
        0,
        "a timed-out job never reaches the pool"
    );

    // The single slot is free again
    assert!(downloader.start_job(URL, JobOptions::default()).await.is_ok());
}

#[tokio::test]
async fn ceiling_rejections_are_typed_and_recover() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let mut extractor = ScriptedExtractor::new(metadata(None, None));
    extractor.fetch_gate = Some(gate.clone());

    let mut config = config_for(dir.path());
    config.download.max_active_jobs = 2;

    let downloader = MediaDownloader::with_extractor(
        config,
        Arc::new(extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let first = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    let second = downloader.start_job(URL, JobOptions::default()).await.unwrap();

    match downloader.start_job(URL, JobOptions::default()).await {
        Err(Error::CapacityExceeded { active, limit }) => {
            assert_eq!(active, 2);
            assert_eq!(limit, 2);
        }
        other => panic!("expected CapacityExceeded, got {other:?}"),
    }

    gate.add_permits(2);
    wait_terminal(&downloader, &first).await;
    wait_terminal(&downloader, &second).await;

    assert!(
        downloader.start_job(URL, JobOptions::default()).await.is_ok(),
        "admission recovers once jobs reach terminal states"
    );
}

#[tokio::test]
async fn retention_pass_reclaims_artifacts_and_refuses_stale_handles() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(metadata(None, None)));
    let downloader = MediaDownloader::with_extractor(
        config_for(dir.path()),
        Arc::clone(&extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let id = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    wait_terminal(&downloader, &id).await;

    let served_path = match downloader.get_artifact(&id).await.unwrap().artifact {
        ArtifactRef::Local { path, .. } => path,
        other => panic!("expected local artifact, got {other:?}"),
    };
    assert!(served_path.exists());

    // Sweep with zero max age: everything finished is immediately reclaimable
    let (event_tx, _event_rx) = tokio::sync::broadcast::channel(16);
    let store = Arc::new(media_dl::JobStore::new());
    let sweeper = RetentionSweeper::new(
        dir.path().to_path_buf(),
        Duration::ZERO,
        store,
        event_tx,
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    let stats = sweeper.run_once().await;

    assert_eq!(stats.files_removed, 1);
    assert!(!served_path.exists(), "artifact file must be deleted");

    // The stale handle is refused, not served
    match downloader.get_artifact(&id).await {
        Err(Error::ArtifactIntegrity { .. }) => {}
        other => panic!("expected ArtifactIntegrity for a reclaimed artifact, got {other:?}"),
    }
}

#[tokio::test]
async fn metadata_is_cached_across_jobs_for_the_same_source() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = Arc::new(ScriptedExtractor::new(metadata(None, None)));
    let downloader = MediaDownloader::with_extractor(
        config_for(dir.path()),
        Arc::clone(&extractor) as Arc<dyn MediaExtractor>,
    )
    .await
    .unwrap();

    let first = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    wait_terminal(&downloader, &first).await;
    let second = downloader.start_job(URL, JobOptions::default()).await.unwrap();
    wait_terminal(&downloader, &second).await;

    assert_eq!(
        extractor.probe_calls.load(Ordering::SeqCst),
        1,
        "the second job must reuse the cached metadata"
    );
}
