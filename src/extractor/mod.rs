//! Media extraction seam
//!
//! This module defines the interface to the external media-extraction tool.
//! Implementations can shell out to a real binary ([`CliExtractor`]) or
//! provide scripted behavior for tests. The rest of the crate only sees the
//! [`MediaExtractor`] trait and the task types dispatched through the worker
//! pool.

mod cli;

pub use cli::CliExtractor;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{JobOptions, MediaFormat, MediaMetadata};
use crate::worker_pool::TaskRunner;

/// Default audio container when extracting audio without an explicit choice
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";

/// Request to produce a local artifact from a media source
#[derive(Debug)]
pub struct ExtractRequest {
    /// Source URL handed to the external tool
    pub source_url: String,

    /// Format selection expression for the external tool
    pub format_spec: String,

    /// Where the artifact must be written
    pub dest_path: PathBuf,

    /// Extract audio only
    pub extract_audio: bool,

    /// Audio container when extracting audio
    pub audio_format: String,

    /// Channel for integer progress percents parsed from the tool's output
    ///
    /// Dropped silently when the receiver goes away; progress is best-effort.
    pub progress_tx: Option<tokio::sync::mpsc::UnboundedSender<u8>>,
}

/// Request to embed title/artist metadata into a produced file
#[derive(Debug, Clone)]
pub struct TagEditRequest {
    /// File to edit in place
    pub path: PathBuf,

    /// Title tag value
    pub title: String,

    /// Artist tag value (uploader), when known
    pub artist: Option<String>,
}

/// Work item dispatched through the executor pool
///
/// One variant per task type; the runner matches on the variant to launch
/// the right external invocation.
#[derive(Debug)]
pub enum TaskKind {
    /// Run the external extraction tool
    Extract(ExtractRequest),
    /// Embed metadata tags with ffmpeg
    TagEdit(TagEditRequest),
}

/// Interface to the external media-extraction tool
///
/// `probe` resolves metadata without downloading; `fetch` produces a local
/// file; `edit_tags` embeds metadata into a produced file. Implementations
/// must be safe to share across tasks.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Resolve metadata (title, formats, ...) for a media source
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFailure`](crate::Error::UpstreamFailure) when the
    /// tool runs but rejects the URL, and `Io`/`NotSupported` errors when it
    /// cannot be launched at all.
    async fn probe(&self, url: &str) -> Result<MediaMetadata>;

    /// Download and transform a media source into a local file
    ///
    /// On success the file at `request.dest_path` exists; verification of its
    /// content is the caller's concern.
    async fn fetch(&self, request: ExtractRequest) -> Result<()>;

    /// Embed metadata tags into a produced file
    async fn edit_tags(&self, request: TagEditRequest) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Bridges the worker pool to a [`MediaExtractor`]
///
/// Each pool task is matched to the extractor call it stands for. The pool
/// only learns success or failure; everything else flows through the request
/// payload (destination path, progress channel).
pub struct ExtractorRunner {
    extractor: Arc<dyn MediaExtractor>,
}

impl ExtractorRunner {
    /// Wrap an extractor for use as a pool runner
    pub fn new(extractor: Arc<dyn MediaExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl TaskRunner<TaskKind> for ExtractorRunner {
    async fn run(&self, task: TaskKind) -> Result<()> {
        match task {
            TaskKind::Extract(request) => self.extractor.fetch(request).await,
            TaskKind::TagEdit(request) => self.extractor.edit_tags(request).await,
        }
    }
}

/// Pick the format a job's options resolve to
///
/// An explicit `format_id` wins; a quality label picks the matching bucket;
/// otherwise the best listed format (the list is sorted best first). Audio
/// jobs never resolve to a listed video format.
pub fn select_format<'a>(
    metadata: &'a MediaMetadata,
    options: &JobOptions,
) -> Option<&'a MediaFormat> {
    if options.extract_audio {
        return None;
    }
    if let Some(format_id) = &options.format_id {
        return metadata
            .formats
            .iter()
            .find(|format| &format.format_id == format_id);
    }
    if let Some(quality) = &options.quality {
        return metadata
            .formats
            .iter()
            .find(|format| &format.resolution == quality);
    }
    metadata.formats.first()
}

/// Build the format selection expression and output extension for a job
///
/// Mirrors the selection rules of the upstream tool: audio jobs take the best
/// audio stream; an explicit format id is merged with the best audio; the
/// default prefers an mp4/h264 + m4a combination capped at `max_resolution`
/// for maximum playback compatibility.
pub fn format_spec_for(options: &JobOptions, max_resolution: u32) -> (String, String) {
    if options.extract_audio {
        let ext = options
            .audio_format
            .clone()
            .unwrap_or_else(|| DEFAULT_AUDIO_FORMAT.to_string());
        return ("bestaudio/best".to_string(), ext);
    }

    if let Some(format_id) = &options.format_id {
        return (format!("{format_id}+bestaudio/best"), "mp4".to_string());
    }

    let height = options
        .quality
        .as_deref()
        .and_then(parse_quality_height)
        .unwrap_or(max_resolution)
        .min(max_resolution);

    (
        format!(
            "bestvideo[ext=mp4][vcodec^=avc][height<={height}]+bestaudio[ext=m4a]/best[ext=mp4][height<={height}]/best[height<={height}]"
        ),
        "mp4".to_string(),
    )
}

/// Parse a quality label like "720p" into its height
pub(crate) fn parse_quality_height(quality: &str) -> Option<u32> {
    quality.trim_end_matches('p').parse().ok()
}
