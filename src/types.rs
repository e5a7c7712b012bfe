//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a download job
///
/// Opaque token assigned at submission. Ids are random (UUID v4) and never
/// reused within or across process lifetimes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a fresh random job id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Job status
///
/// Legal transitions: `Queued -> Processing -> {Completed, Failed}` plus the
/// direct short-circuit `Queued -> Completed`. `Completed` and `Failed` are
/// terminal; no transition leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Admitted and waiting for metadata resolution or a free executor
    Queued,
    /// Extraction work handed to the executor pool
    Processing,
    /// Finished with a local artifact or a direct URL
    Completed,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions permitted)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a job in this status counts against the concurrency ceiling
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Where a completed job's artifact lives
///
/// Exactly one variant is set on a completed record: either a locally
/// produced file or a remote location the client can fetch directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Locally extracted file
    Local {
        /// Path of the produced file under the artifact root
        path: PathBuf,
        /// Size in bytes, recorded after verification
        size: u64,
        /// MIME type derived from the file extension
        content_type: String,
        /// Sanitized display name offered to clients
        display_name: String,
    },
    /// Remote location served by redirect, no local file produced
    Direct {
        /// The directly fetchable URL
        url: String,
        /// Declared size in bytes, when the upstream advertises one
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
        /// MIME type derived from the format container
        content_type: String,
        /// Sanitized display name offered to clients
        display_name: String,
    },
}

/// One job record, owned by the job store
///
/// Mutated only through the store's API; all reads hand out clones.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobRecord {
    /// Unique job identifier
    pub id: JobId,

    /// Source URL the job was submitted with
    pub source_url: String,

    /// Current status
    pub status: JobStatus,

    /// Progress percentage, 0-100, monotonically non-decreasing while active
    pub progress_percent: u8,

    /// Error message, present iff status is Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// Artifact location, present iff status is Completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,

    /// When the job was admitted (used by the retention sweeper)
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a fresh Queued record
    pub fn new(id: JobId, source_url: impl Into<String>) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            status: JobStatus::Queued,
            progress_percent: 0,
            error_detail: None,
            artifact: None,
            created_at: Utc::now(),
        }
    }
}

/// Progress view returned by the query boundary
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobProgress {
    /// Job identifier
    pub id: JobId,

    /// Current status
    pub status: JobStatus,

    /// Progress percentage, 0-100
    pub progress_percent: u8,

    /// Error message for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl From<&JobRecord> for JobProgress {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            progress_percent: record.progress_percent,
            error_detail: record.error_detail.clone(),
        }
    }
}

/// Artifact view returned by the retrieval boundary
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtifactInfo {
    /// Job identifier
    pub id: JobId,

    /// Local path or direct URL plus naming metadata
    pub artifact: ArtifactRef,
}

/// Options for submitting a download job
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct JobOptions {
    /// Specific format id to download (None = best available within limits)
    #[serde(default)]
    pub format_id: Option<String>,

    /// Extract audio only
    #[serde(default)]
    pub extract_audio: bool,

    /// Audio container when extracting audio (default: mp3)
    #[serde(default)]
    pub audio_format: Option<String>,

    /// Requested quality label, e.g. "720p" (None = configured maximum)
    #[serde(default)]
    pub quality: Option<String>,
}

/// Metadata resolved for a media source
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MediaMetadata {
    /// Upstream identifier of the media
    pub id: String,

    /// Title as reported by the upstream
    pub title: String,

    /// Thumbnail URL (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    /// Duration in seconds (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,

    /// Uploader/channel name (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,

    /// Filtered list of downloadable formats, best first
    pub formats: Vec<MediaFormat>,

    /// Whether the upstream offers an audio-only stream
    pub has_audio_only: bool,
}

/// One downloadable format of a media source
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MediaFormat {
    /// Upstream format identifier
    pub format_id: String,

    /// Display resolution label, e.g. "1080p"
    pub resolution: String,

    /// Frames per second (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,

    /// Declared file size in bytes (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,

    /// Container extension, e.g. "mp4"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,

    /// Video codec (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcodec: Option<String>,

    /// Audio codec (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,

    /// Directly fetchable remote location, when the upstream advertises one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job admitted to the store
    Queued {
        /// Job ID
        id: JobId,
        /// Source URL
        url: String,
    },

    /// Extraction work handed to the executor pool
    Processing {
        /// Job ID
        id: JobId,
    },

    /// Progress update
    Progress {
        /// Job ID
        id: JobId,
        /// Progress percentage (0-100)
        percent: u8,
    },

    /// Job completed
    Completed {
        /// Job ID
        id: JobId,
        /// True when the job completed by direct URL without local extraction
        direct: bool,
    },

    /// Job failed
    Failed {
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// Retention sweeper reclaimed an artifact
    ArtifactReclaimed {
        /// Path of the deleted file
        path: PathBuf,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    // --- JobStatus ---

    #[test]
    fn terminal_statuses_are_completed_and_failed() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn active_is_the_negation_of_terminal() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(
                status.is_active(),
                !status.is_terminal(),
                "{status:?} active/terminal must be complementary"
            );
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"failed\"").unwrap(),
            JobStatus::Failed
        );
    }

    // --- JobId ---

    #[test]
    fn job_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b, "two freshly generated ids must differ");
    }

    #[test]
    fn job_id_is_opaque_hex_without_hyphens() {
        let id = JobId::new();
        assert_eq!(id.as_str().len(), 32, "simple uuid form is 32 hex chars");
        assert!(
            id.as_str().chars().all(|c| c.is_ascii_hexdigit()),
            "simple uuid form contains only hex digits, got {id}"
        );
    }

    #[test]
    fn job_id_display_matches_inner_value() {
        let id = JobId::from("abc123");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn job_id_serializes_transparently() {
        let id = JobId::from("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    }

    // --- JobRecord ---

    #[test]
    fn new_record_starts_queued_with_no_artifact() {
        let record = JobRecord::new(JobId::new(), "https://example.com/watch?v=1");
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress_percent, 0);
        assert!(record.artifact.is_none());
        assert!(record.error_detail.is_none());
    }

    #[test]
    fn progress_view_carries_error_detail() {
        let mut record = JobRecord::new(JobId::from("j1"), "https://example.com/v");
        record.status = JobStatus::Failed;
        record.error_detail = Some("upstream failure: boom".to_string());

        let progress = JobProgress::from(&record);
        assert_eq!(progress.status, JobStatus::Failed);
        assert_eq!(
            progress.error_detail.as_deref(),
            Some("upstream failure: boom")
        );
    }

    // --- Event ---

    #[test]
    fn events_serialize_with_snake_case_type_tag() {
        let event = Event::Completed {
            id: JobId::from("j1"),
            direct: true,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["direct"], true);
    }

    #[test]
    fn artifact_ref_tags_by_kind() {
        let artifact = ArtifactRef::Direct {
            url: "https://cdn.example.com/v.mp4".into(),
            size: Some(1024),
            content_type: "video/mp4".into(),
            display_name: "clip.mp4".into(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&artifact).unwrap()).unwrap();
        assert_eq!(json["kind"], "direct");
        assert_eq!(json["url"], "https://cdn.example.com/v.mp4");
    }
}
