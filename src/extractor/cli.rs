//! CLI-based extractor using the external `yt-dlp` binary
//!
//! Invokes the tool for metadata probes (`--dump-single-json`) and downloads,
//! parses its progress lines into integer percents, and uses `ffmpeg` for
//! metadata tag editing.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{ExtractRequest, MediaExtractor, TagEditRequest};
use crate::config::{DownloadConfig, ToolsConfig};
use crate::error::{Error, Result};
use crate::types::{MediaFormat, MediaMetadata};

/// Binary name searched in PATH when no explicit path is configured
const EXTRACTOR_BINARY: &str = "yt-dlp";

/// Binary name for the tag editor
const FFMPEG_BINARY: &str = "ffmpeg";

/// Browser-like user agent passed to the tool to avoid throttling heuristics
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Audio quality passed to the tool when extracting audio
const AUDIO_QUALITY: &str = "192K";

/// How much stderr to keep in error messages
const STDERR_SNIPPET_LEN: usize = 500;

fn progress_line() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%")
            .unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

/// CLI-based extractor shelling out to `yt-dlp`
///
/// # Examples
///
/// ```no_run
/// use media_dl::extractor::{CliExtractor, MediaExtractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = CliExtractor::from_path()
///     .expect("yt-dlp not found in PATH");
///
/// let metadata = extractor.probe("https://example.com/watch?v=abc").await?;
/// println!("{} formats for {}", metadata.formats.len(), metadata.title);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CliExtractor {
    binary_path: PathBuf,
    ffmpeg_path: Option<PathBuf>,
    extra_args: Vec<String>,
    max_resolution: u32,
    supported_qualities: Vec<u32>,
}

impl CliExtractor {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            ffmpeg_path: which::which(FFMPEG_BINARY).ok(),
            extra_args: Vec::new(),
            max_resolution: 1080,
            supported_qualities: vec![360, 720, 1080],
        }
    }

    /// Attempt to find the extractor binary in PATH
    pub fn from_path() -> Option<Self> {
        which::which(EXTRACTOR_BINARY).ok().map(Self::new)
    }

    /// Build an extractor from configuration
    ///
    /// Uses the explicitly configured paths when present, searches PATH when
    /// allowed, and errors when no extractor binary can be located.
    pub fn resolve(tools: &ToolsConfig, download: &DownloadConfig) -> Result<Self> {
        let binary_path = match &tools.extractor_path {
            Some(path) => path.clone(),
            None if tools.search_path => which::which(EXTRACTOR_BINARY).map_err(|_| {
                Error::NotSupported(format!(
                    "extractor binary '{EXTRACTOR_BINARY}' not found in PATH"
                ))
            })?,
            None => {
                return Err(Error::Config {
                    message: "no extractor binary configured and PATH search is disabled"
                        .to_string(),
                    key: Some("extractor_path".to_string()),
                });
            }
        };

        let ffmpeg_path = match &tools.ffmpeg_path {
            Some(path) => Some(path.clone()),
            None if tools.search_path => which::which(FFMPEG_BINARY).ok(),
            None => None,
        };

        Ok(Self {
            binary_path,
            ffmpeg_path,
            extra_args: tools.extra_args.clone(),
            max_resolution: download.max_resolution,
            supported_qualities: download.supported_qualities.clone(),
        })
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--user-agent")
            .arg(USER_AGENT);
        for arg in &self.extra_args {
            command.arg(arg);
        }
        command
    }
}

#[async_trait]
impl MediaExtractor for CliExtractor {
    async fn probe(&self, url: &str) -> Result<MediaMetadata> {
        let output = self
            .base_command()
            .arg("--dump-single-json")
            .arg("--format")
            .arg(format!("best[height<={}]", self.max_resolution))
            .arg(url)
            .output()
            .await
            .map_err(|e| launch_error(&self.binary_path, e))?;

        if !output.status.success() {
            return Err(Error::UpstreamFailure(format!(
                "metadata probe failed: {}",
                stderr_snippet(&output.stderr)
            )));
        }

        parse_metadata(&output.stdout, self.max_resolution, &self.supported_qualities)
    }

    async fn fetch(&self, request: ExtractRequest) -> Result<()> {
        let mut command = self.base_command();
        command
            .arg("--newline")
            .arg("--progress")
            .arg("--format")
            .arg(&request.format_spec)
            .arg("--output")
            .arg(&request.dest_path);

        if request.extract_audio {
            command
                .arg("--extract-audio")
                .arg("--audio-format")
                .arg(&request.audio_format)
                .arg("--audio-quality")
                .arg(AUDIO_QUALITY);
        } else {
            command.arg("--merge-output-format").arg("mp4");
        }

        command.arg(&request.source_url);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| launch_error(&self.binary_path, e))?;

        // Drain stdout line by line for progress; drain stderr concurrently so
        // a chatty tool cannot deadlock on a full pipe
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let progress_tx = request.progress_tx.clone();

        let stdout_task = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let (Some(percent), Some(tx)) = (parse_progress_line(&line), &progress_tx) {
                    tx.send(percent).ok();
                }
            }
        });

        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_string(&mut buffer).await.ok();
            }
            buffer
        });

        let status = child
            .wait()
            .await
            .map_err(|e| launch_error(&self.binary_path, e))?;
        stdout_task.await.ok();
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::UpstreamFailure(format!(
                "extractor exited with {}: {}",
                status,
                stderr_snippet(stderr_output.as_bytes())
            )));
        }

        Ok(())
    }

    async fn edit_tags(&self, request: TagEditRequest) -> Result<()> {
        let Some(ffmpeg_path) = &self.ffmpeg_path else {
            return Err(Error::NotSupported(
                "ffmpeg not available for tag editing".to_string(),
            ));
        };

        let tagged_path = request.path.with_extension(match request.path.extension() {
            Some(ext) => format!("tagged.{}", ext.to_string_lossy()),
            None => "tagged".to_string(),
        });

        let mut command = Command::new(ffmpeg_path);
        command
            .arg("-y")
            .arg("-i")
            .arg(&request.path)
            .arg("-metadata")
            .arg(format!("title={}", request.title));
        if let Some(artist) = &request.artist {
            command.arg("-metadata").arg(format!("artist={artist}"));
        }
        command.arg("-codec").arg("copy").arg(&tagged_path);

        let output = command
            .output()
            .await
            .map_err(|e| launch_error(ffmpeg_path, e))?;

        if !output.status.success() {
            tokio::fs::remove_file(&tagged_path).await.ok();
            return Err(Error::UpstreamFailure(format!(
                "tag edit failed: {}",
                stderr_snippet(&output.stderr)
            )));
        }

        tokio::fs::rename(&tagged_path, &request.path).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }
}

fn launch_error(binary: &std::path::Path, e: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("failed to launch '{}': {}", binary.display(), e),
    ))
}

fn stderr_snippet(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(no diagnostic output)".to_string();
    }
    trimmed.chars().take(STDERR_SNIPPET_LEN).collect()
}

/// Parse one tool output line into an integer progress percent
fn parse_progress_line(line: &str) -> Option<u8> {
    let captures = progress_line().captures(line)?;
    let percent: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(percent.min(100.0) as u8)
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    height: Option<f64>,
    fps: Option<f32>,
    filesize: Option<u64>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    url: Option<String>,
}

fn parse_metadata(
    stdout: &[u8],
    max_resolution: u32,
    supported_qualities: &[u32],
) -> Result<MediaMetadata> {
    let info: RawInfo = serde_json::from_slice(stdout)
        .map_err(|e| Error::UpstreamFailure(format!("unparseable metadata output: {e}")))?;

    let has_audio_only = info.formats.iter().any(|format| {
        format.vcodec.as_deref() == Some("none") && format.acodec.as_deref() != Some("none")
    });

    Ok(MediaMetadata {
        id: info.id.unwrap_or_default(),
        title: info.title.unwrap_or_else(|| "video".to_string()),
        thumbnail: info.thumbnail,
        duration_seconds: info.duration.map(|d| d.max(0.0) as u64),
        uploader: info.uploader,
        formats: filter_formats(&info.formats, max_resolution, supported_qualities),
        has_audio_only,
    })
}

/// Reduce the tool's raw format list to one entry per supported quality bucket
///
/// Audio-only entries are excluded from the main list, formats above the
/// resolution cap are dropped, the rest are grouped by nearest supported
/// quality keeping the largest declared file size per bucket, and the result
/// is sorted best first.
fn filter_formats(
    raw: &[RawFormat],
    max_resolution: u32,
    supported_qualities: &[u32],
) -> Vec<MediaFormat> {
    let mut by_bucket: HashMap<u32, &RawFormat> = HashMap::new();

    for format in raw {
        if format.vcodec.as_deref() == Some("none") {
            continue;
        }
        let Some(height) = format.height.map(|h| h as u32).filter(|h| *h > 0) else {
            continue;
        };
        if height > max_resolution {
            continue;
        }

        let Some(bucket) = supported_qualities
            .iter()
            .copied()
            .min_by_key(|q| q.abs_diff(height))
        else {
            continue;
        };

        match by_bucket.get(&bucket) {
            Some(existing) => {
                if let (Some(new_size), Some(existing_size)) = (format.filesize, existing.filesize)
                    && new_size > existing_size
                {
                    by_bucket.insert(bucket, format);
                }
            }
            None => {
                by_bucket.insert(bucket, format);
            }
        }
    }

    let mut formats: Vec<(u32, &RawFormat)> = by_bucket.into_iter().collect();
    formats.sort_by(|a, b| b.0.cmp(&a.0));

    formats
        .into_iter()
        .map(|(bucket, format)| MediaFormat {
            format_id: format.format_id.clone().unwrap_or_default(),
            resolution: format!("{bucket}p"),
            fps: format.fps,
            filesize: format.filesize,
            ext: format.ext.clone(),
            vcodec: format.vcodec.clone(),
            acodec: format.acodec.clone(),
            url: format.url.clone(),
        })
        .collect()
}
