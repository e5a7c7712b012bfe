//! Utility functions for name sanitization, content types, and URL handling

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Maximum length of a sanitized display name, in characters
const MAX_DISPLAY_NAME_LEN: usize = 120;

/// Name used when sanitization empties the source title
const FALLBACK_DISPLAY_NAME: &str = "media_download";

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Keep word characters, dashes, underscores, dots, and spaces; everything
    // else is stripped (mirrors what the filesystems we target reject)
    RE.get_or_init(|| Regex::new(r"[^\w\-_\. ]").unwrap_or_else(|e| panic!("static regex: {e}")))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap_or_else(|e| panic!("static regex: {e}")))
}

/// Sanitize a media title into a safe display name
///
/// Strips characters illegal in file names, collapses whitespace runs, caps
/// the length, and falls back to a generic name if nothing survives.
pub fn sanitize_display_name(title: &str) -> String {
    let stripped = illegal_chars().replace_all(title, "");
    let collapsed = whitespace_runs().replace_all(stripped.trim(), " ");

    let mut name: String = collapsed.chars().take(MAX_DISPLAY_NAME_LEN).collect();
    name.truncate(name.trim_end().len());

    if name.is_empty() {
        FALLBACK_DISPLAY_NAME.to_string()
    } else {
        name
    }
}

/// MIME type for a file extension
pub fn content_type_for_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// MIME type for a file path, from its extension
pub fn content_type_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(content_type_for_ext)
        .unwrap_or("application/octet-stream")
}

/// Validate that a string is a usable media source URL
///
/// Requires an absolute http(s) URL with a host. Detailed reachability is the
/// upstream tool's concern; this only rejects input that can never work.
pub fn validate_source_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::Validation(format!("invalid URL '{raw}': {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "unsupported URL scheme '{}': only http and https are accepted",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(Error::Validation(format!("URL '{raw}' has no host")));
    }

    Ok(parsed)
}

/// Derive a display name from a direct URL's final path segment
///
/// Percent-decodes the segment and sanitizes it; returns None when the URL
/// has no usable segment, in which case callers fall back to the media title.
pub fn display_name_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    if last_segment.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(last_segment).ok()?;
    let name = sanitize_display_name(&decoded);
    if name == FALLBACK_DISPLAY_NAME {
        None
    } else {
        Some(name)
    }
}
