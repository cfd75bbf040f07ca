//! Deterministic filename synthesis and on-disk path resolution.
//!
//! Synthesized names follow
//! `brand[_account]_YYYY-MM-DD_kind[_index][_status].ext`, each textual
//! component restricted to `[a-z0-9-]` and capped at
//! [`MAX_COMPONENT_CHARS`] characters.

use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::extract::{AdMetadata, MediaItem, UNKNOWN_BRAND};

/// Cap applied to each textual filename component.
pub const MAX_COMPONENT_CHARS: usize = 20;

/// Extensions accepted verbatim from the URL path.
pub const ALLOWED_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "webm"];

/// Extension used when nothing else resolves.
pub const DEFAULT_EXTENSION: &str = "jpg";

const MIME_EXTENSIONS: [(&str, &str); 7] = [
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/webm", "webm"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

type ExtensionStrategy = fn(&MediaItem) -> Option<&'static str>;

/// Extension waterfall in priority order; [`DEFAULT_EXTENSION`] closes it.
const EXTENSION_STRATEGIES: [ExtensionStrategy; 3] =
    [extension_from_url, extension_from_mime, extension_from_mp4_hint];

/// Builds the filename for one media item of a candidate.
///
/// `index` is the item's position among the candidate's media; it only shows
/// up in the name when greater than zero.
#[must_use]
pub fn synthesize(item: &MediaItem, metadata: &AdMetadata, index: usize) -> String {
    let brand = non_empty_or(sanitize_component(&metadata.brand), UNKNOWN_BRAND);
    let account = sanitize_component(&metadata.account);

    let mut parts = vec![brand.clone()];
    if !account.is_empty() && account != brand {
        parts.push(account);
    }
    parts.push(metadata.date.format("%Y-%m-%d").to_string());
    parts.push(item.kind.as_str().to_string());
    if index > 0 {
        parts.push(index.to_string());
    }
    if let Some(status) = metadata.status.token() {
        parts.push(status.to_string());
    }
    format!("{}.{}", parts.join("_"), resolve_extension(item))
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        sanitize_component(fallback)
    } else {
        value
    }
}

/// Lowercases, turns whitespace into `-`, drops everything outside
/// `[a-z0-9-]` and caps the result.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.trim().chars() {
        let mapped = if ch.is_whitespace() {
            '-'
        } else {
            ch.to_ascii_lowercase()
        };
        if !(mapped.is_ascii_lowercase() || mapped.is_ascii_digit() || mapped == '-') {
            continue;
        }
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }
    let capped: String = out.chars().take(MAX_COMPONENT_CHARS).collect();
    capped.trim_matches('-').to_string()
}

/// Runs the extension waterfall.
#[must_use]
pub fn resolve_extension(item: &MediaItem) -> &'static str {
    EXTENSION_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(item))
        .unwrap_or(DEFAULT_EXTENSION)
}

fn extension_from_url(item: &MediaItem) -> Option<&'static str> {
    let parsed = Url::parse(&item.url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext)
}

fn extension_from_mime(item: &MediaItem) -> Option<&'static str> {
    let mime = item.mime.as_deref()?.split(';').next()?.trim().to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == mime)
        .map(|(_, ext)| *ext)
}

fn extension_from_mp4_hint(item: &MediaItem) -> Option<&'static str> {
    item.url.contains("mp4").then_some("mp4")
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Resolves a free path for `filename` in `dir`, the `uniquify` conflict
/// policy: `a.mp4`, then `a (1).mp4`, `a (2).mp4`, ...
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.contains('/')
            || sanitized.contains('\\')
            || sanitized.trim_matches('_').is_empty()
        {
            "download.bin".to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };
    for i in 1..1000 {
        let candidate = dir.join(format!("{stem} ({i}){ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
