//! Media extraction: video and content-image references of a candidate.

use std::collections::HashSet;

use serde::Serialize;
use url::Url;

use crate::tree::{ContentTree, NodeId};

/// URI schemes that only live inside the hosting page and cannot be fetched.
pub const EPHEMERAL_SCHEMES: [&str; 4] = ["blob:", "data:", "mediastream:", "filesystem:"];

/// Host substrings identifying the content CDN.
pub const DEFAULT_CDN_PATTERNS: [&str; 2] = ["fbcdn", "scontent"];

/// Images smaller than this on either axis are treated as decoration.
pub const MIN_IMAGE_WIDTH: f64 = 100.0;
pub const MIN_IMAGE_HEIGHT: f64 = 100.0;

/// Accessible-text fragments marking profile pictures and logos.
pub const DEFAULT_AVATAR_HINTS: [&str; 3] = ["profile", "avatar", "logo"];

/// Kind of a media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Token used in filenames and stats.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable media reference found inside a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    /// Full URL as found in the page, query included.
    pub url: String,
    pub alt_text: String,
    /// Declared MIME type, when the page states one.
    pub mime: Option<String>,
}

impl MediaItem {
    /// Deduplication key: the URL without query or fragment.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        strip_query(&self.url)
    }
}

/// Tunables for image qualification.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaConfig {
    pub cdn_patterns: Vec<String>,
    pub min_image_width: f64,
    pub min_image_height: f64,
    pub avatar_hints: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cdn_patterns: DEFAULT_CDN_PATTERNS.iter().map(ToString::to_string).collect(),
            min_image_width: MIN_IMAGE_WIDTH,
            min_image_height: MIN_IMAGE_HEIGHT,
            avatar_hints: DEFAULT_AVATAR_HINTS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Removes the query and fragment of a URL.
///
/// Unparseable (relative) URLs are cut at the first `?` or `#`.
#[must_use]
pub fn strip_query(url: &str) -> String {
    if let Ok(mut parsed) = Url::parse(url) {
        parsed.set_query(None);
        parsed.set_fragment(None);
        return parsed.to_string();
    }
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_string()
}

/// Returns true for in-memory or transient URIs.
#[must_use]
pub fn is_ephemeral(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    EPHEMERAL_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Video sources of `scope` in document order, with declared MIME types.
///
/// A `<video src>` wins over its `<source>` children. Ephemeral URIs are
/// skipped.
#[must_use]
pub fn video_sources(tree: &ContentTree, scope: NodeId) -> Vec<(String, Option<String>)> {
    let mut sources = Vec::new();
    for video in tree.elements_by_tag(scope, "video") {
        let mime = tree.attr(video, "type").map(ToString::to_string);
        if let Some(src) = usable_src(tree, video) {
            sources.push((src.to_string(), mime));
            continue;
        }
        for source in tree.elements_by_tag(video, "source") {
            if let Some(src) = usable_src(tree, source) {
                let mime = tree
                    .attr(source, "type")
                    .map(ToString::to_string)
                    .or_else(|| mime.clone());
                sources.push((src.to_string(), mime));
            }
        }
    }
    sources
}

fn usable_src(tree: &ContentTree, node: NodeId) -> Option<&str> {
    tree.attr(node, "src")
        .map(str::trim)
        .filter(|src| !src.is_empty() && !is_ephemeral(src))
}

/// Content images of `scope` in document order.
#[must_use]
pub fn content_images(tree: &ContentTree, scope: NodeId, config: &MediaConfig) -> Vec<NodeId> {
    tree.elements_by_tag(scope, "img")
        .into_iter()
        .filter(|img| is_content_image(tree, *img, config))
        .collect()
}

/// Whether an `<img>` is served from the content CDN, large enough, and not
/// flagged as an avatar.
#[must_use]
pub fn is_content_image(tree: &ContentTree, img: NodeId, config: &MediaConfig) -> bool {
    let Some(src) = usable_src(tree, img) else {
        return false;
    };
    if !config
        .cdn_patterns
        .iter()
        .any(|pattern| src.contains(pattern.as_str()))
    {
        return false;
    }
    if let Some((width, height)) = rendered_size(tree, img)
        && (width < config.min_image_width || height < config.min_image_height)
    {
        return false;
    }
    !has_avatar_hint(tree, img, config)
}

/// Rendered size from geometry, else from `width`/`height` attributes.
fn rendered_size(tree: &ContentTree, img: NodeId) -> Option<(f64, f64)> {
    if let Some(rect) = tree.rect(img) {
        return Some((rect.width, rect.height));
    }
    let width = tree.attr(img, "width")?.trim().parse::<f64>().ok()?;
    let height = tree.attr(img, "height")?.trim().parse::<f64>().ok()?;
    Some((width, height))
}

fn has_avatar_hint(tree: &ContentTree, img: NodeId, config: &MediaConfig) -> bool {
    ["alt", "aria-label"]
        .iter()
        .filter_map(|name| tree.attr(img, name))
        .map(str::to_lowercase)
        .any(|text| {
            config
                .avatar_hints
                .iter()
                .any(|hint| text.contains(hint.as_str()))
        })
}

/// Collects the media of one candidate, videos first, deduplicated by
/// query-stripped URL.
#[must_use]
pub fn extract_media(tree: &ContentTree, scope: NodeId, config: &MediaConfig) -> Vec<MediaItem> {
    let mut deduper = MediaDeduper::default();
    let videos = video_sources(tree, scope)
        .into_iter()
        .map(|(url, mime)| MediaItem {
            kind: MediaKind::Video,
            url,
            alt_text: String::new(),
            mime,
        });
    let images = content_images(tree, scope, config)
        .into_iter()
        .filter_map(|img| {
            let url = usable_src(tree, img)?.to_string();
            Some(MediaItem {
                kind: MediaKind::Image,
                url,
                alt_text: tree.attr(img, "alt").unwrap_or_default().to_string(),
                mime: tree.attr(img, "type").map(ToString::to_string),
            })
        });
    videos
        .chain(images)
        .filter(|item| deduper.insert(item))
        .collect()
}

/// Tracks query-stripped URLs already taken.
#[derive(Debug, Default, Clone)]
pub struct MediaDeduper {
    seen: HashSet<String>,
}

impl MediaDeduper {
    /// Records the item and returns true if its stripped URL was new.
    pub fn insert(&mut self, item: &MediaItem) -> bool {
        self.seen.insert(item.dedup_key())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tree::Rect;

    fn region() -> (ContentTree, NodeId) {
        let mut tree = ContentTree::new(Rect::new(0.0, 0.0, 1000.0, 800.0));
        let root = tree.root();
        let region = tree.append_element(root, "div");
        (tree, region)
    }

    fn add_img(tree: &mut ContentTree, parent: NodeId, src: &str, size: f64) -> NodeId {
        let img = tree.append_element(parent, "img");
        tree.set_attr(img, "src", src);
        tree.set_rect(img, Rect::new(0.0, 0.0, size, size));
        img
    }

    #[test]
    fn test_strip_query_removes_query_and_fragment() {
        assert_eq!(
            strip_query("https://cdn.example/v.mp4?tok=1#t=3"),
            "https://cdn.example/v.mp4"
        );
        assert_eq!(strip_query("/relative/a.jpg?x=1"), "/relative/a.jpg");
    }

    #[test]
    fn test_is_ephemeral_detects_transient_schemes() {
        assert!(is_ephemeral("blob:https://www.facebook.com/abc"));
        assert!(is_ephemeral("data:image/png;base64,AAAA"));
        assert!(!is_ephemeral("https://video.fbcdn.net/v.mp4"));
    }

    #[test]
    fn test_video_src_skips_blob_and_reads_source_children() {
        let (mut tree, region) = region();
        let blob = tree.append_element(region, "video");
        tree.set_attr(blob, "src", "blob:https://host/123");
        let video = tree.append_element(region, "video");
        let source = tree.append_element(video, "source");
        tree.set_attr(source, "src", "https://video.fbcdn.net/a.webm");
        tree.set_attr(source, "type", "video/webm");

        let items = extract_media(&tree, region, &MediaConfig::default());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, MediaKind::Video);
        assert_eq!(items[0].url, "https://video.fbcdn.net/a.webm");
        assert_eq!(items[0].mime.as_deref(), Some("video/webm"));
    }

    #[test]
    fn test_images_require_cdn_size_and_no_avatar_hint() {
        let (mut tree, region) = region();
        add_img(&mut tree, region, "https://other.example/a.jpg", 400.0);
        add_img(&mut tree, region, "https://scontent.fbcdn.net/tiny.jpg", 40.0);
        let avatar = add_img(&mut tree, region, "https://scontent.fbcdn.net/me.jpg", 400.0);
        tree.set_attr(avatar, "alt", "Acme profile picture");
        let keep = add_img(&mut tree, region, "https://scontent.fbcdn.net/ad.jpg", 400.0);
        tree.set_attr(keep, "alt", "Summer sale");

        let items = extract_media(&tree, region, &MediaConfig::default());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://scontent.fbcdn.net/ad.jpg");
        assert_eq!(items[0].alt_text, "Summer sale");
    }

    #[test]
    fn test_image_size_falls_back_to_attributes() {
        let (mut tree, region) = region();
        let img = tree.append_element(region, "img");
        tree.set_attr(img, "src", "https://scontent.fbcdn.net/small.jpg");
        tree.set_attr(img, "width", "60");
        tree.set_attr(img, "height", "60");

        assert!(!is_content_image(&tree, img, &MediaConfig::default()));
    }

    #[test]
    fn test_extract_media_dedups_by_stripped_url_and_orders_videos_first() {
        let (mut tree, region) = region();
        add_img(&mut tree, region, "https://scontent.fbcdn.net/a.jpg?x=1", 300.0);
        add_img(&mut tree, region, "https://scontent.fbcdn.net/a.jpg?x=2", 300.0);
        let video = tree.append_element(region, "video");
        tree.set_attr(video, "src", "https://cdn.example/v.mp4?tok=1");

        let items = extract_media(&tree, region, &MediaConfig::default());
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example/v.mp4?tok=1",
                "https://scontent.fbcdn.net/a.jpg?x=1"
            ]
        );
    }

    #[test]
    fn test_deduper_tracks_keys() {
        let mut deduper = MediaDeduper::default();
        let item = MediaItem {
            kind: MediaKind::Image,
            url: "https://scontent.fbcdn.net/a.jpg?x=1".to_string(),
            alt_text: String::new(),
            mime: None,
        };
        assert!(deduper.insert(&item));
        assert!(!deduper.insert(&MediaItem {
            url: "https://scontent.fbcdn.net/a.jpg?x=9".to_string(),
            ..item
        }));
        assert_eq!(deduper.len(), 1);
    }
}
