//! Stable fingerprints for candidates.
//!
//! A fingerprint is the first strategy hit of an ordered waterfall:
//!
//! 1. first non-ephemeral video source, query stripped
//! 2. first qualifying content image, query stripped
//! 3. structural key: rounded top/left plus a leading text excerpt
//!
//! The structural key is weak. It survives re-extraction on an unchanged
//! tree but not a layout shift, which is why it comes last.

use serde::{Deserialize, Serialize};

use crate::extract::media::{self, MediaConfig};
use crate::tree::{ContentTree, NodeId};

/// Characters of region text folded into the structural key.
const STRUCTURAL_EXCERPT_CHARS: usize = 50;

/// Derived key used for deduplication and idempotent processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

type IdentityStrategy = fn(&ContentTree, NodeId, &MediaConfig) -> Option<String>;

const IDENTITY_STRATEGIES: [IdentityStrategy; 2] = [first_video_key, first_image_key];

/// Computes the fingerprint of a region. Idempotent on an unchanged tree.
#[must_use]
pub fn fingerprint(tree: &ContentTree, node: NodeId, config: &MediaConfig) -> Fingerprint {
    fingerprint_with_key(tree, node, config, &structural_key(tree, node))
}

/// Same as [`fingerprint`] with a precomputed structural key.
#[must_use]
pub fn fingerprint_with_key(
    tree: &ContentTree,
    node: NodeId,
    config: &MediaConfig,
    structural_key: &str,
) -> Fingerprint {
    IDENTITY_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(tree, node, config))
        .map_or_else(|| Fingerprint::new(structural_key), Fingerprint::new)
}

fn first_video_key(tree: &ContentTree, node: NodeId, _config: &MediaConfig) -> Option<String> {
    media::video_sources(tree, node)
        .into_iter()
        .next()
        .map(|(url, _)| media::strip_query(&url))
}

fn first_image_key(tree: &ContentTree, node: NodeId, config: &MediaConfig) -> Option<String> {
    media::content_images(tree, node, config)
        .into_iter()
        .find_map(|img| tree.attr(img, "src"))
        .map(|src| media::strip_query(src.trim()))
}

/// Rounded geometry plus leading text, e.g. `pos:120:16:Acme Sponsored`.
#[must_use]
pub fn structural_key(tree: &ContentTree, node: NodeId) -> String {
    let (top, left) = tree
        .rect(node)
        .map_or((0.0, 0.0), |rect| (rect.top().round(), rect.left().round()));
    let excerpt: String = collapse_whitespace(&tree.text_content(node))
        .chars()
        .take(STRUCTURAL_EXCERPT_CHARS)
        .collect();
    format!("pos:{top}:{left}:{excerpt}")
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
