//! Candidate discovery over the content tree.
//!
//! Discovery first looks for the precise structural marker of an ad card. If
//! the page has none, it falls back to scanning block-level regions that
//! carry media and are large enough to be a card. Regions that already carry
//! the affordance marker are excluded by [`DiscoveryEngine::discover`] so a
//! region never receives two affordances.

mod scheduler;

pub use scheduler::{DebounceConfig, HostSignal, RescanScheduler};

use tracing::{debug, instrument};

use crate::extract::media::{self, MediaConfig};
use crate::identity::{self, Fingerprint};
use crate::tree::{ContentTree, NodeId, Rect};

/// Attribute set on regions that already received an affordance.
pub const AFFORDANCE_ATTRIBUTE: &str = "data-ads-downloader";
pub const AFFORDANCE_VALUE: &str = "affordance";
/// Class of the appended download button.
pub const AFFORDANCE_BUTTON_CLASS: &str = "ads-downloader-btn";
/// Attribute of the button holding the region fingerprint.
pub const FINGERPRINT_ATTRIBUTE: &str = "data-fingerprint";

pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-testid";
pub const DEFAULT_MARKER_VALUE: &str = "ad_library_result";
pub const DEFAULT_BLOCK_TAGS: [&str; 6] = ["div", "section", "article", "li", "main", "aside"];
pub const MIN_REGION_WIDTH: f64 = 250.0;
pub const MIN_REGION_HEIGHT: f64 = 150.0;

/// Discovery tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub marker_attribute: String,
    pub marker_value: String,
    pub block_tags: Vec<String>,
    /// Fallback regions must be strictly wider than this.
    pub min_region_width: f64,
    /// Fallback regions must be strictly taller than this.
    pub min_region_height: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            marker_value: DEFAULT_MARKER_VALUE.to_string(),
            block_tags: DEFAULT_BLOCK_TAGS.iter().map(ToString::to_string).collect(),
            min_region_width: MIN_REGION_WIDTH,
            min_region_height: MIN_REGION_HEIGHT,
        }
    }
}

/// A region hypothesized to be one ad, valid for one discovery pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub node: NodeId,
    /// Geometry at discovery time.
    pub rect: Option<Rect>,
    pub structural_key: String,
    pub fingerprint: Fingerprint,
}

/// Which strategy produced a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    Marker,
    Fallback,
}

/// Scans a tree for candidates.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    media: MediaConfig,
}

impl DiscoveryEngine {
    #[must_use]
    pub fn new(config: DiscoveryConfig, media: MediaConfig) -> Self {
        Self { config, media }
    }

    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    #[must_use]
    pub fn media_config(&self) -> &MediaConfig {
        &self.media
    }

    /// Candidates that do not carry an affordance yet, in document order.
    #[must_use]
    #[instrument(skip_all)]
    pub fn discover(&self, tree: &ContentTree) -> Vec<Candidate> {
        let (strategy, regions) = self.scan(tree);
        let candidates: Vec<Candidate> = regions
            .into_iter()
            .filter(|node| !has_affordance(tree, *node))
            .map(|node| self.candidate(tree, node))
            .collect();
        debug!(?strategy, found = candidates.len(), "discovery pass");
        candidates
    }

    /// Every candidate region, affordance or not, in document order.
    #[must_use]
    pub fn discover_all(&self, tree: &ContentTree) -> Vec<Candidate> {
        let (_, regions) = self.scan(tree);
        regions
            .into_iter()
            .map(|node| self.candidate(tree, node))
            .collect()
    }

    fn scan(&self, tree: &ContentTree) -> (DiscoveryStrategy, Vec<NodeId>) {
        let marked = self.marker_regions(tree);
        if !marked.is_empty() {
            return (DiscoveryStrategy::Marker, marked);
        }
        (DiscoveryStrategy::Fallback, self.fallback_regions(tree))
    }

    fn marker_regions(&self, tree: &ContentTree) -> Vec<NodeId> {
        tree.descendants(tree.root())
            .filter(|id| {
                tree.attr(*id, &self.config.marker_attribute)
                    == Some(self.config.marker_value.as_str())
            })
            .collect()
    }

    fn fallback_regions(&self, tree: &ContentTree) -> Vec<NodeId> {
        let qualifying: Vec<NodeId> = tree
            .descendants(tree.root())
            .filter(|id| self.qualifies_as_block(tree, *id))
            .collect();
        // Keep the innermost region of each nested chain.
        qualifying
            .iter()
            .copied()
            .filter(|outer| {
                !qualifying
                    .iter()
                    .any(|inner| inner != outer && tree.contains(*outer, *inner))
            })
            .collect()
    }

    fn qualifies_as_block(&self, tree: &ContentTree, node: NodeId) -> bool {
        let Some(tag) = tree.tag(node) else {
            return false;
        };
        if !self.config.block_tags.iter().any(|t| t == tag) {
            return false;
        }
        let Some(rect) = tree.rect(node) else {
            return false;
        };
        rect.width > self.config.min_region_width
            && rect.height > self.config.min_region_height
            && self.has_media_reference(tree, node)
    }

    fn has_media_reference(&self, tree: &ContentTree, node: NodeId) -> bool {
        if !tree.elements_by_tag(node, "video").is_empty() {
            return true;
        }
        tree.elements_by_tag(node, "img").into_iter().any(|img| {
            tree.attr(img, "src").is_some_and(|src| {
                self.media
                    .cdn_patterns
                    .iter()
                    .any(|pattern| src.contains(pattern.as_str()))
            })
        })
    }

    fn candidate(&self, tree: &ContentTree, node: NodeId) -> Candidate {
        let structural_key = identity::structural_key(tree, node);
        let fingerprint = identity::fingerprint_with_key(tree, node, &self.media, &structural_key);
        Candidate {
            node,
            rect: tree.rect(node),
            structural_key,
            fingerprint,
        }
    }

    /// Media of a candidate under this engine's media settings.
    #[must_use]
    pub fn media_of(&self, tree: &ContentTree, candidate: &Candidate) -> Vec<media::MediaItem> {
        media::extract_media(tree, candidate.node, &self.media)
    }
}

/// Whether a region already carries an affordance.
#[must_use]
pub fn has_affordance(tree: &ContentTree, node: NodeId) -> bool {
    tree.attr(node, AFFORDANCE_ATTRIBUTE) == Some(AFFORDANCE_VALUE)
}

/// Marks a region and appends its download button.
pub fn render_affordance(tree: &mut ContentTree, candidate: &Candidate) -> NodeId {
    tree.set_attr(candidate.node, AFFORDANCE_ATTRIBUTE, AFFORDANCE_VALUE);
    let button = tree.append_element(candidate.node, "button");
    tree.set_attr(button, "class", AFFORDANCE_BUTTON_CLASS);
    tree.set_attr(button, FINGERPRINT_ATTRIBUTE, candidate.fingerprint.as_str());
    // Label goes in an attribute so region text stays unchanged.
    tree.set_attr(button, "aria-label", "Download ad media");
    button
}

/// Removes every affordance marker and button. Returns the number of regions
/// that were unmarked.
pub fn strip_affordances(tree: &mut ContentTree) -> usize {
    let root = tree.root();
    let buttons: Vec<NodeId> = tree
        .elements_by_tag(root, "button")
        .into_iter()
        .filter(|id| tree.attr(*id, "class") == Some(AFFORDANCE_BUTTON_CLASS))
        .collect();
    for button in buttons {
        tree.detach(button);
    }
    let marked: Vec<NodeId> = tree
        .descendants(root)
        .filter(|id| has_affordance(tree, *id))
        .collect();
    for node in &marked {
        tree.remove_attr(*node, AFFORDANCE_ATTRIBUTE);
    }
    marked.len()
}
