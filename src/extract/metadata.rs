//! Metadata extraction: brand, account, date, platforms, status, excerpt.
//!
//! Brand resolution is a data-driven waterfall of pure strategies. The first
//! strategy returning `Some` wins; when none does the brand is
//! [`UNKNOWN_BRAND`].

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::identity::collapse_whitespace;
use crate::tree::{ContentTree, NodeId};

/// Brand used when no strategy resolves one.
pub const UNKNOWN_BRAND: &str = "UnknownPage";

/// Literal that marks a paid placement.
pub const SPONSORED_MARKER: &str = "Sponsored";

/// Characters kept in [`AdMetadata::excerpt`].
pub const EXCERPT_CHARS: usize = 100;

const HEADING_TAGS: [&str; 7] = ["h1", "h2", "h3", "h4", "h5", "h6", "strong"];

/// Capitalized words that are page chrome rather than names.
const STRUCTURAL_STOP_WORDS: [&str; 18] = [
    "Sponsored",
    "Active",
    "Inactive",
    "Started",
    "Library",
    "ID",
    "See",
    "Learn",
    "More",
    "Platforms",
    "Ad",
    "Ads",
    "Details",
    "Summary",
    "Open",
    "Dropdown",
    "This",
    "The",
];

/// First path segments of facebook.com that are not page handles.
const RESERVED_ROUTES: [&str; 12] = [
    "ads",
    "help",
    "policies",
    "privacy",
    "business",
    "watch",
    "groups",
    "events",
    "l.php",
    "profile.php",
    "login",
    "hashtag",
];

const DATE_FORMATS: [&str; 5] = ["%b %d %Y", "%B %d %Y", "%d %b %Y", "%d %B %Y", "%Y-%m-%d"];

#[allow(clippy::expect_used)]
static STARTED_RUNNING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Started running on\s+([A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+[A-Za-z]{3,9}\.?,?\s+\d{4}|\d{4}-\d{2}-\d{2})",
    )
    .expect("started-running regex is valid") // Static pattern, safe to panic
});

/// Run state of an ad as shown in the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdStatus {
    Active,
    Inactive,
    Unknown,
}

impl AdStatus {
    /// Filename token, `None` when unknown.
    #[must_use]
    pub fn token(self) -> Option<&'static str> {
        match self {
            Self::Active => Some("active"),
            Self::Inactive => Some("inactive"),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.token().unwrap_or("unknown")
    }
}

/// Publishing platforms recognized from icon indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Facebook,
    Instagram,
}

/// Known platforms, in the order indicators are assigned to them.
pub const KNOWN_PLATFORMS: [Platform; 2] = [Platform::Facebook, Platform::Instagram];

/// Structured description of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdMetadata {
    pub brand: String,
    pub account: String,
    pub date: NaiveDate,
    pub platforms: BTreeSet<Platform>,
    pub status: AdStatus,
    pub excerpt: String,
}

/// Inputs that are not part of the tree.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext {
    /// Date used when no start date is shown.
    pub today: NaiveDate,
}

impl ExtractContext {
    #[must_use]
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Context anchored on the local calendar date.
    #[must_use]
    pub fn now() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }
}

/// Pre-collected view of a region shared by the brand strategies.
pub struct RegionText<'a> {
    pub tree: &'a ContentTree,
    pub node: NodeId,
    pub text: String,
}

impl<'a> RegionText<'a> {
    #[must_use]
    pub fn new(tree: &'a ContentTree, node: NodeId) -> Self {
        Self {
            tree,
            node,
            text: tree.text_content(node),
        }
    }
}

/// A brand strategy inspects a region and may name its brand.
pub type BrandStrategy = fn(&RegionText<'_>) -> Option<String>;

/// Brand waterfall in priority order.
pub const BRAND_STRATEGIES: [BrandStrategy; 4] = [
    heading_brand,
    capitalized_token_brand,
    token_before_sponsored_brand,
    page_handle,
];

/// Extracts metadata for a candidate region.
#[must_use]
pub fn extract(tree: &ContentTree, node: NodeId, ctx: &ExtractContext) -> AdMetadata {
    let region = RegionText::new(tree, node);
    let brand = resolve_brand(&region);
    let account = page_handle(&region).unwrap_or_else(|| brand.clone());
    let excerpt: String = collapse_whitespace(&region.text)
        .chars()
        .take(EXCERPT_CHARS)
        .collect();

    AdMetadata {
        brand,
        account,
        date: parse_start_date(&region.text).unwrap_or(ctx.today),
        platforms: detect_platforms(tree, node),
        status: detect_status(&region.text),
        excerpt,
    }
}

/// Runs [`BRAND_STRATEGIES`] and falls back to [`UNKNOWN_BRAND`].
#[must_use]
pub fn resolve_brand(region: &RegionText<'_>) -> String {
    BRAND_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(region))
        .unwrap_or_else(|| UNKNOWN_BRAND.to_string())
}

/// Short heading-like text: 3 to 19 characters, letters, digits and spaces.
#[must_use]
pub fn heading_brand(region: &RegionText<'_>) -> Option<String> {
    let tree = region.tree;
    tree.descendants(region.node)
        .filter(|id| {
            tree.tag(*id).is_some_and(|tag| HEADING_TAGS.contains(&tag))
                || tree.attr(*id, "role") == Some("heading")
        })
        .map(|id| collapse_whitespace(&tree.text_content(id)))
        .find(|text| is_heading_like(text))
}

fn is_heading_like(text: &str) -> bool {
    let len = text.chars().count();
    (3..=19).contains(&len)
        && text.chars().all(|c| c.is_alphanumeric() || c == ' ')
        && text != SPONSORED_MARKER
}

/// First capitalized word that is not page chrome.
#[must_use]
pub fn capitalized_token_brand(region: &RegionText<'_>) -> Option<String> {
    region
        .text
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|word| {
            word.chars().count() >= 2
                && word.chars().next().is_some_and(char::is_uppercase)
                && word.chars().all(char::is_alphanumeric)
                && !STRUCTURAL_STOP_WORDS.contains(word)
        })
        .map(ToString::to_string)
}

/// Last clean word directly before the sponsorship marker.
#[must_use]
pub fn token_before_sponsored_brand(region: &RegionText<'_>) -> Option<String> {
    let position = region.text.find(SPONSORED_MARKER)?;
    let token = region.text[..position]
        .split_whitespace()
        .next_back()?
        .trim_matches(|c: char| !c.is_alphanumeric());
    (!token.is_empty() && token.chars().all(char::is_alphanumeric)).then(|| token.to_string())
}

/// Page handle from the first facebook.com profile link.
#[must_use]
pub fn page_handle(region: &RegionText<'_>) -> Option<String> {
    let tree = region.tree;
    tree.elements_by_tag(region.node, "a")
        .into_iter()
        .filter_map(|link| tree.attr(link, "href"))
        .find_map(handle_from_href)
}

fn handle_from_href(href: &str) -> Option<String> {
    let base = Url::parse("https://www.facebook.com/").ok()?;
    let url = base.join(href.trim()).ok()?;
    if !url.host_str()?.contains("facebook.com") {
        return None;
    }
    let segment = url.path_segments()?.find(|s| !s.is_empty())?;
    if RESERVED_ROUTES.contains(&segment) {
        return None;
    }
    let decoded = urlencoding::decode(segment).ok()?.into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

/// Parses the date following "Started running on".
#[must_use]
pub fn parse_start_date(text: &str) -> Option<NaiveDate> {
    let raw = STARTED_RUNNING_PATTERN.captures(text)?.get(1)?.as_str();
    let normalized = collapse_whitespace(&raw.replace(['.', ','], " "));
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&normalized, format).ok())
}

/// `Active` is checked before `Inactive`; the first match wins.
#[must_use]
pub fn detect_status(text: &str) -> AdStatus {
    if text.contains("Active") {
        AdStatus::Active
    } else if text.contains("Inactive") {
        AdStatus::Inactive
    } else {
        AdStatus::Unknown
    }
}

/// Maps the number of icon indicators onto [`KNOWN_PLATFORMS`].
#[must_use]
pub fn detect_platforms(tree: &ContentTree, node: NodeId) -> BTreeSet<Platform> {
    let icons = tree
        .descendants(node)
        .filter(|id| {
            tree.tag(*id) == Some("i") || tree.attr(*id, "data-visualcompletion") == Some("css-img")
        })
        .count();
    KNOWN_PLATFORMS.iter().take(icons).copied().collect()
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

    fn ctx() -> ExtractContext {
        ExtractContext::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    #[test]
    fn test_heading_brand_wins() {
        let (mut tree, region) = region();
        let h = tree.append_element(region, "h3");
        tree.append_text(h, "Acme");
        tree.append_text(region, "Sponsored");

        let meta = extract(&tree, region, &ctx());
        assert_eq!(meta.brand, "Acme");
        assert_eq!(meta.account, "Acme");
    }

    #[test]
    fn test_heading_rejects_marker_and_punctuation() {
        let (mut tree, region) = region();
        let h = tree.append_element(region, "strong");
        tree.append_text(h, "Sponsored");
        let h = tree.append_element(region, "strong");
        tree.append_text(h, "Acme & Co!");

        assert_eq!(heading_brand(&RegionText::new(&tree, region)), None);
    }

    #[test]
    fn test_capitalized_token_skips_stop_words() {
        let (mut tree, region) = region();
        tree.append_text(region, "Active Sponsored by Globex today");

        let r = RegionText::new(&tree, region);
        assert_eq!(capitalized_token_brand(&r), Some("Globex".to_string()));
    }

    #[test]
    fn test_token_before_sponsored() {
        let (mut tree, region) = region();
        tree.append_text(region, "shop initech, Sponsored");

        let r = RegionText::new(&tree, region);
        assert_eq!(capitalized_token_brand(&r), None);
        assert_eq!(token_before_sponsored_brand(&r), Some("initech".to_string()));
    }

    #[test]
    fn test_page_handle_from_profile_link_sets_account() {
        let (mut tree, region) = region();
        let h = tree.append_element(region, "h4");
        tree.append_text(h, "Acme Shoes");
        let help = tree.append_element(region, "a");
        tree.set_attr(help, "href", "https://www.facebook.com/help/123");
        let link = tree.append_element(region, "a");
        tree.set_attr(link, "href", "https://www.facebook.com/acme.shoes.official/");

        let meta = extract(&tree, region, &ctx());
        assert_eq!(meta.brand, "Acme Shoes");
        assert_eq!(meta.account, "acme.shoes.official");
    }

    #[test]
    fn test_unknown_brand_sentinel() {
        let (mut tree, region) = region();
        tree.append_text(region, "lowercase only");

        assert_eq!(extract(&tree, region, &ctx()).brand, UNKNOWN_BRAND);
    }

    #[test]
    fn test_parse_start_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_start_date("Started running on Mar 5, 2024"), Some(expected));
        assert_eq!(parse_start_date("Started running on March 5, 2024"), Some(expected));
        assert_eq!(parse_start_date("Started running on 5 Mar 2024"), Some(expected));
        assert_eq!(parse_start_date("Started running on 2024-03-05"), Some(expected));
        assert_eq!(parse_start_date("no date here"), None);
    }

    #[test]
    fn test_missing_date_uses_today() {
        let (mut tree, region) = region();
        tree.append_text(region, "Acme");
        assert_eq!(extract(&tree, region, &ctx()).date, ctx().today);
    }

    #[test]
    fn test_status_precedence_active_first() {
        assert_eq!(detect_status("Inactive\nActive"), AdStatus::Active);
        assert_eq!(detect_status("Inactive"), AdStatus::Inactive);
        assert_eq!(detect_status("Ran until May"), AdStatus::Unknown);
    }

    #[test]
    fn test_platforms_from_icon_count() {
        let (mut tree, region) = region();
        assert!(detect_platforms(&tree, region).is_empty());

        tree.append_element(region, "i");
        assert_eq!(
            detect_platforms(&tree, region),
            BTreeSet::from([Platform::Facebook])
        );

        let div = tree.append_element(region, "div");
        tree.set_attr(div, "data-visualcompletion", "css-img");
        tree.append_element(region, "i");
        assert_eq!(detect_platforms(&tree, region).len(), 2);
    }

    #[test]
    fn test_excerpt_is_collapsed_and_capped() {
        let (mut tree, region) = region();
        tree.append_text(region, &"word ".repeat(50));
        let meta = extract(&tree, region, &ctx());
        assert_eq!(meta.excerpt.chars().count(), EXCERPT_CHARS);
        assert!(!meta.excerpt.contains("  "));
    }
}
