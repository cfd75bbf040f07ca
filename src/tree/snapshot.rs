//! Loads saved HTML pages into a [`ContentTree`].
//!
//! Geometry is read from `data-rect="x,y,w,h"` attributes and render state
//! from inline `style` declarations, since a static snapshot has no layout
//! engine behind it.

use std::path::{Path, PathBuf};

use scraper::{ElementRef, Html};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::{ContentTree, NodeId, Rect, RenderStyle};

/// Attribute carrying pre-computed geometry in snapshots.
pub const RECT_ATTRIBUTE: &str = "data-rect";

/// Elements whose content never renders as page text.
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Errors raised while loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file could not be read.
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContentTree {
    /// Builds a tree from an HTML document.
    ///
    /// The children of `<body>` become children of the tree root.
    #[must_use]
    #[instrument(skip(html), fields(bytes = html.len()))]
    pub fn from_html(html: &str, viewport: Rect) -> Self {
        let document = Html::parse_document(html);
        let html_root = document.root_element();
        let body = html_root
            .children()
            .filter_map(ElementRef::wrap)
            .find(|element| element.value().name() == "body")
            .unwrap_or(html_root);

        let mut tree = ContentTree::new(viewport);
        let root = tree.root();
        apply_element_attrs(&mut tree, root, body);
        copy_children(&mut tree, body, root);

        debug!(nodes = tree.len(), "snapshot loaded");
        tree
    }

    /// Reads an HTML snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the file cannot be read.
    pub fn load(path: &Path, viewport: Rect) -> Result<Self, SnapshotError> {
        let html = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_html(&html, viewport))
    }
}

fn copy_children(tree: &mut ContentTree, source: ElementRef<'_>, parent: NodeId) {
    for child in source.children() {
        if let Some(element) = ElementRef::wrap(child) {
            let name = element.value().name();
            if SKIPPED_TAGS.contains(&name) {
                continue;
            }
            let id = tree.append_element(parent, name);
            apply_element_attrs(tree, id, element);
            copy_children(tree, element, id);
        } else if let Some(text) = child.value().as_text()
            && !text.trim().is_empty()
        {
            tree.append_text(parent, text);
        }
    }
}

fn apply_element_attrs(tree: &mut ContentTree, id: NodeId, element: ElementRef<'_>) {
    for (name, value) in element.value().attrs() {
        tree.set_attr(id, name, value);
        if name == RECT_ATTRIBUTE {
            match parse_rect(value) {
                Some(rect) => tree.set_rect(id, rect),
                None => warn!(value, "ignoring malformed data-rect attribute"),
            }
        } else if name == "style" {
            tree.set_style(id, parse_inline_style(value));
        }
    }
}

/// Parses `x,y,w,h` into a rectangle.
pub(crate) fn parse_rect(value: &str) -> Option<Rect> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [x, y, width, height] if *width >= 0.0 && *height >= 0.0 => {
            Some(Rect::new(*x, *y, *width, *height))
        }
        _ => None,
    }
}

/// Extracts the render-relevant declarations of an inline style.
pub(crate) fn parse_inline_style(value: &str) -> RenderStyle {
    let mut style = RenderStyle::default();
    for declaration in value.split(';') {
        let Some((property, raw)) = declaration.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let raw = raw.trim().trim_end_matches("!important").trim().to_ascii_lowercase();
        match property.as_str() {
            "display" => style.display_none = raw == "none",
            "visibility" => style.visibility_hidden = raw == "hidden" || raw == "collapse",
            "opacity" => {
                if let Ok(opacity) = raw.parse::<f32>() {
                    style.opacity = opacity;
                }
            }
            _ => {}
        }
    }
    style
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const VIEWPORT: Rect = Rect::new(0.0, 0.0, 1280.0, 800.0);

    #[test]
    fn test_from_html_copies_structure_geometry_and_text() {
        let html = r#"<html><body>
            <div data-testid="ad_library_result" data-rect="10,20,400,300">
                <span>Acme</span>
                <video src="https://cdn.example/v.mp4"></video>
            </div>
        </body></html>"#;
        let tree = ContentTree::from_html(html, VIEWPORT);
        let root = tree.root();

        let divs = tree.elements_by_tag(root, "div");
        assert_eq!(divs.len(), 1);
        let div = divs[0];
        assert_eq!(tree.attr(div, "data-testid"), Some("ad_library_result"));
        assert_eq!(tree.rect(div), Some(Rect::new(10.0, 20.0, 400.0, 300.0)));
        assert_eq!(tree.text_content(div), "Acme");
        assert_eq!(tree.elements_by_tag(div, "video").len(), 1);
    }

    #[test]
    fn test_from_html_skips_scripts() {
        let html = "<body><div>kept<script>var dropped = 1;</script></div></body>";
        let tree = ContentTree::from_html(html, VIEWPORT);
        assert_eq!(tree.text_content(tree.root()), "kept");
    }

    #[test]
    fn test_parse_rect_rejects_malformed_values() {
        assert_eq!(parse_rect("1,2,3,4"), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(parse_rect("1,2,3"), None);
        assert_eq!(parse_rect("a,b,c,d"), None);
        assert_eq!(parse_rect("0,0,-1,10"), None);
    }

    #[test]
    fn test_parse_inline_style_reads_hiding_declarations() {
        assert!(parse_inline_style("display: none").display_none);
        assert!(parse_inline_style("visibility:hidden !important").visibility_hidden);
        assert!(parse_inline_style("opacity: 0").is_suppressed());
        assert!(!parse_inline_style("color: red; opacity: 0.5").is_suppressed());
    }
}
