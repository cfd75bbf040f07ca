//! Visibility gate: is a region on-screen and rendered right now.
//!
//! The answer depends on the current layout and viewport, so it is recomputed
//! on every call and never cached.

use crate::tree::{ContentTree, NodeId, Rect};

/// Returns true iff the region's bounding box overlaps the viewport on both
/// axes and neither the region nor any ancestor suppresses rendering.
///
/// A region without geometry is treated as not visible.
#[must_use]
pub fn is_visible(tree: &ContentTree, node: NodeId) -> bool {
    let Some(rect) = tree.rect(node) else {
        return false;
    };
    is_rect_in_viewport(&rect, &tree.viewport()) && !is_render_suppressed(tree, node)
}

/// Geometric half of the gate.
#[must_use]
pub fn is_rect_in_viewport(rect: &Rect, viewport: &Rect) -> bool {
    rect.width > 0.0 && rect.height > 0.0 && rect.intersects(viewport)
}

/// Style half of the gate: display/visibility/opacity on the node or any
/// ancestor, or a filter-overlay hide.
#[must_use]
pub fn is_render_suppressed(tree: &ContentTree, node: NodeId) -> bool {
    if !tree.is_attached(node) {
        return true;
    }
    std::iter::once(node)
        .chain(tree.ancestors(node))
        .any(|id| tree.style(id).is_suppressed() || tree.is_overlay_hidden(id))
}
