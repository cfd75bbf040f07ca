//! Content tree model mirroring the hosting page.
//!
//! The tree is an arena of element and text nodes. Each node can carry its
//! rendered bounding box and render state, which is what the visibility gate
//! and the discovery heuristics need. The host mutates the tree (or a snapshot
//! loader builds it) and then notifies the engine through the runtime.
//!
//! # Example
//!
//! ```
//! use ads_downloader_core::tree::{ContentTree, Rect};
//!
//! let mut tree = ContentTree::new(Rect::new(0.0, 0.0, 1280.0, 800.0));
//! let root = tree.root();
//! let item = tree.append_element(root, "div");
//! tree.set_attr(item, "data-testid", "ad_library_result");
//! tree.set_rect(item, Rect::new(0.0, 0.0, 400.0, 300.0));
//! tree.append_text(item, "Sponsored");
//!
//! assert_eq!(tree.text_content(item), "Sponsored");
//! ```

mod snapshot;

pub use snapshot::SnapshotError;

use std::collections::BTreeMap;

/// Handle to a node in a [`ContentTree`].
///
/// Handles are only meaningful for the tree that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index of this node.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Axis-aligned rectangle in logical units (`x` is left, `y` is top).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn left(&self) -> f64 {
        self.x
    }

    #[must_use]
    pub fn top(&self) -> f64 {
        self.y
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Returns true when both rectangles overlap with a non-zero area.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        let overlap_w = self.right().min(other.right()) - self.left().max(other.left());
        let overlap_h = self.bottom().min(other.bottom()) - self.top().max(other.top());
        overlap_w > 0.0 && overlap_h > 0.0
    }
}

/// Render state of a node as reported by the host's style system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStyle {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
        }
    }
}

impl RenderStyle {
    /// Returns true when this style alone keeps the node from being painted.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.display_none || self.visibility_hidden || self.opacity <= 0.0
    }
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rect: Option<Rect>,
    style: RenderStyle,
    overlay_hidden: bool,
    detached: bool,
}

impl Node {
    fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            rect: None,
            style: RenderStyle::default(),
            overlay_hidden: false,
            detached: false,
        }
    }
}

/// Arena-backed content tree with a viewport.
#[derive(Debug, Clone)]
pub struct ContentTree {
    nodes: Vec<Node>,
    root: NodeId,
    viewport: Rect,
}

impl ContentTree {
    /// Creates a tree holding only a `body` root element.
    #[must_use]
    pub fn new(viewport: Rect) -> Self {
        let root = Node::new(
            NodeKind::Element {
                tag: "body".to_string(),
                attrs: BTreeMap::new(),
            },
            None,
        );
        Self {
            nodes: vec![root],
            root: NodeId(0),
            viewport,
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Moves or resizes the viewport (scroll and resize signals).
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    /// Number of nodes ever allocated, detached ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Appends a new element under `parent` and returns its handle.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.push_node(
            NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attrs: BTreeMap::new(),
            },
            parent,
        )
    }

    /// Appends a text run under `parent` and returns its handle.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_string()), parent)
    }

    fn push_node(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent_detached = self.node(parent).is_none_or(|p| p.detached);
        let mut node = Node::new(kind, Some(parent));
        node.detached = parent_detached;
        self.nodes.push(node);
        if let Some(parent_node) = self.nodes.get_mut(parent.0) {
            parent_node.children.push(id);
        }
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    /// Lowercase tag name for elements, `None` for text nodes.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag(id).is_some()
    }

    /// Raw text of a text node.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text(text) => Some(text.as_str()),
            NodeKind::Element { .. } => None,
        }
    }

    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeKind::Text(_) => None,
        }
    }

    #[must_use]
    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Sets an attribute; ignored for text nodes.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(Node {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.node_mut(id)
        {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        match self.node_mut(id) {
            Some(Node {
                kind: NodeKind::Element { attrs, .. },
                ..
            }) => attrs.remove(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.node(id).and_then(|n| n.rect)
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) {
        if let Some(node) = self.node_mut(id) {
            node.rect = Some(rect);
        }
    }

    #[must_use]
    pub fn style(&self, id: NodeId) -> RenderStyle {
        self.node(id).map(|n| n.style).unwrap_or_default()
    }

    pub fn set_style(&mut self, id: NodeId, style: RenderStyle) {
        if let Some(node) = self.node_mut(id) {
            node.style = style;
        }
    }

    /// Whether the filter overlay currently hides this node.
    #[must_use]
    pub fn is_overlay_hidden(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.overlay_hidden)
    }

    pub fn set_overlay_hidden(&mut self, id: NodeId, hidden: bool) {
        if let Some(node) = self.node_mut(id) {
            node.overlay_hidden = hidden;
        }
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            Some(node) => &node.children,
            None => &[],
        }
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Preorder descendants of `id`, excluding `id` itself.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        stack.reverse();
        Descendants { tree: self, stack }
    }

    /// Descendant elements of `scope` with the given tag, in document order.
    #[must_use]
    pub fn elements_by_tag(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .filter(|id| self.tag(*id) == Some(tag))
            .collect()
    }

    /// Returns true when `node` lies inside the subtree rooted at `ancestor`.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Non-empty trimmed text runs of the subtree, in document order.
    #[must_use]
    pub fn text_lines(&self, id: NodeId) -> Vec<String> {
        std::iter::once(id)
            .chain(self.descendants(id))
            .filter_map(|n| self.text(n))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Text of the subtree with one line per text run.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        self.text_lines(id).join("\n")
    }

    /// Detaches the subtree rooted at `id` from its parent.
    pub fn detach(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        if let Some(parent) = self.parent(id)
            && let Some(parent_node) = self.node_mut(parent)
        {
            parent_node.children.retain(|child| *child != id);
        }
        let subtree: Vec<NodeId> = std::iter::once(id).chain(self.descendants(id)).collect();
        for node_id in subtree {
            if let Some(node) = self.node_mut(node_id) {
                node.detached = true;
            }
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| !n.detached)
    }
}

/// Preorder iterator over a subtree.
#[derive(Debug)]
pub struct Descendants<'a> {
    tree: &'a ContentTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(next).iter().rev().copied());
        Some(next)
    }
}
