use std::collections::BTreeMap;
use std::fmt::Write;

/// Index of a node inside a [`Tree`]. Ids are never reused, so a stale id of a removed
/// node stays detectable through [`Tree::is_alive`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Box edges in pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub const ZERO: Edges = Edges { top: 0.0, right: 0.0, bottom: 0.0, left: 0.0 };

    pub fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self { top, right, bottom, left }
    }

    #[inline]
    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }

    pub fn is_zero(&self) -> bool {
        *self == Edges::ZERO
    }
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub tag: String,
    pub dom_id: Option<String>,
    pub classes: Vec<String>,
    pub style: BTreeMap<String, String>,
    pub attrs: BTreeMap<String, String>,
    pub padding: Edges,
    pub border: f32,
    /// Explicit content-box height (images, fixed boxes). `None` means "size to children".
    pub height: Option<f32>,
    pub shadow_root: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    ShadowRoot,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    alive: bool,
}

/// A text node found by [`Tree::text_nodes`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextNodeRef {
    pub node: NodeId,
    /// The node lives inside a shadow root, where shared classes do not apply.
    pub in_shadow: bool,
}

const VOID_TAGS: &[&str] = &["img", "hr", "br", "input"];

/// Tags laid out in line boxes together with their text siblings.
const INLINE_TAGS: &[&str] = &["a", "b", "code", "em", "i", "mark", "span", "strong"];

/// Arena-backed node tree with a tiny block layout model.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
    generation: u64,
    line_height: f32,
}

impl Tree {
    pub fn new(root_tag: &str, line_height: f32) -> Self {
        let root = NodeData {
            kind: NodeKind::Element(Element { tag: root_tag.to_string(), ..Default::default() }),
            parent: None,
            children: vec![],
            alive: true,
        };

        Self {
            nodes: vec![root],
            root: NodeId(0),
            generation: 0,
            line_height,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Bumped on every mutation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    #[inline]
    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).map(|n| n.alive).unwrap_or(false)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.data(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.data(node).map(|n| &n.kind)
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match self.kind(node) {
            Some(NodeKind::Element(e)) => Some(e),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(node.0) {
            Some(NodeData { kind: NodeKind::Element(e), alive: true, .. }) => Some(e),
            _ => None,
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            Some(NodeKind::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0).filter(|n| n.alive)
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData { kind, parent, children: vec![], alive: true });
        id
    }

    // ---------- Mutation ----------

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.insert_at(parent, None, NodeKind::Element(Element { tag: tag.to_string(), ..Default::default() }))
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.insert_at(parent, None, NodeKind::Text(text.to_string()))
    }

    fn insert_at(&mut self, parent: NodeId, index: Option<usize>, kind: NodeKind) -> NodeId {
        let id = self.push(kind, Some(parent));
        if let Some(p) = self.nodes.get_mut(parent.0) {
            match index {
                Some(i) if i <= p.children.len() => p.children.insert(i, id),
                _ => p.children.push(id),
            }
        }
        self.touch();
        id
    }

    /// Attach (or return the existing) shadow root of `host`.
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        if let Some(existing) = self.element(host).and_then(|e| e.shadow_root) {
            return existing;
        }
        let shadow = self.push(NodeKind::ShadowRoot, Some(host));
        if let Some(e) = self.element_mut(host) {
            e.shadow_root = Some(shadow);
        }
        self.touch();
        shadow
    }

    pub fn append_to_text(&mut self, node: NodeId, more: &str) {
        if let Some(NodeData { kind: NodeKind::Text(t), alive: true, .. }) = self.nodes.get_mut(node.0) {
            t.push_str(more);
            self.touch();
        }
    }

    pub fn set_text(&mut self, node: NodeId, value: &str) {
        if let Some(NodeData { kind: NodeKind::Text(t), alive: true, .. }) = self.nodes.get_mut(node.0) {
            *t = value.to_string();
            self.touch();
        }
    }

    /// Remove all children (and the shadow root) of `node`.
    pub fn clear(&mut self, node: NodeId) {
        let children = self.children(node);
        for child in children {
            self.kill(child);
        }
        if let Some(shadow) = self.element(node).and_then(|e| e.shadow_root) {
            self.kill(shadow);
        }
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.children.clear();
        }
        if let Some(e) = self.element_mut(node) {
            e.shadow_root = None;
        }
        self.touch();
    }

    /// Detach `node` from its parent and drop its subtree.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.root {
            self.clear(node);
            return;
        }
        if let Some(parent) = self.parent(node) {
            if let Some(p) = self.nodes.get_mut(parent.0) {
                p.children.retain(|c| *c != node);
            }
        }
        self.kill(node);
        self.touch();
    }

    fn kill(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            let Some(data) = self.nodes.get_mut(n.0) else { continue };
            data.alive = false;
            stack.extend(data.children.iter().copied());
            if let NodeKind::Element(Element { shadow_root: Some(s), .. }) = &data.kind {
                stack.push(*s);
            }
        }
    }

    pub fn set_dom_id(&mut self, node: NodeId, id: &str) {
        if let Some(e) = self.element_mut(node) {
            e.dom_id = Some(id.to_string());
            self.touch();
        }
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(e) = self.element_mut(node) {
            if !e.classes.iter().any(|c| c == class) {
                e.classes.push(class.to_string());
                self.touch();
            }
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(e) = self.element_mut(node) {
            let before = e.classes.len();
            e.classes.retain(|c| c != class);
            if e.classes.len() != before {
                self.touch();
            }
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node).map(|e| e.classes.iter().any(|c| c == class)).unwrap_or(false)
    }

    pub fn set_style(&mut self, node: NodeId, key: &str, value: &str) {
        if let Some(e) = self.element_mut(node) {
            e.style.insert(key.to_string(), value.to_string());
            self.touch();
        }
    }

    pub fn remove_style(&mut self, node: NodeId, key: &str) {
        if let Some(e) = self.element_mut(node) {
            if e.style.remove(key).is_some() {
                self.touch();
            }
        }
    }

    pub fn style(&self, node: NodeId, key: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.style.get(key)).map(|s| s.as_str())
    }

    pub fn set_attr(&mut self, node: NodeId, key: &str, value: &str) {
        if let Some(e) = self.element_mut(node) {
            e.attrs.insert(key.to_string(), value.to_string());
            self.touch();
        }
    }

    pub fn attr(&self, node: NodeId, key: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attrs.get(key)).map(|s| s.as_str())
    }

    pub fn set_padding(&mut self, node: NodeId, padding: Edges) {
        if let Some(e) = self.element_mut(node) {
            if e.padding != padding {
                e.padding = padding;
                self.touch();
            }
        }
    }

    pub fn padding(&self, node: NodeId) -> Edges {
        self.element(node).map(|e| e.padding).unwrap_or_default()
    }

    pub fn set_border(&mut self, node: NodeId, px: f32) {
        if let Some(e) = self.element_mut(node) {
            e.border = px;
            self.touch();
        }
    }

    pub fn set_height(&mut self, node: NodeId, px: Option<f32>) {
        if let Some(e) = self.element_mut(node) {
            e.height = px;
            self.touch();
        }
    }

    // ---------- Layout ----------

    /// Children in layout order: shadow root content first, then light children.
    fn layout_children(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(shadow) = self.element(node).and_then(|e| e.shadow_root) {
            out.push(shadow);
        }
        out.extend(self.children(node));
        out
    }

    /// Border-box height of `node`.
    pub fn height(&self, node: NodeId) -> f32 {
        let Some(data) = self.data(node) else { return 0.0 };
        match &data.kind {
            NodeKind::Text(t) => self.run_height(t),
            NodeKind::ShadowRoot => self.stack_height(&data.children),
            NodeKind::Element(e) => {
                if is_display_none(e) {
                    return 0.0;
                }
                e.padding.vertical() + 2.0 * e.border + self.inner_height(node)
            }
        }
    }

    /// Content-box height (excludes padding and border).
    pub fn inner_height(&self, node: NodeId) -> f32 {
        match self.element(node) {
            Some(e) => match e.height {
                Some(h) => h,
                None => self.stack_height(&self.layout_children(node)),
            },
            None => self.height(node),
        }
    }

    /// Text and inline elements share line boxes; everything else stacks as a block.
    fn is_inline(&self, node: NodeId) -> bool {
        match self.kind(node) {
            Some(NodeKind::Text(_)) => true,
            Some(NodeKind::Element(e)) => {
                INLINE_TAGS.contains(&e.tag.as_str())
                    && e.height.is_none()
                    && e.shadow_root.is_none()
                    && e.style.get("display").map(|d| d == "inline").unwrap_or(true)
            }
            _ => false,
        }
    }

    fn inline_text(&self, node: NodeId) -> String {
        match self.element(node) {
            Some(e) if is_display_none(e) => String::new(),
            _ => self.text_content(node),
        }
    }

    fn run_height(&self, text: &str) -> f32 {
        if text.is_empty() {
            0.0
        } else {
            text.lines().count().max(1) as f32 * self.line_height
        }
    }

    fn stack_height(&self, children: &[NodeId]) -> f32 {
        let mut total = 0.0;
        let mut run = String::new();
        for child in children {
            if self.is_inline(*child) {
                run.push_str(&self.inline_text(*child));
            } else {
                total += self.run_height(&run);
                run.clear();
                total += self.height(*child);
            }
        }
        total + self.run_height(&run)
    }

    /// Vertical position of `node` relative to the root's border box.
    pub fn offset_top(&self, node: NodeId) -> f32 {
        let Some(parent) = self.parent(node) else { return 0.0 };
        let Some(p) = self.element(parent).cloned().or_else(|| {
            // shadow roots have no box of their own
            matches!(self.kind(parent), Some(NodeKind::ShadowRoot)).then(Element::default)
        }) else {
            return 0.0;
        };

        let mut y = self.offset_top(parent) + p.border + p.padding.top;
        let mut run = String::new();
        for sibling in self.layout_children(parent) {
            if sibling == node {
                if self.is_inline(node) {
                    y += run.matches('\n').count() as f32 * self.line_height;
                } else {
                    y += self.run_height(&run);
                }
                break;
            }
            if self.is_inline(sibling) {
                run.push_str(&self.inline_text(sibling));
            } else {
                y += self.run_height(&run);
                run.clear();
                y += self.height(sibling);
            }
        }
        y
    }

    // ---------- Queries ----------

    /// Concatenated text of `node` and its descendants (shadow content included).
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text(t)) => out.push_str(t),
            Some(_) => {
                for child in self.layout_children(node) {
                    self.collect_text(child, out);
                }
            }
            None => {}
        }
    }

    /// Depth-first list of text nodes in document order.
    pub fn text_nodes(&self, include_shadow: bool) -> Vec<TextNodeRef> {
        let mut out = Vec::new();
        self.walk_text(self.root, false, include_shadow, &mut out);
        out
    }

    fn walk_text(&self, node: NodeId, in_shadow: bool, include_shadow: bool, out: &mut Vec<TextNodeRef>) {
        match self.kind(node) {
            Some(NodeKind::Text(_)) => out.push(TextNodeRef { node, in_shadow }),
            Some(NodeKind::Element(e)) => {
                if let Some(shadow) = e.shadow_root {
                    if include_shadow {
                        self.walk_text(shadow, true, include_shadow, out);
                    }
                }
                for child in self.children(node) {
                    self.walk_text(child, in_shadow, include_shadow, out);
                }
            }
            Some(NodeKind::ShadowRoot) => {
                for child in self.children(node) {
                    self.walk_text(child, true, include_shadow, out);
                }
            }
            None => {}
        }
    }

    pub fn find_by_dom_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|n| self.element(*n).and_then(|e| e.dom_id.as_deref()) == Some(id))
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|n| self.tag(*n) == Some(tag))
            .collect()
    }

    /// All live nodes below `node` (shadow content included), in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.layout_children(node).into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            if !self.is_alive(n) {
                continue;
            }
            out.push(n);
            stack.extend(self.layout_children(n).into_iter().rev());
        }
        out
    }

    // ---------- Text wrapping ----------

    /// Wrap the byte range `start..end` of text node `node` into a new `tag` element.
    ///
    /// The original node keeps the prefix, so wrapping several ranges of one node must
    /// happen back to front. Returns the marker element.
    pub fn wrap_text(&mut self, node: NodeId, start: usize, end: usize, tag: &str) -> Option<NodeId> {
        let text = self.text(node)?.to_string();
        if start >= end || end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return None;
        }
        let parent = self.parent(node)?;
        let index = self.data(parent)?.children.iter().position(|c| *c == node)?;

        self.set_text(node, &text[..start]);
        let marker = self.insert_at(
            parent,
            Some(index + 1),
            NodeKind::Element(Element { tag: tag.to_string(), ..Default::default() }),
        );
        self.append_text(marker, &text[start..end]);
        if end < text.len() {
            self.insert_at(parent, Some(index + 2), NodeKind::Text(text[end..].to_string()));
        }
        Some(marker)
    }

    /// Replace `marker` with its children and merge the now adjacent text nodes.
    pub fn unwrap(&mut self, marker: NodeId) {
        let Some(parent) = self.parent(marker) else { return };
        let Some(index) = self.data(parent).and_then(|p| p.children.iter().position(|c| *c == marker)) else {
            return;
        };

        let moved = self.children(marker);
        for child in &moved {
            if let Some(c) = self.nodes.get_mut(child.0) {
                c.parent = Some(parent);
            }
        }
        if let Some(m) = self.nodes.get_mut(marker.0) {
            m.children.clear();
            m.alive = false;
        }
        if let Some(p) = self.nodes.get_mut(parent.0) {
            let tail = p.children.split_off(index + 1);
            p.children.pop();
            p.children.extend(moved);
            p.children.extend(tail);
        }
        self.normalize(parent);
        self.touch();
    }

    /// Merge adjacent text children of `node` and drop empty ones.
    pub fn normalize(&mut self, node: NodeId) {
        let children = self.children(node);
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            let Some(text) = self.text(child).map(|t| t.to_string()) else {
                kept.push(child);
                continue;
            };
            if let Some(prev) = kept.last().copied().filter(|p| self.text(*p).is_some()) {
                self.append_to_text(prev, &text);
                if let Some(c) = self.nodes.get_mut(child.0) {
                    c.alive = false;
                }
            } else if text.is_empty() {
                if let Some(c) = self.nodes.get_mut(child.0) {
                    c.alive = false;
                }
            } else {
                kept.push(child);
            }
        }
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.children = kept;
        }
    }

    // ---------- Serialization ----------

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.layout_children(node) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text(t)) => out.push_str(&escape(t, false)),
            Some(NodeKind::ShadowRoot) => {
                for child in self.children(node) {
                    self.write_html(child, out);
                }
            }
            Some(NodeKind::Element(e)) => {
                let _ = write!(out, "<{}", e.tag);
                if let Some(id) = &e.dom_id {
                    let _ = write!(out, " id=\"{}\"", escape(id, true));
                }
                if !e.classes.is_empty() {
                    let _ = write!(out, " class=\"{}\"", escape(&e.classes.join(" "), true));
                }
                for (k, v) in &e.attrs {
                    let _ = write!(out, " {}=\"{}\"", k, escape(v, true));
                }
                if !e.style.is_empty() {
                    let style: Vec<String> = e.style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    let _ = write!(out, " style=\"{}\"", escape(&style.join("; "), true));
                }
                out.push('>');
                if VOID_TAGS.contains(&e.tag.as_str()) {
                    return;
                }
                for child in self.layout_children(node) {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{}>", e.tag);
            }
            None => {}
        }
    }
}

fn is_display_none(e: &Element) -> bool {
    e.style.get("display").map(|d| d == "none").unwrap_or(false)
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Tree {
        Tree::new("div", 10.0)
    }

    #[test]
    fn text_height_counts_lines() {
        let mut t = tree();
        let root = t.root();
        t.append_text(root, "one\ntwo\nthree");
        assert_eq!(t.height(root), 30.0);
        assert_eq!(t.inner_height(root), 30.0);
    }

    #[test]
    fn padding_and_border_only_affect_border_box() {
        let mut t = tree();
        let root = t.root();
        t.set_padding(root, Edges::new(4.0, 0.0, 4.0, 0.0));
        let child = t.append_element(root, "div");
        t.set_border(child, 1.0);
        assert_eq!(t.inner_height(root), 2.0);
        assert_eq!(t.height(root), 10.0);
    }

    #[test]
    fn display_none_collapses() {
        let mut t = tree();
        let root = t.root();
        let p = t.append_element(root, "p");
        t.append_text(p, "x");
        t.set_style(p, "display", "none");
        assert_eq!(t.height(root), 0.0);
    }

    #[test]
    fn offset_top_accounts_for_previous_siblings_and_shadow() {
        let mut t = tree();
        let root = t.root();
        t.set_padding(root, Edges::new(5.0, 0.0, 0.0, 0.0));
        let first = t.append_element(root, "p");
        t.append_text(first, "a\nb");
        let host = t.append_element(root, "div");
        let shadow = t.attach_shadow(host);
        let inner = t.append_element(shadow, "span");
        let text = t.append_text(inner, "hidden");

        assert_eq!(t.offset_top(first), 5.0);
        assert_eq!(t.offset_top(host), 25.0);
        assert_eq!(t.offset_top(text), 25.0);
    }

    #[test]
    fn inline_markers_share_the_line_box() {
        let mut t = tree();
        let root = t.root();
        let p = t.append_element(root, "p");
        let text = t.append_text(p, "one two\nthree");
        assert_eq!(t.height(p), 20.0);

        let marker = t.wrap_text(text, 8, 13, "mark").unwrap();
        assert_eq!(t.height(p), 20.0);
        assert_eq!(t.offset_top(marker), 10.0);
    }

    #[test]
    fn text_nodes_respects_shadow_flag() {
        let mut t = tree();
        let root = t.root();
        t.append_text(root, "light");
        let host = t.append_element(root, "div");
        let shadow = t.attach_shadow(host);
        t.append_text(shadow, "dark");

        let all = t.text_nodes(true);
        assert_eq!(all.len(), 2);
        assert!(!all[0].in_shadow);
        assert!(all[1].in_shadow);
        assert_eq!(t.text_nodes(false).len(), 1);
    }

    #[test]
    fn wrap_then_unwrap_restores_text() {
        let mut t = tree();
        let root = t.root();
        let p = t.append_element(root, "p");
        let text = t.append_text(p, "hello world hello");

        let second = t.wrap_text(text, 12, 17, "mark").unwrap();
        let first = t.wrap_text(text, 0, 5, "mark").unwrap();
        assert_eq!(t.text_content(first), "hello");
        assert_eq!(t.text_content(second), "hello");
        assert_eq!(t.text_content(p), "hello world hello");

        t.unwrap(first);
        t.unwrap(second);
        assert_eq!(t.children(p).len(), 1);
        assert_eq!(t.text_content(p), "hello world hello");
        assert!(t.elements_by_tag("mark").is_empty());
    }

    #[test]
    fn wrap_rejects_bad_ranges() {
        let mut t = tree();
        let root = t.root();
        let text = t.append_text(root, "héllo");
        assert!(t.wrap_text(text, 2, 3, "mark").is_none());
        assert!(t.wrap_text(text, 3, 3, "mark").is_none());
        assert!(t.wrap_text(text, 0, 99, "mark").is_none());
    }

    #[test]
    fn clear_kills_subtree_and_bumps_generation() {
        let mut t = tree();
        let root = t.root();
        let p = t.append_element(root, "p");
        let text = t.append_text(p, "x");
        let gen = t.generation();
        t.clear(root);
        assert!(!t.is_alive(p));
        assert!(!t.is_alive(text));
        assert!(t.generation() > gen);
        assert_eq!(t.height(root), 0.0);
    }

    #[test]
    fn inner_html_serializes_and_escapes() {
        let mut t = tree();
        let root = t.root();
        let pre = t.append_element(root, "pre");
        t.add_class(pre, "error");
        t.append_text(pre, "a < b & c");
        let img = t.append_element(root, "img");
        t.set_attr(img, "src", "x\"y");
        assert_eq!(
            t.inner_html(root),
            "<pre class=\"error\">a &lt; b &amp; c</pre><img src=\"x&quot;y\">"
        );
    }
}
