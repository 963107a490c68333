//! Rendered containers.
//!
//! Renderers paint into a [`Container`]: a shared handle over a small node tree
//! ([`Tree`]) with elements, text and shadow roots. The tree carries just enough layout
//! (block stacking, padding, borders, explicit heights) for the runtime to measure content
//! height, position search matches and serialize rendered markup.
//!
//! Every mutation bumps the tree's generation counter. The
//! [`ResizeTracker`](crate::resize::ResizeTracker) compares generations to find
//! containers whose size may have changed.

mod tree;

pub use tree::{Edges, Element, NodeId, NodeKind, TextNodeRef, Tree};

use crate::lock;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Identity of a container, stable across clones of the handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(Uuid);

impl ContainerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a rendered node tree.
#[derive(Clone)]
pub struct Container {
    id: ContainerId,
    tree: Arc<Mutex<Tree>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Container {
    pub fn new(root_tag: &str, line_height: f32) -> Self {
        Self {
            id: ContainerId::new(),
            tree: Arc::new(Mutex::new(Tree::new(root_tag, line_height))),
        }
    }

    #[inline]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// Run `f` with shared access to the tree.
    pub fn read<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        f(&lock(&self.tree))
    }

    /// Run `f` with exclusive access to the tree.
    pub fn write<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> R {
        f(&mut lock(&self.tree))
    }

    pub fn root(&self) -> NodeId {
        self.read(|t| t.root())
    }

    pub fn generation(&self) -> u64 {
        self.read(|t| t.generation())
    }

    pub fn append_element(&self, parent: NodeId, tag: &str) -> NodeId {
        self.write(|t| t.append_element(parent, tag))
    }

    pub fn append_text(&self, parent: NodeId, text: &str) -> NodeId {
        self.write(|t| t.append_text(parent, text))
    }

    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        self.write(|t| t.attach_shadow(host))
    }

    /// Remove every child of the root.
    pub fn clear(&self) {
        self.write(|t| {
            let root = t.root();
            t.clear(root)
        })
    }

    pub fn add_class(&self, node: NodeId, class: &str) {
        self.write(|t| t.add_class(node, class))
    }

    pub fn remove_class(&self, node: NodeId, class: &str) {
        self.write(|t| t.remove_class(node, class))
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.read(|t| t.has_class(node, class))
    }

    pub fn set_style(&self, node: NodeId, key: &str, value: &str) {
        self.write(|t| t.set_style(node, key, value))
    }

    pub fn style(&self, node: NodeId, key: &str) -> Option<String> {
        self.read(|t| t.style(node, key).map(|s| s.to_string()))
    }

    pub fn set_padding(&self, node: NodeId, padding: Edges) {
        self.write(|t| t.set_padding(node, padding))
    }

    pub fn text_content(&self) -> String {
        self.read(|t| t.text_content(t.root()))
    }

    pub fn inner_html(&self) -> String {
        self.read(|t| t.inner_html(t.root()))
    }

    /// Height of the root's content box: no padding, no border.
    pub fn content_height(&self) -> f32 {
        self.read(|t| t.inner_height(t.root()))
    }

    /// Border-box height of the root.
    pub fn offset_height(&self) -> f32 {
        self.read(|t| t.height(t.root()))
    }

    pub fn offset_top(&self, node: NodeId) -> f32 {
        self.read(|t| t.offset_top(node))
    }

    pub fn find_by_dom_id(&self, id: &str) -> Option<NodeId> {
        self.read(|t| t.find_by_dom_id(id))
    }
}
