use super::{text_offset, HighlightMatch, HighlightStrategy};
use crate::dom::{ContainerId, NodeId};
use crate::lock;
use std::sync::{Arc, Mutex};

/// A highlighted range inside one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRange {
    pub owner: String,
    pub container: ContainerId,
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
}

impl LayerRange {
    fn of(owner: &str, m: &HighlightMatch) -> Self {
        Self {
            owner: owner.to_string(),
            container: m.container.id(),
            node: m.range.node,
            start: m.range.start,
            end: m.range.end,
        }
    }
}

/// A named set of ranges the platform paints. Clones share the same set.
#[derive(Debug, Clone)]
pub struct HighlightLayer {
    name: &'static str,
    ranges: Arc<Mutex<Vec<LayerRange>>>,
}

impl HighlightLayer {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ranges: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ranges(&self) -> Vec<LayerRange> {
        lock(&self.ranges).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.ranges).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, range: LayerRange) {
        lock(&self.ranges).push(range);
    }

    fn remove_owner(&self, owner: &str) {
        lock(&self.ranges).retain(|r| r.owner != owner);
    }

    fn clear(&self) {
        lock(&self.ranges).clear();
    }
}

/// Paints through two layers registered once: every match, and the current match.
#[derive(Debug)]
pub struct NativeHighlighter {
    all: HighlightLayer,
    current: HighlightLayer,
}

impl Default for NativeHighlighter {
    fn default() -> Self {
        Self {
            all: HighlightLayer::new("find-highlight"),
            current: HighlightLayer::new("current-find-highlight"),
        }
    }
}

impl NativeHighlighter {
    pub fn all_matches(&self) -> HighlightLayer {
        self.all.clone()
    }

    pub fn current_match(&self) -> HighlightLayer {
        self.current.clone()
    }
}

impl HighlightStrategy for NativeHighlighter {
    fn name(&self) -> &'static str {
        "native"
    }

    fn add(&mut self, owner: &str, matches: &[HighlightMatch]) {
        for m in matches {
            self.all.insert(LayerRange::of(owner, m));
        }
    }

    fn set_current(&mut self, owner: &str, matches: &[HighlightMatch], index: usize) -> Option<f32> {
        let m = matches.get(index)?;
        self.current.clear();
        self.current.insert(LayerRange::of(owner, m));
        Some(text_offset(&m.container, m.range.node, m.range.start))
    }

    fn clear_current(&mut self, owner: &str, _matches: &[HighlightMatch], _index: usize) {
        self.current.remove_owner(owner);
    }

    fn remove(&mut self, owner: &str, _matches: &[HighlightMatch]) {
        self.all.remove_owner(owner);
        self.current.remove_owner(owner);
    }

    fn dispose(&mut self) {
        self.all.clear();
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::test_support::target;
    use crate::highlight::{find_matches, FindOptions};

    #[test]
    fn adding_touches_only_the_all_layer() {
        let targets = vec![target("o1", 0.0, "aa aa", None)];
        let matches = find_matches(&targets, "aa", &FindOptions::default());
        let mut native = NativeHighlighter::default();

        native.add("w", &matches);
        assert_eq!(native.all_matches().len(), 2);
        assert!(native.current_match().is_empty());

        native.set_current("w", &matches, 1);
        assert_eq!(native.all_matches().len(), 2);
        assert_eq!(native.current_match().ranges()[0].start, 3);

        native.remove("w", &matches);
        assert!(native.all_matches().is_empty());
        assert!(native.current_match().is_empty());
        // the node tree is never touched
        assert_eq!(targets[0].container.read(|t| t.elements_by_tag("mark").len()), 0);
    }

    #[test]
    fn owners_are_independent() {
        let targets = vec![target("o1", 0.0, "x y", None)];
        let mut native = NativeHighlighter::default();
        native.add("a", &find_matches(&targets, "x", &FindOptions::default()));
        native.add("b", &find_matches(&targets, "y", &FindOptions::default()));

        native.remove("a", &[]);
        let left = native.all_matches().ranges();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].owner, "b");

        native.dispose();
        assert!(native.all_matches().is_empty());
    }
}
