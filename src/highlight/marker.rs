use super::{HighlightMatch, HighlightStrategy};
use crate::dom::{Container, NodeId};
use std::collections::HashMap;

pub(crate) const MATCH_CLASS: &str = "find-match";
pub(crate) const CURRENT_CLASS: &str = "current-find-match";

// Shared classes do not reach into shadow roots, so those markers carry inline styles.
const SHADOW_MATCH_BACKGROUND: &str = "var(--theme-find-match-background)";
const SHADOW_CURRENT_BACKGROUND: &str = "var(--theme-current-find-match-background)";

/// Wraps each match in a `mark` element.
#[derive(Debug, Default)]
pub struct MarkerHighlighter {
    /// Per owner, one marker per match index. `None` when wrapping failed.
    markers: HashMap<String, Vec<Option<(Container, NodeId)>>>,
}

impl MarkerHighlighter {
    fn marker(&self, owner: &str, index: usize) -> Option<&(Container, NodeId)> {
        self.markers.get(owner)?.get(index)?.as_ref()
    }

    fn paint(&self, owner: &str, matches: &[HighlightMatch], index: usize, current: bool) -> Option<NodeId> {
        let (container, node) = self.marker(owner, index)?;
        let m = matches.get(index)?;
        container.write(|t| {
            if m.is_shadow {
                let background = if current { SHADOW_CURRENT_BACKGROUND } else { SHADOW_MATCH_BACKGROUND };
                t.set_style(*node, "background-color", background);
            } else if current {
                t.add_class(*node, CURRENT_CLASS);
            } else {
                t.remove_class(*node, CURRENT_CLASS);
            }
        });
        Some(*node)
    }

    fn unwrap_all(markers: Vec<Option<(Container, NodeId)>>) {
        for (container, node) in markers.into_iter().rev().flatten() {
            container.write(|t| t.unwrap(node));
        }
    }
}

impl HighlightStrategy for MarkerHighlighter {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn add(&mut self, owner: &str, matches: &[HighlightMatch]) {
        let mut markers = vec![None; matches.len()];

        // a wrapped node keeps only its prefix, so go back to front
        let mut order: Vec<usize> = (0..matches.len()).collect();
        order.sort_by(|a, b| matches[*b].range.start.cmp(&matches[*a].range.start));

        for index in order {
            let m = &matches[index];
            let marker = m.container.write(|t| {
                let marker = t.wrap_text(m.range.node, m.range.start, m.range.end, "mark")?;
                if m.is_shadow {
                    t.set_style(marker, "background-color", SHADOW_MATCH_BACKGROUND);
                } else {
                    t.add_class(marker, MATCH_CLASS);
                }
                Some(marker)
            });
            if marker.is_none() {
                log::warn!("Find[{owner}]: could not wrap match {index}");
            }
            markers[index] = marker.map(|node| (m.container.clone(), node));
        }

        if let Some(previous) = self.markers.insert(owner.to_string(), markers) {
            Self::unwrap_all(previous);
        }
    }

    fn set_current(&mut self, owner: &str, matches: &[HighlightMatch], index: usize) -> Option<f32> {
        let node = self.paint(owner, matches, index, true)?;
        let (container, _) = self.marker(owner, index)?;
        Some(container.offset_top(node))
    }

    fn clear_current(&mut self, owner: &str, matches: &[HighlightMatch], index: usize) {
        self.paint(owner, matches, index, false);
    }

    fn remove(&mut self, owner: &str, _matches: &[HighlightMatch]) {
        if let Some(markers) = self.markers.remove(owner) {
            Self::unwrap_all(markers);
        }
    }

    fn dispose(&mut self) {
        for (_, markers) in self.markers.drain() {
            Self::unwrap_all(markers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::test_support::target;
    use crate::highlight::{find_matches, FindOptions};

    #[test]
    fn light_and_shadow_matches_are_marked_differently() {
        let targets = vec![target("o1", 0.0, "ab ab", Some("ab"))];
        let matches = find_matches(&targets, "ab", &FindOptions::default());
        let mut marker = MarkerHighlighter::default();
        marker.add("w", &matches);

        let container = &targets[0].container;
        container.read(|t| {
            let marks = t.elements_by_tag("mark");
            assert_eq!(marks.len(), 3);
            let classed = marks.iter().filter(|m| t.has_class(**m, MATCH_CLASS)).count();
            let styled = marks.iter().filter(|m| t.style(**m, "background-color").is_some()).count();
            assert_eq!(classed, 2);
            assert_eq!(styled, 1);
        });
        assert_eq!(container.text_content(), "ab abab");

        marker.set_current("w", &matches, 2);
        let (_, shadow_marker) = marker.marker("w", 2).cloned().unwrap();
        assert_eq!(
            container.style(shadow_marker, "background-color").as_deref(),
            Some(SHADOW_CURRENT_BACKGROUND)
        );
        marker.clear_current("w", &matches, 2);
        assert_eq!(
            container.style(shadow_marker, "background-color").as_deref(),
            Some(SHADOW_MATCH_BACKGROUND)
        );
    }

    #[test]
    fn remove_restores_the_original_text_nodes() {
        let targets = vec![target("o1", 0.0, "x-x-x", None)];
        let matches = find_matches(&targets, "x", &FindOptions::default());
        let mut marker = MarkerHighlighter::default();
        marker.add("w", &matches);
        assert_eq!(targets[0].container.read(|t| t.text_nodes(true).len()), 6);

        marker.remove("w", &matches);
        let container = &targets[0].container;
        assert_eq!(container.read(|t| t.text_nodes(true).len()), 1);
        assert_eq!(container.text_content(), "x-x-x");
    }
}
