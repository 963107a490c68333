//! In-surface find and match highlighting.
//!
//! `find` walks the rendered containers for a query and hands the matches to a
//! [`Highlighter`], which keeps one session per owner and paints matches through a
//! [`HighlightStrategy`]. Two strategies exist:
//!
//! - [`NativeHighlighter`]: two range layers (all matches, current match) painted by the
//!   platform without touching the node tree.
//! - [`MarkerHighlighter`]: wraps each match in a `mark` element. Matches in the main tree get
//!   a shared class, matches inside shadow roots an inline style.
//!
//! The strategy is picked once from the platform capabilities.

mod find;
mod marker;
mod native;

pub use find::{find_matches, match_ranges};
pub use marker::MarkerHighlighter;
pub use native::{HighlightLayer, LayerRange, NativeHighlighter};

use crate::cell::{SearchKind, SearchTarget};
use crate::config::PlatformCapabilities;
use crate::dom::{Container, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Options of a `find` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindOptions {
    pub whole_word: bool,
    pub case_sensitive: bool,
    pub include_markup: bool,
    pub include_output: bool,
    pub should_get_search_preview_info: bool,
    /// Session the matches belong to.
    pub owner_id: String,
    /// Restrict the search to these cells. Empty means every cell.
    pub find_ids: Vec<String>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            whole_word: false,
            case_sensitive: false,
            include_markup: true,
            include_output: true,
            should_get_search_preview_info: false,
            owner_id: String::new(),
            find_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Preview,
    Output,
}

impl From<SearchKind> for MatchType {
    fn from(kind: SearchKind) -> Self {
        match kind {
            SearchKind::Preview => MatchType::Preview,
            SearchKind::Output => MatchType::Output,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRange {
    pub start: usize,
    pub end: usize,
}

/// The line a match sits on, with the match range in characters relative to the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPreviewInfo {
    pub line: String,
    pub range: PreviewRange,
}

/// A match as reported to the host in `did-find`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchInfo {
    #[serde(rename = "type")]
    pub kind: MatchType,
    pub id: String,
    pub cell_id: String,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_preview_info: Option<SearchPreviewInfo>,
}

/// Byte range of a match inside one text node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextRange {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct HighlightMatch {
    pub kind: MatchType,
    pub id: String,
    pub cell_id: String,
    pub container: Container,
    /// Absolute top of `container`.
    pub container_top: f32,
    /// The match lives inside a shadow root.
    pub is_shadow: bool,
    pub range: TextRange,
    pub search_preview_info: Option<SearchPreviewInfo>,
}

/// How matches are painted.
///
/// `matches` is always the owner's full session; indices refer into it.
pub trait HighlightStrategy: Send {
    fn name(&self) -> &'static str;

    fn add(&mut self, owner: &str, matches: &[HighlightMatch]);

    /// Mark `matches[index]` as current and return its offset inside its container.
    fn set_current(&mut self, owner: &str, matches: &[HighlightMatch], index: usize) -> Option<f32>;

    fn clear_current(&mut self, owner: &str, matches: &[HighlightMatch], index: usize);

    fn remove(&mut self, owner: &str, matches: &[HighlightMatch]);

    /// Drop every highlight of every owner.
    fn dispose(&mut self);
}

#[derive(Debug, Default)]
struct Session {
    matches: Vec<HighlightMatch>,
    current: Option<usize>,
}

/// Highlight sessions keyed by owner id.
pub struct Highlighter {
    strategy: Box<dyn HighlightStrategy>,
    sessions: HashMap<String, Session>,
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Highlighter")
            .field("strategy", &self.strategy.name())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl Highlighter {
    pub fn new(strategy: Box<dyn HighlightStrategy>) -> Self {
        Self {
            strategy,
            sessions: HashMap::new(),
        }
    }

    pub fn for_platform(capabilities: &PlatformCapabilities) -> Self {
        if capabilities.native_highlights {
            Self::new(Box::new(NativeHighlighter::default()))
        } else {
            Self::new(Box::new(MarkerHighlighter::default()))
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Search `targets` for `query` and make the result `options.owner_id`'s session.
    pub fn find(&mut self, query: &str, options: &FindOptions, targets: &[SearchTarget]) -> Vec<FindMatchInfo> {
        // markers from the previous session split text nodes; drop them before walking
        self.remove(&options.owner_id);

        let matches = find_matches(targets, query, options);
        let infos = matches
            .iter()
            .enumerate()
            .map(|(index, m)| FindMatchInfo {
                kind: m.kind,
                id: m.id.clone(),
                cell_id: m.cell_id.clone(),
                index,
                search_preview_info: m.search_preview_info.clone(),
            })
            .collect();
        log::debug!("Find[{}]: {} match(es)", options.owner_id, matches.len());
        self.add_highlights(&options.owner_id, matches);
        infos
    }

    /// Replace `owner`'s session with `matches`.
    pub fn add_highlights(&mut self, owner: &str, matches: Vec<HighlightMatch>) {
        self.remove(owner);
        if matches.is_empty() {
            return;
        }
        self.strategy.add(owner, &matches);
        self.sessions.insert(owner.to_string(), Session { matches, current: None });
    }

    /// Make match `index` current. Returns its absolute offset, or `None` for an unknown
    /// owner or an out-of-range index.
    pub fn highlight_current(&mut self, owner: &str, index: usize) -> Option<f32> {
        let session = self.sessions.get_mut(owner)?;
        let m = session.matches.get(index)?;
        let top = m.container_top;

        if let Some(previous) = session.current.take() {
            self.strategy.clear_current(owner, &session.matches, previous);
        }
        let offset = self.strategy.set_current(owner, &session.matches, index)?;
        session.current = Some(index);
        Some(top + offset)
    }

    pub fn unhighlight_current(&mut self, owner: &str, index: usize) {
        let Some(session) = self.sessions.get_mut(owner) else { return };
        if session.current == Some(index) {
            self.strategy.clear_current(owner, &session.matches, index);
            session.current = None;
        }
    }

    pub fn remove(&mut self, owner: &str) {
        if let Some(session) = self.sessions.remove(owner) {
            self.strategy.remove(owner, &session.matches);
        }
    }

    pub fn dispose(&mut self) {
        self.sessions.clear();
        self.strategy.dispose();
    }

    pub fn current(&self, owner: &str) -> Option<usize> {
        self.sessions.get(owner).and_then(|s| s.current)
    }

    pub fn match_count(&self, owner: &str) -> usize {
        self.sessions.get(owner).map(|s| s.matches.len()).unwrap_or(0)
    }
}

/// Vertical offset of a byte position inside a text node, relative to the container.
pub(crate) fn text_offset(container: &Container, node: NodeId, byte: usize) -> f32 {
    container.read(|t| {
        let lines_before = t
            .text(node)
            .and_then(|s| s.get(..byte))
            .map(|s| s.matches('\n').count())
            .unwrap_or(0);
        t.offset_top(node) + lines_before as f32 * t.line_height()
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Container with a paragraph of `text` and, optionally, a shadow host holding `shadow`.
    pub fn target(id: &str, top: f32, text: &str, shadow: Option<&str>) -> SearchTarget {
        let container = Container::new("div", 10.0);
        container.write(|t| {
            let root = t.root();
            let p = t.append_element(root, "p");
            t.append_text(p, text);
            if let Some(inner) = shadow {
                let host = t.append_element(root, "div");
                let shadow_root = t.attach_shadow(host);
                let p = t.append_element(shadow_root, "p");
                t.append_text(p, inner);
            }
        });
        SearchTarget {
            kind: SearchKind::Output,
            id: id.to_string(),
            cell_id: format!("cell-{id}"),
            container,
            top,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::target;
    use super::*;

    fn opts(owner: &str) -> FindOptions {
        FindOptions {
            owner_id: owner.into(),
            ..Default::default()
        }
    }

    fn assert_single_current(strategy: Box<dyn HighlightStrategy>, probe: impl Fn(&SearchTarget) -> usize) {
        let targets = vec![target("o1", 100.0, "one\ntwo one", None)];
        let mut h = Highlighter::new(strategy);
        let infos = h.find("one", &opts("w"), &targets);
        assert_eq!(infos.len(), 2);

        assert_eq!(h.highlight_current("w", 0), Some(100.0));
        assert_eq!(probe(&targets[0]), 1);
        assert_eq!(h.highlight_current("w", 1), Some(110.0));
        assert_eq!(probe(&targets[0]), 1);
        assert_eq!(h.current("w"), Some(1));

        h.unhighlight_current("w", 1);
        assert_eq!(probe(&targets[0]), 0);
        assert_eq!(h.current("w"), None);
    }

    #[test]
    fn native_strategy_keeps_one_current_range() {
        let native = NativeHighlighter::default();
        let current = native.current_match();
        assert_single_current(Box::new(native), move |_| current.len());
    }

    #[test]
    fn marker_strategy_keeps_one_current_marker() {
        assert_single_current(Box::new(MarkerHighlighter::default()), |t| {
            t.container.read(|tree| {
                tree.elements_by_tag("mark")
                    .into_iter()
                    .filter(|m| tree.has_class(*m, marker::CURRENT_CLASS))
                    .count()
            })
        });
    }

    #[test]
    fn find_replaces_the_owners_previous_session() {
        let targets = vec![target("o1", 0.0, "alpha beta alpha", None)];
        let mut h = Highlighter::new(Box::new(MarkerHighlighter::default()));

        assert_eq!(h.find("alpha", &opts("w"), &targets).len(), 2);
        assert_eq!(h.find("beta", &opts("w"), &targets).len(), 1);
        assert_eq!(h.match_count("w"), 1);
        let marks = targets[0].container.read(|t| t.elements_by_tag("mark").len());
        assert_eq!(marks, 1);
        assert_eq!(targets[0].container.text_content(), "alpha beta alpha");
    }

    #[test]
    fn invalid_indices_and_unknown_owners_are_ignored() {
        let targets = vec![target("o1", 0.0, "x", None)];
        let mut h = Highlighter::for_platform(&PlatformCapabilities::default());
        assert_eq!(h.strategy_name(), "native");
        h.find("x", &opts("w"), &targets);

        assert_eq!(h.highlight_current("w", 5), None);
        assert_eq!(h.highlight_current("other", 0), None);
        assert_eq!(h.current("w"), None);
    }

    #[test]
    fn dispose_clears_all_sessions() {
        let targets = vec![target("o1", 0.0, "ab ab", Some("ab"))];
        let mut h = Highlighter::for_platform(&PlatformCapabilities { native_highlights: false });
        h.find("ab", &opts("a"), &targets);
        h.find("ab", &opts("b"), &[]);
        assert_eq!(h.match_count("a"), 3);

        h.dispose();
        assert_eq!(h.match_count("a"), 0);
        assert!(targets[0].container.read(|t| t.elements_by_tag("mark").is_empty()));
    }

    #[test]
    fn match_info_serializes_type_tag() {
        let info = FindMatchInfo {
            kind: MatchType::Preview,
            id: "m1".into(),
            cell_id: "m1".into(),
            index: 0,
            search_preview_info: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "preview", "id": "m1", "cellId": "m1", "index": 0 }));
    }
}
