use super::{FindOptions, HighlightMatch, PreviewRange, SearchPreviewInfo, TextRange};
use crate::cell::SearchTarget;

/// Walk `targets` in order and collect every match of `query`.
///
/// Matches never span text nodes. Shadow roots are searched too.
pub fn find_matches(targets: &[SearchTarget], query: &str, options: &FindOptions) -> Vec<HighlightMatch> {
    if query.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for target in targets {
        target.container.read(|tree| {
            for text_ref in tree.text_nodes(true) {
                let Some(text) = tree.text(text_ref.node) else { continue };
                for (start, end) in match_ranges(text, query, options.case_sensitive, options.whole_word) {
                    out.push(HighlightMatch {
                        kind: target.kind.into(),
                        id: target.id.clone(),
                        cell_id: target.cell_id.clone(),
                        container: target.container.clone(),
                        container_top: target.top,
                        is_shadow: text_ref.in_shadow,
                        range: TextRange {
                            node: text_ref.node,
                            start,
                            end,
                        },
                        search_preview_info: options
                            .should_get_search_preview_info
                            .then(|| preview_info(text, start, end)),
                    });
                }
            }
        });
    }
    out
}

/// Non-overlapping byte ranges of `query` in `text`.
pub fn match_ranges(text: &str, query: &str, case_sensitive: bool, whole_word: bool) -> Vec<(usize, usize)> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle: Vec<char> = query.chars().collect();
    let mut out = Vec::new();
    let mut from = 0;

    while from < text.len() {
        let Some(end) = match_at(&text[from..], &needle, case_sensitive).map(|len| from + len) else {
            from += text[from..].chars().next().map(char::len_utf8).unwrap_or(1);
            continue;
        };
        if !whole_word || is_word_bounded(text, from, end) {
            out.push((from, end));
            from = end;
        } else {
            from += text[from..].chars().next().map(char::len_utf8).unwrap_or(1);
        }
    }
    out
}

/// Byte length of the match of `needle` at the start of `haystack`.
fn match_at(haystack: &str, needle: &[char], case_sensitive: bool) -> Option<usize> {
    let mut len = 0;
    let mut chars = haystack.chars();
    for expected in needle {
        let c = chars.next()?;
        let equal = if case_sensitive {
            c == *expected
        } else {
            c.to_lowercase().eq(expected.to_lowercase())
        };
        if !equal {
            return None;
        }
        len += c.len_utf8();
    }
    Some(len)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

fn preview_info(text: &str, start: usize, end: usize) -> SearchPreviewInfo {
    let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = text[end..].find('\n').map(|i| end + i).unwrap_or(text.len());
    let range_start = text[line_start..start].chars().count();
    SearchPreviewInfo {
        line: text[line_start..line_end].to_string(),
        range: PreviewRange {
            start: range_start,
            end: range_start + text[start..end].chars().count(),
        },
    }
}
