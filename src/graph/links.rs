//! `links`: `[[Title]]` reference extraction and title resolution.
//!
//! Everything here is pure text processing; the store feeds [`TitleIndex`]
//! with node titles and asks it to map references to node ids.

use std::collections::{HashMap, HashSet};

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

// ── Extraction ────────────────────────────────────────────────────────────────

/// Return the distinct reference titles in `content`, in first-occurrence order.
///
/// A reference is `[[` followed by one or more characters other than `]`,
/// closed by `]]`. The inner text is trimmed; blank references are skipped.
/// Duplicates are detected case-insensitively and the spelling of the first
/// occurrence is kept, so `[[Foo]] … [[foo]]` yields only `"Foo"`.
pub fn extract_references(content: &str) -> Vec<String> {
    let mut titles = Vec::new();
    let mut seen = HashSet::new();

    for inner in ReferenceFinder::new(content) {
        let title = inner.trim();
        if title.is_empty() {
            continue;
        }
        if seen.insert(title.to_lowercase()) {
            titles.push(title.to_string());
        }
    }
    titles
}

/// Iterator over the raw inner text of each `[[…]]` occurrence.
///
/// Matches leftmost-first: at each `[[` the inner text runs to the next `]`,
/// and the occurrence only counts when that `]` is immediately followed by
/// another `]`. Otherwise scanning resumes one byte after the `[[`.
struct ReferenceFinder<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> ReferenceFinder<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for ReferenceFinder<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(offset) = self.text[self.pos..].find(OPEN) {
            let open = self.pos + offset;
            let inner_start = open + OPEN.len();
            let rest = &self.text[inner_start..];

            let Some(inner_len) = rest.find(']') else {
                // No `]` anywhere after this point: nothing else can close.
                self.pos = self.text.len();
                return None;
            };

            if inner_len > 0 && rest[inner_len..].starts_with(CLOSE) {
                self.pos = inner_start + inner_len + CLOSE.len();
                return Some(&rest[..inner_len]);
            }

            // `[` is one byte, so `open + 1` stays on a char boundary.
            self.pos = open + 1;
        }
        self.pos = self.text.len();
        None
    }
}

// ── Autocomplete helpers ──────────────────────────────────────────────────────

/// If `content` ends inside an unclosed reference, return the partial title
/// typed so far (possibly empty, right after `[[`).
pub fn open_reference_prefix(content: &str) -> Option<&str> {
    let open = content.rfind(OPEN)?;
    let partial = &content[open + OPEN.len()..];
    if partial.contains(']') {
        return None;
    }
    Some(partial)
}

/// Replace a trailing unclosed `[[partial` with a closed `[[title]]`.
///
/// Returns `None` when `content` does not end inside an open reference.
pub fn complete_reference(content: &str, title: &str) -> Option<String> {
    let partial = open_reference_prefix(content)?;
    let keep = content.len() - partial.len() - OPEN.len();
    Some(format!("{}{OPEN}{title}{CLOSE}", &content[..keep]))
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Case-insensitive title → node id lookup.
///
/// Built from `(id, title)` pairs in priority order: the first pair seen for a
/// lowercase title wins. The store supplies nodes most-recently-updated first,
/// so when two notes' titles differ only by case, references resolve to the
/// one edited last. Later pairs are remembered only to report ambiguity.
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    by_title: HashMap<String, String>,
    collisions: HashMap<String, usize>,
}

impl TitleIndex {
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let mut index = Self::default();
        for (id, title) in pairs {
            let key = title.as_ref().trim().to_lowercase();
            if index.by_title.contains_key(&key) {
                *index.collisions.entry(key).or_insert(1) += 1;
            } else {
                index.by_title.insert(key, id.into());
            }
        }
        index
    }

    /// Node id for `title`, matched case-insensitively.
    pub fn resolve(&self, title: &str) -> Option<&str> {
        self.by_title
            .get(&title.trim().to_lowercase())
            .map(String::as_str)
    }

    /// `true` when more than one node carries `title` (ignoring case).
    pub fn is_ambiguous(&self, title: &str) -> bool {
        self.collisions.contains_key(&title.trim().to_lowercase())
    }

    /// Resolve every title, splitting them into distinct target ids (in input
    /// order) and titles that matched no node.
    pub fn resolve_all<'t>(&self, titles: &'t [String]) -> (Vec<String>, Vec<&'t str>) {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut unresolved = Vec::new();

        for title in titles {
            match self.resolve(title) {
                Some(id) => {
                    if seen.insert(id) {
                        ids.push(id.to_string());
                    }
                }
                None => unresolved.push(title.as_str()),
            }
        }
        (ids, unresolved)
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_in_first_occurrence_order_with_case_insensitive_dedup() {
        let refs = extract_references("See [[Foo]] and [[foo]] and [[Bar]]");
        assert_eq!(refs, vec!["Foo", "Bar"]);
    }

    #[test]
    fn trims_inner_whitespace_and_skips_blank() {
        let refs = extract_references("[[  Spaced Out  ]] [[ ]] [[]]");
        assert_eq!(refs, vec!["Spaced Out"]);
    }

    #[test]
    fn no_references_yields_empty() {
        assert!(extract_references("").is_empty());
        assert!(extract_references("plain [text] with [single] brackets").is_empty());
        assert!(extract_references("[[unterminated").is_empty());
    }

    #[test]
    fn inner_bracket_breaks_a_reference() {
        // `]` inside the brackets is not representable.
        assert!(extract_references("[[a]b]]").is_empty());
        assert_eq!(extract_references("[[a]b]] then [[C]]"), vec!["C"]);
    }

    #[test]
    fn leftmost_open_wins_for_triple_brackets() {
        assert_eq!(extract_references("[[[Foo]]"), vec!["[Foo"]);
    }

    #[test]
    fn references_may_span_lines_and_unicode() {
        let refs = extract_references("[[Café\nNotes]] and [[日本語]]");
        assert_eq!(refs, vec!["Café\nNotes", "日本語"]);
    }

    #[test]
    fn open_prefix_detection() {
        assert_eq!(open_reference_prefix("link to [[Ban"), Some("Ban"));
        assert_eq!(open_reference_prefix("just opened [["), Some(""));
        assert_eq!(open_reference_prefix("closed [[Banana]]"), None);
        assert_eq!(open_reference_prefix("no brackets"), None);
    }

    #[test]
    fn complete_reference_closes_trailing_partial() {
        assert_eq!(
            complete_reference("I like [[Ban", "Banana").as_deref(),
            Some("I like [[Banana]]")
        );
        assert_eq!(complete_reference("I like [[Banana]]", "Banana"), None);
    }

    #[test]
    fn title_index_resolves_case_insensitively() {
        let index = TitleIndex::from_pairs([("banana-1", "Banana"), ("apple-1", "Apple")]);
        assert_eq!(index.resolve("banana"), Some("banana-1"));
        assert_eq!(index.resolve("  APPLE "), Some("apple-1"));
        assert_eq!(index.resolve("Cherry"), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn first_pair_wins_on_case_collision() {
        // Priority order: most recently updated first.
        let index = TitleIndex::from_pairs([("recent", "Rust"), ("older", "rust")]);
        assert_eq!(index.resolve("RUST"), Some("recent"));
        assert!(index.is_ambiguous("rust"));
        assert!(!index.is_ambiguous("go"));
    }

    #[test]
    fn resolve_all_splits_and_dedups() {
        let index = TitleIndex::from_pairs([("b", "Banana"), ("a", "Apple")]);
        let titles = vec![
            "Banana".to_string(),
            "Cherry".to_string(),
            "banana ".to_string(),
            "Apple".to_string(),
        ];
        let (ids, unresolved) = index.resolve_all(&titles);
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(unresolved, vec!["Cherry"]);
    }
}
