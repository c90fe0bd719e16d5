//! Snippet location aware of patches accepted earlier in the same pass.
//!
//! The resolver accepts patches one by one. Each accepted patch changes what
//! later snippets should be matched against, so the locator searches the
//! already-patched text and translates the hit back to pre-pass coordinates
//! with the cumulative length delta of the patches in front of it.

use crate::edit::Patch;
use crate::model::Change;
use tracing::trace;

/// A span of the patched text that was produced by an accepted patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    start: usize,
    end: usize,
    delta: isize,
}

/// Pre-pass content of one file plus the patches accepted so far.
#[derive(Debug, Clone)]
pub struct PatchedView<'a> {
    original: &'a str,
    /// Sorted ascending by start
    accepted: Vec<Patch>,
    current: String,
    regions: Vec<Region>,
}

impl<'a> PatchedView<'a> {
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            accepted: Vec::new(),
            current: original.to_string(),
            regions: Vec::new(),
        }
    }

    /// The content as it reads with every accepted patch applied.
    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Whether `patch` collides with any accepted patch.
    pub fn collides(&self, patch: &Patch) -> bool {
        self.accepted.iter().any(|p| p.overlaps(patch))
    }

    /// Record an accepted patch. The caller guarantees it does not collide.
    pub fn accept(&mut self, patch: Patch) {
        let at = self.accepted.partition_point(|p| p.start < patch.start);
        self.accepted.insert(at, patch);
        self.rebuild();
    }

    /// Hand back the accepted patches, sorted ascending by start.
    pub fn into_accepted(self) -> Vec<Patch> {
        self.accepted
    }

    fn rebuild(&mut self) {
        let mut current = String::with_capacity(self.original.len());
        let mut regions = Vec::with_capacity(self.accepted.len());
        let mut cursor = 0;

        for patch in &self.accepted {
            current.push_str(&self.original[cursor..patch.start]);
            let start = current.len();
            current.push_str(&patch.change.corrected_snippet);
            regions.push(Region {
                start,
                end: current.len(),
                delta: patch.change.len_delta(),
            });
            cursor = patch.end();
        }
        current.push_str(&self.original[cursor..]);

        self.current = current;
        self.regions = regions;
    }

    /// Cumulative length delta of the regions that end at or before `index`.
    fn offset_before(&self, index: usize) -> isize {
        self.regions
            .iter()
            .take_while(|r| r.end <= index)
            .map(|r| r.delta)
            .sum()
    }

    /// Index of the first region the span `start..end` touches.
    fn touched_region(&self, start: usize, end: usize) -> Option<usize> {
        self.regions
            .iter()
            .position(|r| start < r.end && r.start < end)
    }

    /// Find where `change` applies, in pre-pass coordinates.
    ///
    /// The first occurrence in the patched text that does not touch text
    /// produced by an accepted patch wins. When every occurrence touches one,
    /// the start of the first touched patch is returned. When the patched
    /// text has no occurrence, an occurrence in the pre-pass text is
    /// returned. Both fallback spans collide with an accepted patch and are
    /// left for the resolver to discard. `None` means the snippet does not
    /// occur at all.
    pub fn locate(&self, change: &Change) -> Option<usize> {
        let snippet = change.original_snippet.as_str();

        if snippet.is_empty() {
            // An empty anchor only makes sense for a file that has no content yet.
            return self.original.is_empty().then_some(0);
        }

        let mut touched = None;
        let mut from = 0;
        while let Some(found) = self.current[from..].find(snippet) {
            let index = from + found;
            let end = index + snippet.len();
            match self.touched_region(index, end) {
                None => {
                    let offset = self.offset_before(index);
                    let start = (index as isize - offset).max(0) as usize;
                    trace!(file = %change.file_name, index, offset, start, "located snippet");
                    return Some(start);
                }
                Some(region) => {
                    touched.get_or_insert(region);
                }
            }
            from = next_char_boundary(&self.current, index);
        }

        if let Some(region) = touched {
            // Regions are built in the same order as `accepted`.
            let start = self.accepted[region].start;
            trace!(file = %change.file_name, start, "snippet only occurs in patched text");
            return Some(start);
        }
        self.original.find(snippet)
    }
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    let mut next = index + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next
}

/// Locate a single change in content with no earlier patches.
pub fn find_snippet(content: &str, change: &Change) -> Option<usize> {
    PatchedView::new(content).locate(change)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(original: &str, corrected: &str) -> Change {
        Change::new("f.txt", original, corrected)
    }

    fn accept(view: &mut PatchedView<'_>, c: Change) {
        let start = view.locate(&c).unwrap();
        view.accept(Patch::new(start, c));
    }

    #[test]
    fn test_find_snippet_exact() {
        assert_eq!(find_snippet("function a(){return 1;}", &change("return 1;", "x")), Some(13));
        assert_eq!(find_snippet("function a(){return 1;}", &change("return  1;", "x")), None);
    }

    #[test]
    fn test_whitespace_is_significant() {
        assert_eq!(find_snippet("a\tb", &change("a b", "x")), None);
        assert_eq!(find_snippet("a\r\nb", &change("a\nb", "x")), None);
    }

    #[test]
    fn test_offset_after_shrinking_patch() {
        let mut view = PatchedView::new("AAAxBBB");
        accept(&mut view, change("AAA", "Z"));
        assert_eq!(view.current(), "ZxBBB");
        // Found at 2 in the patched text, maps back to 4.
        assert_eq!(view.locate(&change("BBB", "Y")), Some(4));
    }

    #[test]
    fn test_offset_after_growing_patch() {
        let mut view = PatchedView::new("ab cd");
        accept(&mut view, change("ab", "abababab"));
        assert_eq!(view.locate(&change("cd", "x")), Some(3));
    }

    #[test]
    fn test_skips_text_produced_by_earlier_patch() {
        let mut view = PatchedView::new("foo bar");
        accept(&mut view, change("foo", "bar"));
        // The first "bar" in "bar bar" was written by the accepted patch.
        assert_eq!(view.locate(&change("bar", "baz")), Some(4));
    }

    #[test]
    fn test_repeated_snippet_takes_next_occurrence() {
        let mut view = PatchedView::new("foo foo");
        accept(&mut view, change("foo", "X"));
        assert_eq!(view.locate(&change("foo", "Y")), Some(4));
    }

    #[test]
    fn test_overlapping_snippet_falls_back_to_original() {
        let mut view = PatchedView::new("abcdef");
        accept(&mut view, change("abcd", "X"));
        let start = view.locate(&change("cdef", "Y")).unwrap();
        assert_eq!(start, 2);
        assert!(view.collides(&Patch::new(start, change("cdef", "Y"))));
    }

    #[test]
    fn test_match_across_deletion_is_not_clean() {
        let mut view = PatchedView::new("a-b");
        accept(&mut view, change("-", ""));
        assert_eq!(view.current(), "ab");
        let start = view.locate(&change("ab", "x")).unwrap();
        assert_eq!(start, 1);
        assert!(view.collides(&Patch::new(start, change("ab", "x"))));
    }

    #[test]
    fn test_chained_change_collides_with_its_source() {
        let mut view = PatchedView::new("foo");
        accept(&mut view, change("foo", "bar"));
        assert_eq!(view.current(), "bar");

        let start = view.locate(&change("bar", "baz")).unwrap();
        assert_eq!(start, 0);
        assert!(view.collides(&Patch::new(start, change("bar", "baz"))));
    }

    #[test]
    fn test_chained_change_picks_touched_patch() {
        let mut view = PatchedView::new("x = 1; y = 2;");
        accept(&mut view, change("x = 1;", "x = 10;"));
        accept(&mut view, change("y = 2;", "y = 20;"));
        // Only "y = 20;" contains "20", produced by the second patch at 7.
        assert_eq!(view.locate(&change("20", "30")), Some(7));
    }

    #[test]
    fn test_match_right_after_deletion() {
        let mut view = PatchedView::new("xxyy");
        accept(&mut view, change("xx", ""));
        assert_eq!(view.locate(&change("yy", "z")), Some(2));
    }

    #[test]
    fn test_empty_snippet_only_matches_empty_file() {
        assert_eq!(find_snippet("", &change("", "new file")), Some(0));
        assert_eq!(find_snippet("content", &change("", "x")), None);
    }

    #[test]
    fn test_multibyte_content() {
        let mut view = PatchedView::new("héllo wörld");
        accept(&mut view, change("héllo", "hi"));
        let start = view.locate(&change("wörld", "there")).unwrap();
        assert_eq!(&"héllo wörld"[start..start + "wörld".len()], "wörld");
    }
}
