//! Failure classification for changes that could not be applied.

use crate::model::Change;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lines shorter than this are never offered as a "closest line" hint.
const MIN_HINT_LINE_LEN: usize = 4;
const HINT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Why a change did not make it into the committed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The original snippet does not occur verbatim in the target file
    SnippetNotFound,
    /// The change names a file the project does not contain
    FileNotFound,
    /// Valid on its own, but collided with a change accepted earlier in the pass
    OverlapDiscarded,
}

impl FailureReason {
    /// Whether the failure is the generator's mistake and worth a correction
    /// round. Overlaps are a resolver decision; they are retried only when the
    /// caller opts in.
    pub fn is_retryable(self, retry_overlaps: bool) -> bool {
        match self {
            FailureReason::SnippetNotFound | FailureReason::FileNotFound => true,
            FailureReason::OverlapDiscarded => retry_overlaps,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SnippetNotFound => write!(f, "snippet not found"),
            FailureReason::FileNotFound => write!(f, "file not found"),
            FailureReason::OverlapDiscarded => write!(f, "overlaps an earlier change"),
        }
    }
}

/// A change that could not be applied, with the reason and an optional hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChange {
    pub change: Change,
    pub reason: FailureReason,
    /// Diagnostic only; never used for matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl FailedChange {
    pub fn new(change: Change, reason: FailureReason) -> Self {
        Self {
            change,
            reason,
            hint: None,
        }
    }
}

impl fmt::Display for FailedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.change.file_name, self.reason)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

/// Label a change that failed to apply against `content` (the file's
/// pre-pass content, or `None` when the file is missing).
pub fn classify(change: Change, reason: FailureReason, content: Option<&str>) -> FailedChange {
    let hint = match (reason, content) {
        (FailureReason::SnippetNotFound, Some(content)) => closest_line_hint(content, &change),
        (FailureReason::FileNotFound, _) => {
            Some(format!("no file named '{}' in the project", change.file_name))
        }
        _ => None,
    };
    FailedChange {
        change,
        reason,
        hint,
    }
}

/// Point at the file line most similar to the snippet's first non-blank line.
fn closest_line_hint(content: &str, change: &Change) -> Option<String> {
    let needle = change
        .original_snippet
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?;

    let (line_no, line, score) = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| line.len() >= MIN_HINT_LINE_LEN)
        .map(|(idx, line)| (idx, line, strsim::normalized_levenshtein(needle, line)))
        .max_by(|a, b| a.2.total_cmp(&b.2))?;

    (score >= HINT_SIMILARITY_THRESHOLD).then(|| {
        format!(
            "closest match at line {line_no} ({:.0}% similar): {line}",
            score * 100.0
        )
    })
}

/// Names of the distinct files referenced by `failed`, in first-seen order.
pub fn failed_file_names(failed: &[FailedChange]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for f in failed {
        if !names.contains(&f.change.file_name) {
            names.push(f.change.file_name.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_policy() {
        assert!(FailureReason::SnippetNotFound.is_retryable(false));
        assert!(FailureReason::FileNotFound.is_retryable(false));
        assert!(!FailureReason::OverlapDiscarded.is_retryable(false));
        assert!(FailureReason::OverlapDiscarded.is_retryable(true));
    }

    #[test]
    fn test_hint_points_at_similar_line() {
        let content = "fn main() {\n    let total = compute(1);\n}\n";
        let change = Change::new("main.rs", "    let total = compute(2);", "x");
        let failed = classify(change, FailureReason::SnippetNotFound, Some(content));
        let hint = failed.hint.unwrap();
        assert!(hint.contains("line 2"), "{hint}");
    }

    #[test]
    fn test_no_hint_for_unrelated_snippet() {
        let content = "fn main() {}\n";
        let change = Change::new("main.rs", "completely different text here", "x");
        let failed = classify(change, FailureReason::SnippetNotFound, Some(content));
        assert!(failed.hint.is_none());
    }

    #[test]
    fn test_file_not_found_hint() {
        let failed = classify(
            Change::new("gone.rs", "a", "b"),
            FailureReason::FileNotFound,
            None,
        );
        assert!(failed.hint.unwrap().contains("gone.rs"));
    }

    #[test]
    fn test_failed_file_names_dedup() {
        let failed = vec![
            FailedChange::new(Change::new("b", "1", "2"), FailureReason::SnippetNotFound),
            FailedChange::new(Change::new("a", "1", "2"), FailureReason::SnippetNotFound),
            FailedChange::new(Change::new("b", "3", "4"), FailureReason::OverlapDiscarded),
        ];
        assert_eq!(failed_file_names(&failed), ["b", "a"]);
    }

    #[test]
    fn test_reason_serializes_screaming_case() {
        let json = serde_json::to_string(&FailureReason::SnippetNotFound).unwrap();
        assert_eq!(json, "\"SNIPPET_NOT_FOUND\"");
    }
}
