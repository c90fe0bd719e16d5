use crate::model::Change;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// A [`Change`] resolved to a concrete span of a file's pre-pass content.
///
/// Patches only live for one application pass. Intelligence lives in span
/// acquisition ([`crate::locate`], [`crate::resolve`]), not in application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Patch does nothing until passed to apply_patches()"]
pub struct Patch {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Length in bytes of the replaced span
    pub length: usize,
    pub change: Change,
    /// Verification of what we expect to find before splicing
    pub expected_before: EditVerification,
}

impl Patch {
    pub fn new(start: usize, change: Change) -> Self {
        Self {
            start,
            length: change.original_snippet.len(),
            expected_before: EditVerification::from_text(&change.original_snippet),
            change,
        }
    }

    /// Ending byte offset (exclusive)
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Whether the spans of two patches collide.
    ///
    /// Two insertions at the same position collide as well, since their
    /// relative order would be arbitrary.
    pub fn overlaps(&self, other: &Patch) -> bool {
        (self.start < other.end() && other.start < self.end()) || self.start == other.start
    }
}

/// Verification strategy for patch safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Before-text verification failed in {file} at byte {start}")]
    BeforeTextMismatch {
        file: String,
        start: usize,
        found: String,
    },

    #[error("Invalid byte range: [{start}, {end}) in content of length {len}")]
    InvalidByteRange { start: usize, end: usize, len: usize },

    #[error("Byte range [{start}, {end}) splits a UTF-8 character")]
    NotCharBoundary { start: usize, end: usize },

    #[error("Patches at {first} and {second} overlap or are not sorted descending")]
    Unordered { first: usize, second: usize },
}

/// New content produced by one application pass over a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub new_content: String,
    pub applied_count: usize,
}

/// Validate a single patch against the pre-pass content.
fn validate(content: &str, patch: &Patch) -> Result<(), EditError> {
    let (start, end) = (patch.start, patch.end());
    if end > content.len() {
        return Err(EditError::InvalidByteRange {
            start,
            end,
            len: content.len(),
        });
    }
    if !content.is_char_boundary(start) || !content.is_char_boundary(end) {
        return Err(EditError::NotCharBoundary { start, end });
    }

    let current = &content[start..end];
    if !patch.expected_before.matches(current) {
        return Err(EditError::BeforeTextMismatch {
            file: patch.change.file_name.clone(),
            start,
            found: current.to_string(),
        });
    }
    Ok(())
}

/// Splice a descending, non-overlapping patch list into `content`.
///
/// Patches are applied bottom-to-top so that every start offset still refers
/// to the original content. The input string is never modified. The whole
/// list is validated before anything is spliced, so an error leaves no
/// half-applied result behind.
pub fn apply_patches(content: &str, patches: &[Patch]) -> Result<Applied, EditError> {
    for patch in patches {
        validate(content, patch)?;
    }

    // Sorted descending: the later patch in the list must end before the
    // earlier one starts.
    for window in patches.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.end() > later.start || earlier.start == later.start {
            return Err(EditError::Unordered {
                first: later.start,
                second: earlier.start,
            });
        }
    }

    let mut new_content = content.to_string();
    for patch in patches {
        new_content.replace_range(patch.start..patch.end(), &patch.change.corrected_snippet);
    }

    Ok(Applied {
        new_content,
        applied_count: patches.len(),
    })
}
