//! Self-correction: reapply, and ask the generator to repair what failed.
//!
//! Snippets coming from a generator are untrusted. When some of them do not
//! match, the loop hands the generator the failed changes together with the
//! real file contents and asks for replacements. Attempts are bounded, and
//! only one generator call is outstanding at a time.

use crate::failure::{failed_file_names, FailedChange};
use crate::model::{BatchRefactorResult, Change, ManualStep, Project, ProjectFile, RefactorResult};
use crate::resolve::{resolve, Resolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Request(String),

    #[error("generator returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("generator does not support {0}")]
    Unsupported(&'static str),
}

/// What the generator is asked to repair.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionRequest<'a> {
    pub failed_changes: &'a [FailedChange],
    pub instruction: &'a str,
    /// Ground truth: the files as they are right now
    pub current_files: &'a [ProjectFile],
    /// 1-based attempt that just failed
    pub attempt: usize,
}

/// Output of [`ChangeGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratedChanges {
    Single(RefactorResult),
    Batch(BatchRefactorResult),
}

/// The external component that produces changes, usually backed by an LLM.
#[async_trait]
pub trait ChangeGenerator: Send + Sync {
    /// Produce changes for `instruction` against `files`.
    async fn generate(
        &self,
        _instruction: &str,
        _files: &[ProjectFile],
    ) -> Result<GeneratedChanges, GeneratorError> {
        Err(GeneratorError::Unsupported("generate"))
    }

    /// Regenerate the failed changes using the current file contents.
    async fn correct(&self, request: CorrectionRequest<'_>)
        -> Result<RefactorResult, GeneratorError>;
}

/// How the loop treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionPolicy {
    pub max_attempts: usize,
    /// Forward overlap discards to the generator like not-found snippets
    pub retry_overlaps: bool,
    /// Every failure blocks the commit, overlaps included
    pub atomic: bool,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_overlaps: false,
            atomic: false,
        }
    }
}

impl CorrectionPolicy {
    fn is_retryable(&self, failed: &FailedChange) -> bool {
        self.atomic || failed.reason.is_retryable(self.retry_overlaps)
    }
}

/// A resolution the loop accepted, ready to be committed.
#[derive(Debug)]
pub(crate) struct Converged {
    pub resolution: Resolution,
    pub attempts: usize,
    pub manual_steps: Vec<ManualStep>,
}

/// The loop ran out of attempts.
#[derive(Debug)]
pub(crate) struct Exhausted {
    pub attempts: usize,
    pub files: Vec<String>,
    pub failed: Vec<FailedChange>,
}

#[derive(Debug)]
pub(crate) enum LoopError {
    Exhausted(Exhausted),
    Generator(GeneratorError),
}

/// Run attempts until the change list resolves without blocking failures.
pub(crate) async fn correct_until_clean<G>(
    generator: &G,
    policy: CorrectionPolicy,
    project: &Project,
    instruction: &str,
    changes: Vec<Change>,
) -> Result<Converged, LoopError>
where
    G: ChangeGenerator + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut candidates = changes;
    let mut manual_steps = Vec::new();
    let mut attempt = 1;

    loop {
        let resolution = resolve(project, &candidates);
        let blocking: Vec<FailedChange> = resolution
            .failed
            .iter()
            .filter(|f| policy.is_retryable(f))
            .cloned()
            .collect();

        if blocking.is_empty() {
            info!(attempt, patches = resolution.patch_count(), "changes resolved");
            return Ok(Converged {
                resolution,
                attempts: attempt,
                manual_steps,
            });
        }

        if attempt >= max_attempts {
            warn!(attempt, failed = blocking.len(), "self-correction exhausted");
            return Err(LoopError::Exhausted(Exhausted {
                attempts: attempt,
                files: failed_file_names(&blocking),
                failed: resolution.failed,
            }));
        }

        warn!(
            attempt,
            failed = blocking.len(),
            "changes failed to apply, requesting correction"
        );
        let corrected = generator
            .correct(CorrectionRequest {
                failed_changes: &blocking,
                instruction,
                current_files: project.files(),
                attempt,
            })
            .await
            .map_err(LoopError::Generator)?;

        manual_steps.extend(corrected.manual_steps.iter().cloned());
        candidates = replace_failed(candidates, &blocking, corrected.into_changes());
        attempt += 1;
    }
}

/// Swap the failed entries of `candidates` for `replacements`.
///
/// Replacements take the slot of the first failed entry; every other
/// candidate keeps its relative order.
fn replace_failed(
    candidates: Vec<Change>,
    failed: &[FailedChange],
    replacements: Vec<Change>,
) -> Vec<Change> {
    let mut pending: Vec<&Change> = failed.iter().map(|f| &f.change).collect();
    let mut replacements = Some(replacements);
    let mut next = Vec::with_capacity(candidates.len());

    for change in candidates {
        match pending.iter().position(|f| **f == change) {
            Some(pos) => {
                pending.swap_remove(pos);
                if let Some(replacements) = replacements.take() {
                    next.extend(replacements);
                }
            }
            None => next.push(change),
        }
    }
    if let Some(replacements) = replacements {
        next.extend(replacements);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureReason;

    fn failed(change: &Change) -> FailedChange {
        FailedChange::new(change.clone(), FailureReason::SnippetNotFound)
    }

    #[test]
    fn test_replace_failed_keeps_order() {
        let a = Change::new("f", "a", "1");
        let b = Change::new("f", "b", "2");
        let c = Change::new("f", "c", "3");
        let fixed = Change::new("f", "B", "2");

        let next = replace_failed(
            vec![a.clone(), b.clone(), c.clone()],
            &[failed(&b)],
            vec![fixed.clone()],
        );
        assert_eq!(next, vec![a, fixed, c]);
    }

    #[test]
    fn test_replace_failed_multiple() {
        let a = Change::new("f", "a", "1");
        let b = Change::new("f", "b", "2");
        let fixes = vec![Change::new("f", "A", "1"), Change::new("f", "B", "2")];

        let next = replace_failed(
            vec![a.clone(), b.clone()],
            &[failed(&a), failed(&b)],
            fixes.clone(),
        );
        assert_eq!(next, fixes);
    }

    #[test]
    fn test_replace_failed_duplicate_entries() {
        let a = Change::new("f", "a", "1");
        let next = replace_failed(
            vec![a.clone(), a.clone()],
            &[failed(&a)],
            vec![Change::new("f", "x", "y")],
        );
        assert_eq!(next.len(), 2);
        assert_eq!(next[1], a);
    }

    #[test]
    fn test_atomic_policy_blocks_overlaps() {
        let overlap = FailedChange::new(Change::new("f", "a", "b"), FailureReason::OverlapDiscarded);
        let lenient = CorrectionPolicy::default();
        let atomic = CorrectionPolicy {
            atomic: true,
            ..CorrectionPolicy::default()
        };
        assert!(!lenient.is_retryable(&overlap));
        assert!(atomic.is_retryable(&overlap));
    }
}
