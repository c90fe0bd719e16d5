//! Patch set resolution: group changes by file, locate them, drop overlaps.
//!
//! Resolution is pure. It reads the project and a flat change list and
//! produces, per file, a validated patch list sorted by start descending,
//! ready for [`crate::edit::apply_patches`]. Nothing is mutated while the
//! list is scanned; each change is either accepted into the file's
//! [`PatchedView`] or rejected with a reason.

use crate::edit::Patch;
use crate::failure::{classify, FailedChange, FailureReason};
use crate::locate::PatchedView;
use crate::model::{Change, Project};
use tracing::{debug, warn};

/// Validated patches for one file, sorted by start descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlan {
    pub file_name: String,
    pub patches: Vec<Patch>,
}

/// Outcome of resolving a change list against a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// One entry per file with at least one accepted patch
    pub plans: Vec<FilePlan>,
    /// Rejected changes, in input order
    pub failed: Vec<FailedChange>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn patch_count(&self) -> usize {
        self.plans.iter().map(|p| p.patches.len()).sum()
    }

    /// Accepted changes, in file order then start order.
    pub fn accepted_changes(&self) -> Vec<Change> {
        self.plans
            .iter()
            .flat_map(|plan| plan.patches.iter().rev().map(|p| p.change.clone()))
            .collect()
    }
}

/// Resolve `changes` against the current content of `project`.
pub fn resolve(project: &Project, changes: &[Change]) -> Resolution {
    // Partition by file, keeping first-seen file order and scan order within a file.
    let mut by_file: Vec<(&str, Vec<(usize, &Change)>)> = Vec::new();
    let mut failed: Vec<(usize, FailedChange)> = Vec::new();

    for (idx, change) in changes.iter().enumerate() {
        if !project.contains(&change.file_name) {
            warn!(file = %change.file_name, "change targets unknown file");
            failed.push((
                idx,
                classify(change.clone(), FailureReason::FileNotFound, None),
            ));
            continue;
        }
        match by_file
            .iter_mut()
            .find(|(name, _)| *name == change.file_name)
        {
            Some((_, group)) => group.push((idx, change)),
            None => by_file.push((change.file_name.as_str(), vec![(idx, change)])),
        }
    }

    let mut plans = Vec::with_capacity(by_file.len());

    for (file_name, group) in by_file {
        let Some(content) = project.content(file_name) else {
            continue;
        };
        let mut view = PatchedView::new(content);

        for (idx, change) in group {
            let Some(start) = view.locate(change) else {
                warn!(file = %file_name, "snippet not found");
                failed.push((
                    idx,
                    classify(change.clone(), FailureReason::SnippetNotFound, Some(content)),
                ));
                continue;
            };

            let patch = Patch::new(start, change.clone());
            if view.collides(&patch) {
                warn!(file = %file_name, start, "discarding overlapping change");
                failed.push((
                    idx,
                    classify(change.clone(), FailureReason::OverlapDiscarded, Some(content)),
                ));
                continue;
            }

            debug!(file = %file_name, start, length = patch.length, "accepted patch");
            view.accept(patch);
        }

        if view.is_empty() {
            continue;
        }
        let mut patches = view.into_accepted();
        patches.reverse();
        plans.push(FilePlan {
            file_name: file_name.to_string(),
            patches,
        });
    }

    failed.sort_by_key(|(idx, _)| *idx);

    Resolution {
        plans,
        failed: failed.into_iter().map(|(_, f)| f).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectFile;

    fn project(files: &[(&str, &str)]) -> Project {
        Project::new(
            files
                .iter()
                .map(|(name, content)| ProjectFile::new(*name, *content))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_file_fails() {
        let p = project(&[("a.js", "x")]);
        let res = resolve(&p, &[Change::new("b.js", "x", "y")]);
        assert!(res.plans.is_empty());
        assert_eq!(res.failed[0].reason, FailureReason::FileNotFound);
    }

    #[test]
    fn test_patches_sorted_descending() {
        let p = project(&[("f", "AAAxBBB")]);
        let res = resolve(
            &p,
            &[Change::new("f", "AAA", "Z"), Change::new("f", "BBB", "Y")],
        );
        assert!(res.is_clean());
        let starts: Vec<_> = res.plans[0].patches.iter().map(|p| p.start).collect();
        assert_eq!(starts, [4, 0]);
    }

    #[test]
    fn test_later_overlap_discarded() {
        let p = project(&[("f", "abcdef")]);
        let res = resolve(
            &p,
            &[Change::new("f", "abcd", "X"), Change::new("f", "cdef", "Y")],
        );
        assert_eq!(res.patch_count(), 1);
        assert_eq!(res.plans[0].patches[0].change.original_snippet, "abcd");
        assert_eq!(res.failed.len(), 1);
        assert_eq!(res.failed[0].reason, FailureReason::OverlapDiscarded);
        assert_eq!(res.failed[0].change.original_snippet, "cdef");
    }

    #[test]
    fn test_scan_order_decides_overlap_winner() {
        let p = project(&[("f", "abcdef")]);
        let res = resolve(
            &p,
            &[Change::new("f", "cdef", "Y"), Change::new("f", "abcd", "X")],
        );
        assert_eq!(res.plans[0].patches[0].change.original_snippet, "cdef");
        assert_eq!(res.failed[0].change.original_snippet, "abcd");
    }

    #[test]
    fn test_failures_keep_input_order() {
        let p = project(&[("a", "1"), ("b", "2")]);
        let res = resolve(
            &p,
            &[
                Change::new("b", "missing", "x"),
                Change::new("z", "1", "x"),
                Change::new("a", "missing", "x"),
            ],
        );
        let names: Vec<_> = res.failed.iter().map(|f| f.change.file_name.as_str()).collect();
        assert_eq!(names, ["b", "z", "a"]);
    }

    #[test]
    fn test_multi_file_plans() {
        let p = project(&[("a", "one"), ("b", "two")]);
        let res = resolve(
            &p,
            &[Change::new("b", "two", "2"), Change::new("a", "one", "1")],
        );
        let files: Vec<_> = res.plans.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(files, ["b", "a"]);
        assert_eq!(res.accepted_changes().len(), 2);
    }
}
