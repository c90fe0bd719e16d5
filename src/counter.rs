//! Per-file change counters shown next to each file. Display only.

use crate::model::ProjectFile;
use std::collections::HashSet;

/// Bump `changes_count` once for every file that received at least one patch
/// in the committed batch, however many patches it received.
pub fn count_changes(files: &mut [ProjectFile], touched: &HashSet<String>) {
    for file in files.iter_mut().filter(|f| touched.contains(&f.name)) {
        file.changes_count = file.changes_count.saturating_add(1);
    }
}
