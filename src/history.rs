//! Bounded undo history of whole-project snapshots.
//!
//! Every committed batch pushes a full copy of the project as it was right
//! before the commit. `undo` is a rollback to that copy, not a reverse diff.
//! The stack is plain data; persisting it is left to the caller through
//! [`UndoManager::to_json`] and [`UndoManager::from_json`].

use crate::model::{Project, ProjectFile};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_UNDO_CAPACITY: usize = 10;

/// A deep, independent copy of a project taken before a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoState {
    pub files: Vec<ProjectFile>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
}

impl UndoState {
    pub fn capture(project: &Project) -> Self {
        Self {
            files: project.files().to_vec(),
            analysis: project.analysis.clone(),
        }
    }

    pub fn into_project(self) -> Project {
        Project::from_parts(self.files, self.analysis)
    }
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("failed to serialize undo history: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to parse undo history: {0}")]
    Parse(#[source] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct PersistedHistory {
    capacity: usize,
    /// Oldest first
    snapshots: Vec<UndoState>,
}

/// LIFO stack of snapshots, evicting the oldest beyond `capacity`.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoManager {
    capacity: usize,
    /// Oldest at the front, newest at the back
    stack: VecDeque<UndoState>,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

impl UndoManager {
    /// Create an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            stack: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Newest snapshot, if any.
    pub fn peek(&self) -> Option<&UndoState> {
        self.stack.back()
    }

    /// Snapshots from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &UndoState> {
        self.stack.iter()
    }

    pub fn push(&mut self, snapshot: UndoState) {
        if self.stack.len() == self.capacity {
            self.stack.pop_front();
            debug!(capacity = self.capacity, "evicted oldest undo snapshot");
        }
        self.stack.push_back(snapshot);
    }

    /// Snapshot `project` and push it.
    pub fn record(&mut self, project: &Project) {
        self.push(UndoState::capture(project));
    }

    pub fn pop(&mut self) -> Option<UndoState> {
        self.stack.pop_back()
    }

    /// Replace `project` with the newest snapshot.
    ///
    /// Returns `false` and leaves `project` untouched when the history is empty.
    pub fn undo(&mut self, project: &mut Project) -> bool {
        match self.pop() {
            Some(snapshot) => {
                *project = snapshot.into_project();
                info!(remaining = self.stack.len(), "restored undo snapshot");
                true
            }
            None => false,
        }
    }

    pub fn to_json(&self) -> Result<String, HistoryError> {
        let persisted = PersistedHistory {
            capacity: self.capacity,
            snapshots: self.stack.iter().cloned().collect(),
        };
        serde_json::to_string_pretty(&persisted).map_err(HistoryError::Serialize)
    }

    /// Restore a persisted history. Entries beyond the capacity are dropped,
    /// oldest first.
    pub fn from_json(input: &str) -> Result<Self, HistoryError> {
        let persisted: PersistedHistory = serde_json::from_str(input).map_err(HistoryError::Parse)?;
        let mut manager = Self::new(persisted.capacity);
        for snapshot in persisted.snapshots {
            manager.push(snapshot);
        }
        Ok(manager)
    }

    /// Restore a persisted history under a different capacity.
    pub fn from_json_with_capacity(input: &str, capacity: usize) -> Result<Self, HistoryError> {
        let restored = Self::from_json(input)?;
        let mut manager = Self::new(capacity);
        for snapshot in restored.stack {
            manager.push(snapshot);
        }
        Ok(manager)
    }
}
