//! Project state and change values exchanged with the engine.
//!
//! Every type here is plain data. The engine never mutates a [`Project`] in
//! place: operations take a borrowed project and hand back a new one, so
//! snapshots held by the undo history stay valid.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// A single in-memory file of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Unique key within the project
    pub name: String,
    pub content: String,
    /// Number of committed batches that touched this file (display only)
    #[serde(default)]
    pub changes_count: u32,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            changes_count: 0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("duplicate file name in project: {0}")]
    DuplicateFile(String),
}

/// The full state a project holder hands to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProjectParts")]
pub struct Project {
    files: Vec<ProjectFile>,
    /// Last-known analysis annotations, carried through snapshots untouched
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
}

impl Project {
    /// Build a project, rejecting duplicate file names.
    pub fn new(files: Vec<ProjectFile>) -> Result<Self, ProjectError> {
        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.name.as_str()) {
                return Err(ProjectError::DuplicateFile(file.name.clone()));
            }
        }
        Ok(Self {
            files,
            analysis: None,
        })
    }

    pub fn with_analysis(mut self, analysis: serde_json::Value) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn files(&self) -> &[ProjectFile] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.file(name).is_some()
    }

    /// Content of the named file, if present.
    pub fn content(&self, name: &str) -> Option<&str> {
        self.file(name).map(|f| f.content.as_str())
    }

    /// Crate-internal constructor for already-validated file lists.
    pub(crate) fn from_parts(files: Vec<ProjectFile>, analysis: Option<serde_json::Value>) -> Self {
        Self { files, analysis }
    }
}

#[derive(Deserialize)]
struct ProjectParts {
    files: Vec<ProjectFile>,
    #[serde(default)]
    analysis: Option<serde_json::Value>,
}

impl TryFrom<ProjectParts> for Project {
    type Error = ProjectError;

    fn try_from(parts: ProjectParts) -> Result<Self, Self::Error> {
        let mut project = Project::new(parts.files)?;
        project.analysis = parts.analysis;
        Ok(project)
    }
}

/// Replace one exact span of text in a named file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub file_name: String,
    pub original_snippet: String,
    pub corrected_snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Change {
    pub fn new(
        file_name: impl Into<String>,
        original_snippet: impl Into<String>,
        corrected_snippet: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            original_snippet: original_snippet.into(),
            corrected_snippet: corrected_snippet.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Signed byte delta this change introduces once applied.
    pub fn len_delta(&self) -> isize {
        self.corrected_snippet.len() as isize - self.original_snippet.len() as isize
    }
}

/// An instruction the user has to carry out by hand. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualStep {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One recommendation: a main change plus the changes it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorResult {
    pub main_change: Change,
    #[serde(default)]
    pub related_changes: Vec<Change>,
    #[serde(default)]
    pub manual_steps: Vec<ManualStep>,
}

impl RefactorResult {
    pub fn new(main_change: Change) -> Self {
        Self {
            main_change,
            related_changes: Vec::new(),
            manual_steps: Vec::new(),
        }
    }

    /// Main change first, then related changes in order.
    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        std::iter::once(&self.main_change).chain(self.related_changes.iter())
    }

    pub fn into_changes(self) -> Vec<Change> {
        let mut changes = Vec::with_capacity(1 + self.related_changes.len());
        changes.push(self.main_change);
        changes.extend(self.related_changes);
        changes
    }
}

/// A consolidated plan spanning many recommendations or files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRefactorResult {
    pub changes: Vec<Change>,
    #[serde(default)]
    pub manual_steps: Vec<ManualStep>,
}

impl From<RefactorResult> for BatchRefactorResult {
    fn from(result: RefactorResult) -> Self {
        let manual_steps = result.manual_steps.clone();
        Self {
            changes: result.into_changes(),
            manual_steps,
        }
    }
}
