//! Snippet Patcher: apply generator-suggested edits to in-memory projects
//!
//! A change names a file, an exact snippet expected in it, and the text that
//! replaces the snippet. Nothing else anchors it: no line numbers, no AST.
//! This crate turns lists of such changes into verified byte-span patches and
//! applies them without corrupting content when changes shift offsets or
//! collide.
//!
//! # Architecture
//!
//! - [`locate`] finds a snippet in a file, aware of patches accepted earlier
//!   in the same pass.
//! - [`resolve`] groups changes by file, drops overlaps and orders the
//!   survivors for application.
//! - [`edit`] splices a resolved patch list into file content.
//! - [`failure`] labels changes that did not apply.
//! - [`correction`] asks a [`ChangeGenerator`] to repair failed changes,
//!   bounded to a fixed number of attempts.
//! - [`history`] keeps whole-project snapshots for undo.
//! - [`engine`] ties everything together behind one [`Engine`].
//!
//! # Safety
//!
//! - Matching is byte-exact; there is no fuzzy fallback
//! - Every patch verifies its before-text before splicing
//! - Caller state is never mutated; operations return a new [`Project`]
//! - A failed operation commits nothing and pushes no undo snapshot
//!
//! # Example
//!
//! ```
//! use snippet_patcher::{Change, Engine, Project, ProjectFile};
//!
//! let engine = Engine::default();
//! let mut history = engine.new_history();
//! let project = Project::new(vec![ProjectFile::new("foo.js", "function a(){return 1;}")])?;
//!
//! let commit = engine.apply_change(
//!     &project,
//!     &mut history,
//!     &Change::new("foo.js", "return 1;", "return 2;"),
//! )?;
//!
//! assert_eq!(commit.project.content("foo.js"), Some("function a(){return 2;}"));
//! assert_eq!(history.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod correction;
pub mod corrector;
pub mod counter;
pub mod edit;
pub mod engine;
pub mod failure;
pub mod history;
pub mod locate;
pub mod model;
pub mod resolve;
pub mod workspace;

// Re-exports
pub use config::{
    load_from_path, load_from_str, parse_batch, parse_changes, parse_recommendation, ConfigError,
    EngineConfig, PayloadError,
};
pub use correction::{
    ChangeGenerator, CorrectionPolicy, CorrectionRequest, GeneratedChanges, GeneratorError,
};
pub use corrector::CommandGenerator;
pub use edit::{apply_patches, Applied, EditError, EditVerification, Patch};
pub use engine::{Commit, Engine, EngineError};
pub use failure::{FailedChange, FailureReason};
pub use history::{UndoManager, UndoState};
pub use model::{
    BatchRefactorResult, Change, ManualStep, Project, ProjectError, ProjectFile, RefactorResult,
};
pub use resolve::{resolve, FilePlan, Resolution};
