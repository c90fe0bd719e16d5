//! On-disk project holder used by the command-line front end.
//!
//! Loads every UTF-8 text file under a directory into a [`Project`], writes
//! changed files back atomically, and persists the undo history and change
//! counters under `<root>/.snippet-patcher/`.
//!
//! Write-back never leaves the project: every target is canonicalized, so
//! `..` components and symlinks pointing outside the root are refused, as are
//! targets inside [`SKIPPED_DIRS`].

use crate::history::{HistoryError, UndoManager};
use crate::model::{Project, ProjectError, ProjectFile};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const STATE_DIR: &str = ".snippet-patcher";
pub const HISTORY_FILE: &str = "history.json";
pub const COUNTS_FILE: &str = "counts.json";
pub const CONFIG_FILE: &str = "config.toml";

/// Directories under the project root that are never loaded or written.
pub const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", STATE_DIR];

/// Files larger than this are not loaded.
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to walk project directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("refusing to write {name}: resolves outside the project")]
    OutsideProject { name: String },

    #[error("refusing to write {name}: inside skipped directory {dir}")]
    SkippedDir { name: String, dir: String },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("failed to parse change counters: {0}")]
    Counts(#[source] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    state_dir(root).join(CONFIG_FILE)
}

/// Project-relative name with `/` separators.
fn file_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Resolve a project file name to the path write-back may touch.
///
/// `root` must already be canonical. The target must exist.
fn target_path(root: &Path, name: &str) -> Result<PathBuf, WorkspaceError> {
    let outside = || WorkspaceError::OutsideProject {
        name: name.to_string(),
    };
    if Path::new(name).is_absolute() {
        return Err(outside());
    }

    let joined = root.join(name);
    let target = joined.canonicalize().map_err(io_error(&joined))?;
    let relative = target.strip_prefix(root).map_err(|_| outside())?;

    if let Some(first) = relative.components().next() {
        let first = first.as_os_str();
        if let Some(dir) = SKIPPED_DIRS.iter().find(|dir| first == OsStr::new(dir)) {
            return Err(WorkspaceError::SkippedDir {
                name: name.to_string(),
                dir: dir.to_string(),
            });
        }
    }
    Ok(target)
}

/// Load every UTF-8 text file under `root`.
///
/// Binary files, oversized files and the directories in [`SKIPPED_DIRS`] are
/// skipped. Files are ordered by name. Stored change counters are restored.
pub fn load_project(root: &Path) -> Result<Project, WorkspaceError> {
    let counts = load_counts(root)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !SKIPPED_DIRS.iter().any(|dir| *dir == name)
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = file_name(root, path) else {
            debug!(path = %path.display(), "skipping non UTF-8 path");
            continue;
        };

        let metadata = entry.metadata()?;
        if metadata.len() > MAX_FILE_BYTES {
            debug!(file = %name, bytes = metadata.len(), "skipping oversized file");
            continue;
        }

        let bytes = fs::read(path).map_err(io_error(path))?;
        let Ok(content) = String::from_utf8(bytes) else {
            debug!(file = %name, "skipping binary file");
            continue;
        };

        let changes_count = counts.get(&name).copied().unwrap_or(0);
        files.push(ProjectFile {
            name,
            content,
            changes_count,
        });
    }

    info!(root = %root.display(), files = files.len(), "loaded project");
    Ok(Project::new(files)?)
}

/// Write files whose content differs from `before` back to disk and persist
/// the change counters.
///
/// Every target is resolved before the first write; a refused path leaves
/// the disk untouched. Returns the names of the files written.
pub fn write_project(
    root: &Path,
    before: &Project,
    after: &Project,
) -> Result<Vec<String>, WorkspaceError> {
    let canonical_root = root.canonicalize().map_err(io_error(root))?;

    let targets = after
        .files()
        .iter()
        .filter(|file| before.content(&file.name) != Some(file.content.as_str()))
        .map(|file| target_path(&canonical_root, &file.name).map(|path| (file, path)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut written = Vec::with_capacity(targets.len());
    for (file, path) in targets {
        atomic_write(&path, file.content.as_bytes())?;
        debug!(file = %file.name, "wrote file");
        written.push(file.name.clone());
    }

    save_counts(root, after)?;
    info!(files = written.len(), "wrote project files");
    Ok(written)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or nothing changes.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), WorkspaceError> {
    let parent = path.parent().ok_or_else(|| WorkspaceError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ),
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_error(path))?;
    temp.write_all(content).map_err(io_error(path))?;
    temp.as_file().sync_all().map_err(io_error(path))?;
    temp.persist(path).map_err(|e| WorkspaceError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}

fn ensure_state_dir(root: &Path) -> Result<PathBuf, WorkspaceError> {
    let dir = state_dir(root);
    fs::create_dir_all(&dir).map_err(io_error(&dir))?;
    Ok(dir)
}

/// Load the persisted undo history, or an empty one.
pub fn load_history(root: &Path, capacity: usize) -> Result<UndoManager, WorkspaceError> {
    let path = state_dir(root).join(HISTORY_FILE);
    if !path.exists() {
        return Ok(UndoManager::new(capacity));
    }
    let json = fs::read_to_string(&path).map_err(io_error(&path))?;
    Ok(UndoManager::from_json_with_capacity(&json, capacity)?)
}

pub fn save_history(root: &Path, history: &UndoManager) -> Result<(), WorkspaceError> {
    let dir = ensure_state_dir(root)?;
    let path = dir.join(HISTORY_FILE);
    atomic_write(&path, history.to_json()?.as_bytes())
}

fn load_counts(root: &Path) -> Result<BTreeMap<String, u32>, WorkspaceError> {
    let path = state_dir(root).join(COUNTS_FILE);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let json = fs::read_to_string(&path).map_err(io_error(&path))?;
    serde_json::from_str(&json).map_err(WorkspaceError::Counts)
}

fn save_counts(root: &Path, project: &Project) -> Result<(), WorkspaceError> {
    let counts: BTreeMap<&str, u32> = project
        .files()
        .iter()
        .filter(|f| f.changes_count > 0)
        .map(|f| (f.name.as_str(), f.changes_count))
        .collect();
    if counts.is_empty() && !state_dir(root).join(COUNTS_FILE).exists() {
        return Ok(());
    }
    let dir = ensure_state_dir(root)?;
    let json = serde_json::to_string_pretty(&counts).map_err(WorkspaceError::Counts)?;
    atomic_write(&dir.join(COUNTS_FILE), json.as_bytes())
}
