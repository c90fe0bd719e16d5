//! High-level operations: apply changes, run the correction loop, undo.
//!
//! Every mutating operation follows the same shape:
//! - resolve the change list against the caller's [`Project`]
//! - splice each file's patches into a fresh copy of the project
//! - push a snapshot of the untouched project onto the [`UndoManager`]
//! - bump the change counter of every file that was touched
//!
//! The caller's project is never modified. It gets back a [`Commit`] holding
//! the new project, or an [`EngineError`] and no state change at all.
//!
//! Failure policy per operation:
//!
//! | operation | policy |
//! |---|---|
//! | [`Engine::apply_change`] | the change applies or the call fails |
//! | [`Engine::apply_batch`] | commit what resolved, report the rest |
//! | [`Engine::apply_recommendation_once`] | main and related changes apply together, or nothing does |
//! | [`Engine::apply_recommendation`] | main and related changes apply together, with self-correction |
//! | [`Engine::apply_plan`] | self-correction; overlaps reported, not retried (unless configured) |

use crate::config::EngineConfig;
use crate::correction::{
    correct_until_clean, ChangeGenerator, CorrectionPolicy, GeneratedChanges, GeneratorError,
    LoopError,
};
use crate::counter::count_changes;
use crate::edit::{apply_patches, EditError};
use crate::failure::{failed_file_names, FailedChange};
use crate::history::UndoManager;
use crate::model::{BatchRefactorResult, Change, ManualStep, Project, RefactorResult};
use crate::resolve::{resolve, Resolution};
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("change to {} could not be applied: {}", .0.change.file_name, .0.reason)]
    ChangeRejected(FailedChange),

    #[error("none of the {} changes could be applied", .0.len())]
    NothingApplied(Vec<FailedChange>),

    #[error("recommendation rejected: {} of its changes could not be applied", .0.len())]
    RecommendationRejected(Vec<FailedChange>),

    #[error(
        "changes still failing after {attempts} attempts in: {}",
        .files.join(", ")
    )]
    CorrectionLoopExhausted {
        attempts: usize,
        files: Vec<String>,
        failed: Vec<FailedChange>,
    },

    #[error("change generator failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("patch application failed: {0}")]
    Edit(#[from] EditError),
}

impl EngineError {
    /// The changes behind the error, if it carries any.
    pub fn failed_changes(&self) -> &[FailedChange] {
        match self {
            EngineError::ChangeRejected(failed) => std::slice::from_ref(failed),
            EngineError::NothingApplied(failed)
            | EngineError::RecommendationRejected(failed)
            | EngineError::CorrectionLoopExhausted { failed, .. } => failed,
            EngineError::Generator(_) | EngineError::Edit(_) => &[],
        }
    }
}

fn loop_error(err: LoopError) -> EngineError {
    match err {
        LoopError::Exhausted(exhausted) => EngineError::CorrectionLoopExhausted {
            attempts: exhausted.attempts,
            files: exhausted.files,
            failed: exhausted.failed,
        },
        LoopError::Generator(e) => EngineError::Generator(e),
    }
}

/// The result of a successful mutating operation.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "Commit holds the new project state"]
pub struct Commit {
    pub project: Project,
    /// Changes spliced into the new project
    pub applied: Vec<Change>,
    /// Changes left out without blocking the commit
    pub failed: Vec<FailedChange>,
    pub manual_steps: Vec<ManualStep>,
    /// Resolution attempts it took (1 when no correction was needed)
    pub attempts: usize,
}

impl Commit {
    /// Names of files whose content changed, in project order.
    pub fn touched_files(&self) -> Vec<&str> {
        let applied: HashSet<&str> = self.applied.iter().map(|c| c.file_name.as_str()).collect();
        self.project
            .files()
            .iter()
            .filter(|f| applied.contains(f.name.as_str()))
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn failed_files(&self) -> Vec<String> {
        failed_file_names(&self.failed)
    }
}

/// Applies changes to projects according to an [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// An empty history sized from the configuration.
    pub fn new_history(&self) -> UndoManager {
        UndoManager::new(self.config.history.capacity)
    }

    /// Resolve without committing anything.
    pub fn preview(&self, project: &Project, changes: &[Change]) -> Resolution {
        resolve(project, changes)
    }

    /// Apply one change. It applies or nothing happens.
    pub fn apply_change(
        &self,
        project: &Project,
        history: &mut UndoManager,
        change: &Change,
    ) -> Result<Commit, EngineError> {
        let mut resolution = resolve(project, std::slice::from_ref(change));
        if let Some(failed) = resolution.failed.pop() {
            return Err(EngineError::ChangeRejected(failed));
        }
        commit(project, history, resolution, Vec::new(), 1)
    }

    /// Apply many changes at once, keeping whatever resolves.
    ///
    /// Changes that fail are reported in [`Commit::failed`]. The call only
    /// fails when not a single change could be applied.
    pub fn apply_batch(
        &self,
        project: &Project,
        history: &mut UndoManager,
        batch: &BatchRefactorResult,
    ) -> Result<Commit, EngineError> {
        let resolution = resolve(project, &batch.changes);
        if resolution.plans.is_empty() && !resolution.failed.is_empty() {
            return Err(EngineError::NothingApplied(resolution.failed));
        }
        commit(project, history, resolution, batch.manual_steps.clone(), 1)
    }

    /// Apply a main change with its related changes, all or nothing, without
    /// a generator to repair failures.
    pub fn apply_recommendation_once(
        &self,
        project: &Project,
        history: &mut UndoManager,
        recommendation: &RefactorResult,
    ) -> Result<Commit, EngineError> {
        let changes: Vec<Change> = recommendation.changes().cloned().collect();
        let resolution = resolve(project, &changes);
        if !resolution.failed.is_empty() {
            return Err(EngineError::RecommendationRejected(resolution.failed));
        }
        commit(
            project,
            history,
            resolution,
            recommendation.manual_steps.clone(),
            1,
        )
    }

    /// Apply a main change with its related changes, all or nothing.
    ///
    /// Any failure, overlap included, sends the failed changes back to the
    /// generator. If the recommendation still does not apply in full after
    /// the configured attempts, nothing is committed.
    pub async fn apply_recommendation<G>(
        &self,
        project: &Project,
        history: &mut UndoManager,
        generator: &G,
        instruction: &str,
        recommendation: &RefactorResult,
    ) -> Result<Commit, EngineError>
    where
        G: ChangeGenerator + ?Sized,
    {
        let policy = CorrectionPolicy {
            atomic: true,
            ..self.policy()
        };
        let converged = correct_until_clean(
            generator,
            policy,
            project,
            instruction,
            recommendation.clone().into_changes(),
        )
        .await
        .map_err(loop_error)?;

        let mut manual_steps = recommendation.manual_steps.clone();
        manual_steps.extend(converged.manual_steps);
        commit(
            project,
            history,
            converged.resolution,
            manual_steps,
            converged.attempts,
        )
    }

    /// Apply a multi-file plan with self-correction.
    ///
    /// Not-found snippets and unknown files are sent back to the generator.
    /// Overlap discards are reported in [`Commit::failed`] unless
    /// `retry_overlaps` is configured.
    pub async fn apply_plan<G>(
        &self,
        project: &Project,
        history: &mut UndoManager,
        generator: &G,
        instruction: &str,
        plan: &BatchRefactorResult,
    ) -> Result<Commit, EngineError>
    where
        G: ChangeGenerator + ?Sized,
    {
        let converged = correct_until_clean(
            generator,
            self.policy(),
            project,
            instruction,
            plan.changes.clone(),
        )
        .await
        .map_err(loop_error)?;

        let mut manual_steps = plan.manual_steps.clone();
        manual_steps.extend(converged.manual_steps);
        commit(
            project,
            history,
            converged.resolution,
            manual_steps,
            converged.attempts,
        )
    }

    /// Ask the generator for changes and apply them with self-correction.
    pub async fn run_instruction<G>(
        &self,
        project: &Project,
        history: &mut UndoManager,
        generator: &G,
        instruction: &str,
    ) -> Result<Commit, EngineError>
    where
        G: ChangeGenerator + ?Sized,
    {
        match generator.generate(instruction, project.files()).await? {
            GeneratedChanges::Single(recommendation) => {
                self.apply_recommendation(project, history, generator, instruction, &recommendation)
                    .await
            }
            GeneratedChanges::Batch(plan) => {
                self.apply_plan(project, history, generator, instruction, &plan)
                    .await
            }
        }
    }

    /// Roll `project` back to the newest snapshot. Returns `false` if there
    /// was nothing to undo.
    pub fn undo(&self, project: &mut Project, history: &mut UndoManager) -> bool {
        history.undo(project)
    }

    fn policy(&self) -> CorrectionPolicy {
        CorrectionPolicy {
            max_attempts: self.config.correction.max_attempts,
            retry_overlaps: self.config.correction.retry_overlaps,
            atomic: false,
        }
    }
}

/// Build the patched project, then record history. Nothing is pushed if
/// any file fails to splice.
fn commit(
    project: &Project,
    history: &mut UndoManager,
    resolution: Resolution,
    manual_steps: Vec<ManualStep>,
    attempts: usize,
) -> Result<Commit, EngineError> {
    let applied = resolution.accepted_changes();

    if resolution.plans.is_empty() {
        return Ok(Commit {
            project: project.clone(),
            applied,
            failed: resolution.failed,
            manual_steps,
            attempts,
        });
    }

    let mut files = project.files().to_vec();
    let mut touched = HashSet::with_capacity(resolution.plans.len());

    for plan in &resolution.plans {
        let Some(file) = files.iter_mut().find(|f| f.name == plan.file_name) else {
            continue;
        };
        let spliced = apply_patches(&file.content, &plan.patches)?;
        file.content = spliced.new_content;
        touched.insert(plan.file_name.clone());
    }

    count_changes(&mut files, &touched);
    history.record(project);

    info!(
        files = touched.len(),
        changes = applied.len(),
        failed = resolution.failed.len(),
        attempts,
        "committed changes"
    );

    Ok(Commit {
        project: Project::from_parts(files, project.analysis.clone()),
        applied,
        failed: resolution.failed,
        manual_steps,
        attempts,
    })
}
