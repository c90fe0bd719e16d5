//! Boundary validation for generator output.
//!
//! Generators emit loosely shaped JSON: camelCase or snake_case keys, manual
//! steps as bare strings or objects, a single recommendation or a list. This
//! module accepts those shapes and turns them into strict [`Change`] values,
//! or rejects the payload with every problem listed. Code past this point
//! never has to wonder whether a field is missing.

use crate::config::schema::{ValidationError, ValidationIssue};
use crate::correction::GeneratedChanges;
use crate::model::{BatchRefactorResult, Change, ManualStep, RefactorResult};
use serde::Deserialize;
use std::fmt;

#[derive(Debug)]
pub enum PayloadError {
    Json(serde_json::Error),
    Validation(ValidationError),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Json(source) => write!(f, "failed to parse change payload: {}", source),
            PayloadError::Validation(source) => write!(f, "invalid change payload: {}", source),
        }
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PayloadError::Json(source) => Some(source),
            PayloadError::Validation(source) => Some(source),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawChange {
    #[serde(default, alias = "fileName", alias = "file")]
    file_name: Option<String>,
    #[serde(default, alias = "originalSnippet", alias = "original")]
    original_snippet: Option<String>,
    #[serde(
        default,
        alias = "correctedSnippet",
        alias = "corrected",
        alias = "replacement"
    )]
    corrected_snippet: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawManualStep {
    Text(String),
    Step {
        title: String,
        #[serde(default, alias = "description")]
        detail: Option<String>,
    },
}

impl From<RawManualStep> for ManualStep {
    fn from(raw: RawManualStep) -> Self {
        match raw {
            RawManualStep::Text(title) => ManualStep {
                title,
                detail: None,
            },
            RawManualStep::Step { title, detail } => ManualStep { title, detail },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Single {
        #[serde(alias = "mainChange")]
        main_change: RawChange,
        #[serde(default, alias = "relatedChanges")]
        related_changes: Vec<RawChange>,
        #[serde(default, alias = "manualSteps")]
        manual_steps: Vec<RawManualStep>,
    },
    Batch {
        changes: Vec<RawChange>,
        #[serde(default, alias = "manualSteps")]
        manual_steps: Vec<RawManualStep>,
    },
    List(Vec<RawChange>),
}

/// Check a file name a generator produced. Names are project-relative and
/// may not climb out of the project.
pub fn check_file_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("file name is empty");
    }
    if name.starts_with('/') || name.starts_with('\\') || name.get(1..2) == Some(":") {
        return Err("file name must be relative");
    }
    if name.split(['/', '\\']).any(|part| part == "..") {
        return Err("file name may not contain '..'");
    }
    Ok(())
}

fn validate_change(index: usize, raw: RawChange, issues: &mut Vec<ValidationIssue>) -> Option<Change> {
    let before = issues.len();

    let file_name = match raw.file_name {
        Some(name) => {
            if let Err(message) = check_file_name(&name) {
                issues.push(ValidationIssue::InvalidFileName {
                    index: Some(index),
                    name: name.clone(),
                    message,
                });
            }
            name
        }
        None => {
            issues.push(ValidationIssue::MissingField {
                index: Some(index),
                field: "fileName",
            });
            String::new()
        }
    };
    if raw.original_snippet.is_none() {
        issues.push(ValidationIssue::MissingField {
            index: Some(index),
            field: "originalSnippet",
        });
    }
    if raw.corrected_snippet.is_none() {
        issues.push(ValidationIssue::MissingField {
            index: Some(index),
            field: "correctedSnippet",
        });
    }

    if issues.len() > before {
        return None;
    }
    Some(Change {
        file_name,
        original_snippet: raw.original_snippet.unwrap_or_default(),
        corrected_snippet: raw.corrected_snippet.unwrap_or_default(),
        description: raw.description.filter(|d| !d.trim().is_empty()),
    })
}

fn validate_changes(raw: Vec<RawChange>) -> Result<Vec<Change>, ValidationError> {
    let mut issues = Vec::new();
    if raw.is_empty() {
        issues.push(ValidationIssue::EmptyChangeList);
    }
    let changes: Vec<Change> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(idx, change)| validate_change(idx, change, &mut issues))
        .collect();

    if issues.is_empty() {
        Ok(changes)
    } else {
        Err(ValidationError { issues })
    }
}

fn steps(raw: Vec<RawManualStep>) -> Vec<ManualStep> {
    raw.into_iter().map(ManualStep::from).collect()
}

/// Parse a payload keeping its shape.
///
/// A `mainChange` payload becomes [`GeneratedChanges::Single`] so callers can
/// apply it all or nothing; `{changes}` and bare lists become a batch.
pub fn parse_changes(input: &str) -> Result<GeneratedChanges, PayloadError> {
    let raw: RawPayload = serde_json::from_str(input).map_err(PayloadError::Json)?;
    match raw {
        RawPayload::Single {
            main_change,
            related_changes,
            manual_steps,
        } => {
            let mut all = Vec::with_capacity(1 + related_changes.len());
            all.push(main_change);
            all.extend(related_changes);
            let mut changes = validate_changes(all)
                .map_err(PayloadError::Validation)?
                .into_iter();

            let Some(main_change) = changes.next() else {
                return Err(PayloadError::Validation(ValidationError {
                    issues: vec![ValidationIssue::EmptyChangeList],
                }));
            };
            Ok(GeneratedChanges::Single(RefactorResult {
                main_change,
                related_changes: changes.collect(),
                manual_steps: steps(manual_steps),
            }))
        }
        RawPayload::Batch {
            changes,
            manual_steps,
        } => Ok(GeneratedChanges::Batch(BatchRefactorResult {
            changes: validate_changes(changes).map_err(PayloadError::Validation)?,
            manual_steps: steps(manual_steps),
        })),
        RawPayload::List(changes) => Ok(GeneratedChanges::Batch(BatchRefactorResult {
            changes: validate_changes(changes).map_err(PayloadError::Validation)?,
            manual_steps: Vec::new(),
        })),
    }
}

/// Parse any supported payload shape into a flat batch.
///
/// A single recommendation is flattened main change first.
pub fn parse_batch(input: &str) -> Result<BatchRefactorResult, PayloadError> {
    Ok(match parse_changes(input)? {
        GeneratedChanges::Single(recommendation) => recommendation.into(),
        GeneratedChanges::Batch(batch) => batch,
    })
}

/// Parse a single recommendation (`mainChange` plus optional related changes).
pub fn parse_recommendation(input: &str) -> Result<RefactorResult, PayloadError> {
    match parse_changes(input)? {
        GeneratedChanges::Single(recommendation) => Ok(recommendation),
        GeneratedChanges::Batch(_) => Err(PayloadError::Validation(ValidationError {
            issues: vec![ValidationIssue::MissingField {
                index: None,
                field: "mainChange",
            }],
        })),
    }
}
