use crate::correction::DEFAULT_MAX_ATTEMPTS;
use crate::history::DEFAULT_UNDO_CAPACITY;
use serde::Deserialize;
use std::fmt;

/// Upper bound on correction attempts; each attempt beyond the first is a
/// generator round-trip.
pub const MAX_ATTEMPTS_LIMIT: usize = 10;

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub correction: CorrectionSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.correction.max_attempts == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "correction.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.correction.max_attempts > MAX_ATTEMPTS_LIMIT {
            issues.push(ValidationIssue::OutOfRange {
                field: "correction.max_attempts",
                message: format!("must be at most {MAX_ATTEMPTS_LIMIT}"),
            });
        }
        if self.history.capacity == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "history.capacity",
                message: "must be at least 1".to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorrectionSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Send overlap discards to the generator like not-found snippets
    #[serde(default)]
    pub retry_overlaps: bool,
}

impl Default for CorrectionSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_overlaps: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HistorySettings {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_UNDO_CAPACITY,
        }
    }
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

fn default_capacity() -> usize {
    DEFAULT_UNDO_CAPACITY
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A change payload contained no changes
    EmptyChangeList,
    MissingField {
        index: Option<usize>,
        field: &'static str,
    },
    InvalidFileName {
        index: Option<usize>,
        name: String,
        message: &'static str,
    },
    OutOfRange {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyChangeList => write!(f, "payload contains no changes"),
            ValidationIssue::MissingField { index, field } => match index {
                Some(idx) => write!(f, "change #{idx} missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::InvalidFileName {
                index,
                name,
                message,
            } => match index {
                Some(idx) => write!(f, "change #{idx} has invalid file name '{name}': {message}"),
                None => write!(f, "invalid file name '{name}': {message}"),
            },
            ValidationIssue::OutOfRange { field, message } => {
                write!(f, "config field '{field}' {message}")
            }
        }
    }
}
