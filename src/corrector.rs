//! A [`ChangeGenerator`] backed by an external command.
//!
//! The command runs through `sh -c`, receives one JSON request on stdin and
//! must print a change payload on stdout (any shape accepted by
//! [`crate::config::parse_changes`]). Requests carry a `mode` field:
//!
//! ```json
//! {"mode": "correct", "failed_changes": [...], "instruction": "...", "current_files": [...], "attempt": 1}
//! {"mode": "generate", "instruction": "...", "files": [...]}
//! ```

use crate::config::payload::{parse_batch, parse_changes};
use crate::correction::{ChangeGenerator, CorrectionRequest, GeneratedChanges, GeneratorError};
use crate::model::{ProjectFile, RefactorResult};
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum CommandRequest<'a> {
    Generate {
        instruction: &'a str,
        files: &'a [ProjectFile],
    },
    Correct(&'a CorrectionRequest<'a>),
}

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
}

impl CommandGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    async fn run(&self, request: &CommandRequest<'_>) -> Result<String, GeneratorError> {
        let input = serde_json::to_vec(request)
            .map_err(|e| GeneratorError::Request(format!("cannot encode request: {e}")))?;

        debug!(command = %self.command, bytes = input.len(), "running generator command");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GeneratorError::Request(format!("cannot start '{}': {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores its input may close stdin early.
            if let Err(e) = stdin.write_all(&input).await {
                debug!(error = %e, "generator command closed stdin");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GeneratorError::Request(format!("'{}' failed: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GeneratorError::Request(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| GeneratorError::InvalidResponse("output is not UTF-8".to_string()))
    }
}

#[async_trait]
impl ChangeGenerator for CommandGenerator {
    async fn generate(
        &self,
        instruction: &str,
        files: &[ProjectFile],
    ) -> Result<GeneratedChanges, GeneratorError> {
        let stdout = self
            .run(&CommandRequest::Generate { instruction, files })
            .await?;
        parse_changes(&stdout).map_err(|e| GeneratorError::InvalidResponse(e.to_string()))
    }

    async fn correct(
        &self,
        request: CorrectionRequest<'_>,
    ) -> Result<RefactorResult, GeneratorError> {
        let stdout = self.run(&CommandRequest::Correct(&request)).await?;
        let batch =
            parse_batch(&stdout).map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;

        let mut changes = batch.changes.into_iter();
        let main_change = changes.next().ok_or_else(|| {
            GeneratorError::InvalidResponse("correction contains no changes".to_string())
        })?;
        Ok(RefactorResult {
            main_change,
            related_changes: changes.collect(),
            manual_steps: batch.manual_steps,
        })
    }
}
