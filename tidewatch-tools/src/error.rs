//! Error types for tidewatch-tools.

use thiserror::Error;

/// Failure of any external program invocation.
#[derive(Debug, Error)]
pub enum ExternalToolError {
    /// The program could not be started (not installed, not executable, ...).
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited non-zero (or was killed by a signal).
    #[error("{program} exited with {}: {detail}", exit_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        /// Trimmed stderr (or stdout when stderr is empty).
        detail: String,
    },

    /// The program succeeded but printed something we could not interpret.
    #[error("unexpected output from {program}: {reason}")]
    UnexpectedOutput { program: String, reason: String },
}

impl ExternalToolError {
    /// Exit code for failed runs; `None` for spawn errors and signals.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExternalToolError::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}
