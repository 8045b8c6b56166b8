//! Uniform subprocess wrapper.
//!
//! [`run`] executes a prepared [`Command`] to completion with stdin closed and
//! stdout/stderr captured. A spawn failure and a non-zero exit both come back
//! as [`ExternalToolError`]; the captured text is kept for diagnostics only.

use std::process::{Command, Output, Stdio};

use crate::error::ExternalToolError;

/// Captured output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub program: String,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// First line of stdout, trimmed. Empty when the program printed nothing.
    pub fn first_line(&self) -> &str {
        self.stdout.lines().next().unwrap_or("").trim()
    }
}

/// Run `cmd` to completion and capture its output.
pub fn run(cmd: &mut Command) -> Result<ToolOutput, ExternalToolError> {
    let program = program_name(cmd);
    tracing::trace!(command = %describe(cmd), "running external tool");

    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ExternalToolError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExternalToolError::Failed {
            program,
            code: output.status.code(),
            detail: format_failure(&output),
        });
    }

    Ok(ToolOutput {
        program,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Last `lines` lines of `text`, for logging long tool transcripts.
pub fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

pub(crate) fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// `program arg1 arg2 …` for trace logs.
fn describe(cmd: &Command) -> String {
    let mut line = program_name(cmd);
    for arg in cmd.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Prefer stderr, fall back to stdout, then to a bare exit description.
fn format_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => "no output".to_string(),
        (true, false) => tail(&stdout, 20),
        (false, _) => tail(&stderr, 20),
    }
}
