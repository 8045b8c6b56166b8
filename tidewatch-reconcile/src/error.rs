//! Error types for tidewatch-reconcile.

use std::path::PathBuf;

use thiserror::Error;

use tidewatch_core::RepoName;
use tidewatch_tools::ExternalToolError;

/// Which phase of a repository's reconciliation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Detection,
    Sync,
    Build,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Detection => "detect",
            FailureKind::Sync => "sync",
            FailureKind::Build => "build",
        }
    }
}

/// Failure scoped to one repository. Never crosses a repository boundary:
/// the cycle records it and moves on to the next target.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Remote or workspace unreachable, or the branch does not exist.
    #[error("cannot determine current commit for {repo}: {source}")]
    DetectionUnavailable {
        repo: RepoName,
        #[source]
        source: ExternalToolError,
    },

    /// Clone / fetch / reset failed. The workspace is left as-is.
    #[error("workspace sync failed for {repo} at {path}: {source}")]
    SyncFailure {
        repo: RepoName,
        path: PathBuf,
        #[source]
        source: ExternalToolError,
    },

    /// The workspace root could not be prepared.
    #[error("workspace I/O error for {repo} at {path}: {source}")]
    WorkspaceIo {
        repo: RepoName,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured build context does not exist in the checkout.
    #[error("build context for {repo} not found at {path}")]
    BuildContextMissing { repo: RepoName, path: PathBuf },

    /// The build tool failed to start or exited non-zero.
    #[error("build failed for {repo}: {source}")]
    BuildFailure {
        repo: RepoName,
        #[source]
        source: ExternalToolError,
    },
}

impl RepoError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RepoError::DetectionUnavailable { .. } => FailureKind::Detection,
            RepoError::SyncFailure { .. } | RepoError::WorkspaceIo { .. } => FailureKind::Sync,
            RepoError::BuildContextMissing { .. } | RepoError::BuildFailure { .. } => {
                FailureKind::Build
            }
        }
    }

    pub fn repo(&self) -> &RepoName {
        match self {
            RepoError::DetectionUnavailable { repo, .. }
            | RepoError::SyncFailure { repo, .. }
            | RepoError::WorkspaceIo { repo, .. }
            | RepoError::BuildContextMissing { repo, .. }
            | RepoError::BuildFailure { repo, .. } => repo,
        }
    }
}

/// Errors while writing registry credentials. Logged by the cycle; never fatal.
#[derive(Debug, Error)]
pub enum AuthError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Existing client config is not valid JSON.
    #[error("client config JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience constructor for [`AuthError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> AuthError {
    AuthError::Io {
        path: path.into(),
        source,
    }
}
