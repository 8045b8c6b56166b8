//! Change detection strategies.
//!
//! Both strategies answer the same two questions ("what is the current
//! commit?" and "give me a checkout of it") and one is selected at
//! startup:
//!
//! - [`RemoteHead`] asks the remote for the branch tip without touching disk
//!   and only synchronizes the workspace when a build is actually needed.
//! - [`LocalWorkspace`] synchronizes the workspace every cycle and reads the
//!   head from the checkout.

use std::str::FromStr;

use tidewatch_core::{CommitId, RepositoryTarget};

use crate::error::RepoError;
use crate::workspace::{WorkspaceHandle, WorkspaceSynchronizer};

/// Result of the detection phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub commit: CommitId,
    /// Already-synchronized checkout, when detection had to produce one.
    pub workspace: Option<WorkspaceHandle>,
}

/// A checkout ready to be handed to the build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedWorkspace {
    pub handle: WorkspaceHandle,
    /// Commit actually checked out; this is what gets tagged and recorded.
    pub commit: CommitId,
}

pub trait SyncStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Current commit of `target`'s branch.
    fn detect(&self, target: &RepositoryTarget) -> Result<Detection, RepoError>;

    /// Turn a detection into a checkout at the detected (or newer) tip.
    fn prepare(
        &self,
        target: &RepositoryTarget,
        detection: Detection,
    ) -> Result<PreparedWorkspace, RepoError>;
}

/// Startup choice between the two strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    #[default]
    Remote,
    Workspace,
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "workspace" | "local" => Ok(Self::Workspace),
            other => Err(format!(
                "unknown detection mode '{other}'; expected: remote, workspace"
            )),
        }
    }
}

/// Build the strategy for `mode` around a workspace synchronizer.
pub fn strategy_for(mode: DetectionMode, workspaces: WorkspaceSynchronizer) -> Box<dyn SyncStrategy> {
    match mode {
        DetectionMode::Remote => Box::new(RemoteHead::new(workspaces)),
        DetectionMode::Workspace => Box::new(LocalWorkspace::new(workspaces)),
    }
}

// ---------------------------------------------------------------------------
// Remote-only
// ---------------------------------------------------------------------------

pub struct RemoteHead {
    workspaces: WorkspaceSynchronizer,
}

impl RemoteHead {
    pub fn new(workspaces: WorkspaceSynchronizer) -> Self {
        Self { workspaces }
    }
}

impl SyncStrategy for RemoteHead {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn detect(&self, target: &RepositoryTarget) -> Result<Detection, RepoError> {
        let commit = self
            .workspaces
            .vcs()
            .resolve_remote_head(&target.link, &target.branch)
            .map_err(|source| RepoError::DetectionUnavailable {
                repo: target.name.clone(),
                source,
            })?;
        Ok(Detection {
            commit,
            workspace: None,
        })
    }

    fn prepare(
        &self,
        target: &RepositoryTarget,
        detection: Detection,
    ) -> Result<PreparedWorkspace, RepoError> {
        let handle = match detection.workspace {
            Some(handle) => handle,
            None => self.workspaces.sync(target)?,
        };
        let checked_out = self
            .workspaces
            .head(&handle)
            .map_err(|source| RepoError::SyncFailure {
                repo: target.name.clone(),
                path: handle.path.clone(),
                source,
            })?;

        if checked_out != detection.commit {
            tracing::info!(
                repo = %target.name,
                detected = %detection.commit.short(),
                checked_out = %checked_out.short(),
                "branch advanced between detection and sync; building the checked-out commit",
            );
        }

        Ok(PreparedWorkspace {
            handle,
            commit: checked_out,
        })
    }
}

// ---------------------------------------------------------------------------
// Local workspace
// ---------------------------------------------------------------------------

pub struct LocalWorkspace {
    workspaces: WorkspaceSynchronizer,
}

impl LocalWorkspace {
    pub fn new(workspaces: WorkspaceSynchronizer) -> Self {
        Self { workspaces }
    }
}

impl SyncStrategy for LocalWorkspace {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn detect(&self, target: &RepositoryTarget) -> Result<Detection, RepoError> {
        let handle = self.workspaces.sync(target)?;
        let commit = self
            .workspaces
            .head(&handle)
            .map_err(|source| RepoError::DetectionUnavailable {
                repo: target.name.clone(),
                source,
            })?;
        Ok(Detection {
            commit,
            workspace: Some(handle),
        })
    }

    fn prepare(
        &self,
        target: &RepositoryTarget,
        detection: Detection,
    ) -> Result<PreparedWorkspace, RepoError> {
        let handle = match detection.workspace {
            Some(handle) => handle,
            None => self.workspaces.sync(target)?,
        };
        Ok(PreparedWorkspace {
            handle,
            commit: detection.commit,
        })
    }
}
