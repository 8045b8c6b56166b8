//! Workspace synchronizer.
//!
//! Each repository owns exactly one directory, `<root>/<repo name>`, created
//! lazily and reused across cycles. [`WorkspaceSynchronizer::sync`] brings it
//! to the remote branch tip using the cheapest applicable step:
//!
//! 1. absent or empty directory → clone
//! 2. existing checkout → fetch + hard reset (or fast-forward pull)
//!
//! A failed step leaves the directory untouched for inspection; the next
//! cycle simply tries again.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tidewatch_core::{CommitId, RepoName, RepositoryTarget};
use tidewatch_tools::{ExternalToolError, Vcs};

use crate::error::RepoError;

/// How an existing checkout is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Fetch, force-checkout the fetched tip, clean untracked files.
    #[default]
    HardReset,
    /// `pull --ff-only`; only safe when nothing touches the checkout.
    FastForward,
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reset" | "hard-reset" => Ok(Self::HardReset),
            "pull" | "ff" => Ok(Self::FastForward),
            other => Err(format!(
                "unknown update policy '{other}'; expected: reset, pull"
            )),
        }
    }
}

/// What [`WorkspaceSynchronizer::sync`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    Updated,
}

/// A workspace that was just synchronized to the branch tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceHandle {
    pub path: PathBuf,
    pub action: SyncAction,
}

pub struct WorkspaceSynchronizer {
    root: PathBuf,
    vcs: Arc<dyn Vcs>,
    policy: UpdatePolicy,
}

impl WorkspaceSynchronizer {
    pub fn new(root: impl Into<PathBuf>, vcs: Arc<dyn Vcs>, policy: UpdatePolicy) -> Self {
        Self {
            root: root.into(),
            vcs,
            policy,
        }
    }

    pub fn vcs(&self) -> &dyn Vcs {
        self.vcs.as_ref()
    }

    /// `<root>/<repo name>`, no I/O. Names are validated as image name
    /// components, so each is one directory and no two repositories share one.
    pub fn path_for(&self, repo: &RepoName) -> PathBuf {
        self.root.join(repo.as_str())
    }

    /// Bring the workspace for `target` to the remote branch tip.
    ///
    /// Idempotent: with no upstream change, a second call leaves the head
    /// where the first one put it.
    pub fn sync(&self, target: &RepositoryTarget) -> Result<WorkspaceHandle, RepoError> {
        std::fs::create_dir_all(&self.root).map_err(|source| RepoError::WorkspaceIo {
            repo: target.name.clone(),
            path: self.root.clone(),
            source,
        })?;

        let path = self.path_for(&target.name);
        let action = if needs_clone(&path) {
            tracing::info!(repo = %target.name, branch = %target.branch, path = %path.display(), "cloning workspace");
            self.vcs
                .clone_branch(&target.link, &target.branch, &path)
                .map(|()| SyncAction::Cloned)
        } else {
            tracing::debug!(repo = %target.name, branch = %target.branch, policy = ?self.policy, "updating workspace");
            let updated = match self.policy {
                UpdatePolicy::HardReset => self
                    .vcs
                    .fetch_and_hard_reset(&path, &target.link, &target.branch),
                UpdatePolicy::FastForward => self
                    .vcs
                    .pull_fast_forward(&path, &target.link, &target.branch),
            };
            updated.map(|()| SyncAction::Updated)
        };

        match action {
            Ok(action) => Ok(WorkspaceHandle { path, action }),
            Err(source) => {
                tracing::warn!(
                    repo = %target.name,
                    path = %path.display(),
                    "workspace left in place for inspection",
                );
                Err(RepoError::SyncFailure {
                    repo: target.name.clone(),
                    path,
                    source,
                })
            }
        }
    }

    /// Commit currently checked out in a synchronized workspace.
    pub fn head(&self, handle: &WorkspaceHandle) -> Result<CommitId, ExternalToolError> {
        self.vcs.current_head(&handle.path)
    }
}

/// Clone when the directory is missing or empty; anything else is treated as
/// an existing checkout (and fails loudly in `fetch` if it is not one).
fn needs_clone(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => !path.exists(),
    }
}
