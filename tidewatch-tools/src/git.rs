//! Version-control client.
//!
//! [`Vcs`] is the seam the reconciler talks to; [`GitCli`] implements it by
//! shelling out to the `git` binary through [`crate::command::run`].

use std::path::{Path, PathBuf};
use std::process::Command;

use tidewatch_core::CommitId;

use crate::command::{self, ToolOutput};
use crate::error::ExternalToolError;

/// Primitive version-control operations used by change detection and
/// workspace synchronization.
pub trait Vcs: Send + Sync {
    /// Commit at the tip of `branch` on the remote, without fetching objects.
    fn resolve_remote_head(&self, url: &str, branch: &str) -> Result<CommitId, ExternalToolError>;

    /// Clone `branch` of `url` into `dest` (which must be absent or empty).
    fn clone_branch(&self, url: &str, branch: &str, dest: &Path) -> Result<(), ExternalToolError>;

    /// Fetch `branch` and force the working tree to the fetched tip,
    /// discarding local edits and untracked files.
    fn fetch_and_hard_reset(&self, dest: &Path, url: &str, branch: &str)
        -> Result<(), ExternalToolError>;

    /// Point `origin` at `url`, then fast-forward-only pull of `branch`.
    /// Fails if the checkout diverged.
    fn pull_fast_forward(&self, dest: &Path, url: &str, branch: &str)
        -> Result<(), ExternalToolError>;

    /// Commit currently checked out in `dest`.
    fn current_head(&self, dest: &Path) -> Result<CommitId, ExternalToolError>;
}

/// [`Vcs`] backed by the `git` command-line client.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    shallow: bool,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            shallow: true,
        }
    }

    /// Use `--depth 1` for clones and fetches (default `true`).
    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        // Never block the loop on an interactive credential prompt.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn run_in(&self, dir: &Path, args: &[&str]) -> Result<ToolOutput, ExternalToolError> {
        let mut cmd = self.command();
        cmd.current_dir(dir).args(args);
        command::run(&mut cmd)
    }
}

impl Vcs for GitCli {
    fn resolve_remote_head(&self, url: &str, branch: &str) -> Result<CommitId, ExternalToolError> {
        let reference = branch_ref(branch);
        let mut cmd = self.command();
        cmd.args(["ls-remote", "--", url, reference.as_str()]);
        let output = command::run(&mut cmd)?;
        parse_ls_remote(&output.stdout, &reference).ok_or_else(|| {
            ExternalToolError::UnexpectedOutput {
                program: output.program,
                reason: format!("branch '{branch}' not found on {url}"),
            }
        })
    }

    fn clone_branch(&self, url: &str, branch: &str, dest: &Path) -> Result<(), ExternalToolError> {
        let dest_str = dest.to_string_lossy().into_owned();
        let mut args = vec!["clone", "--single-branch", "--branch", branch];
        if self.shallow {
            args.extend(["--depth", "1"]);
        }
        args.extend(["--", url, dest_str.as_str()]);

        let mut cmd = self.command();
        cmd.args(&args);
        command::run(&mut cmd).map(|_| ())
    }

    fn fetch_and_hard_reset(
        &self,
        dest: &Path,
        url: &str,
        branch: &str,
    ) -> Result<(), ExternalToolError> {
        let tracking = tracking_ref(branch);
        let refspec = format!("+{}:{tracking}", branch_ref(branch));

        // Keep the workspace pointed at the configured link if it was edited.
        self.run_in(dest, &["remote", "set-url", "origin", url])?;

        let mut fetch = vec!["fetch", "--prune", "origin", refspec.as_str()];
        if self.shallow {
            fetch.insert(1, "--depth=1");
        }
        self.run_in(dest, &fetch)?;
        self.run_in(dest, &["checkout", "--force", "-B", branch, tracking.as_str()])?;
        self.run_in(dest, &["clean", "-ffdx"])?;
        Ok(())
    }

    fn pull_fast_forward(
        &self,
        dest: &Path,
        url: &str,
        branch: &str,
    ) -> Result<(), ExternalToolError> {
        self.run_in(dest, &["remote", "set-url", "origin", url])?;
        self.run_in(dest, &["pull", "--ff-only", "origin", branch])
            .map(|_| ())
    }

    fn current_head(&self, dest: &Path) -> Result<CommitId, ExternalToolError> {
        let output = self.run_in(dest, &["rev-parse", "HEAD"])?;
        let sha = output.first_line();
        if sha.is_empty() {
            return Err(ExternalToolError::UnexpectedOutput {
                program: output.program.clone(),
                reason: "rev-parse HEAD printed nothing".to_string(),
            });
        }
        Ok(CommitId::from(sha))
    }
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

fn tracking_ref(branch: &str) -> String {
    format!("refs/remotes/origin/{branch}")
}

/// Pick the sha for exactly `reference` out of `ls-remote` output
/// (`<sha>\t<ref>` per line).
fn parse_ls_remote(stdout: &str, reference: &str) -> Option<CommitId> {
    stdout.lines().find_map(|line| {
        let (sha, name) = line.split_once('\t')?;
        (name.trim() == reference && !sha.trim().is_empty()).then(|| CommitId::from(sha.trim()))
    })
}
