//! Subcommands and the engine options `run` and `once` share.

pub mod check;
pub mod once;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use tidewatch_core::config::DEFAULT_CONFIG_FILE;
use tidewatch_daemon::paths::{docker_config_path, workspaces_root};
use tidewatch_reconcile::{
    strategy_for, BuildDispatcher, DetectionMode, Reconciler, RegistryAuthenticator,
    UpdatePolicy, WorkspaceSynchronizer,
};
use tidewatch_tools::{BuildKit, BuildTool, Buildx, GitCli};

/// Location of the YAML config.
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to the config file, re-read at the start of every cycle.
    #[arg(long, short = 'c', env = "TIDEWATCH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuilderKind {
    /// `buildctl-daemonless.sh build` (BuildKit).
    Buildkit,
    /// `docker buildx build`.
    Buildx,
}

/// Startup-only options for the reconciliation engine.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// How the current commit is detected: `remote` (ls-remote) or `workspace`.
    #[arg(long, env = "TIDEWATCH_DETECTION", default_value = "remote")]
    pub detection: DetectionMode,

    /// How existing workspaces are updated: `reset` (fetch + hard reset) or `pull`.
    #[arg(long, env = "TIDEWATCH_UPDATE_POLICY", default_value = "reset")]
    pub update_policy: UpdatePolicy,

    /// Build tool front end.
    #[arg(long, value_enum, env = "TIDEWATCH_BUILDER", default_value_t = BuilderKind::Buildkit)]
    pub builder: BuilderKind,

    /// Override the build tool executable.
    #[arg(long)]
    pub builder_program: Option<PathBuf>,

    /// Git executable.
    #[arg(long, default_value = "git")]
    pub git_program: PathBuf,

    /// Build without pushing to the registry.
    #[arg(long)]
    pub no_push: bool,

    /// Skip the registry layer cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Clone and fetch full history instead of depth 1.
    #[arg(long)]
    pub full_clone: bool,

    /// Directory holding one checkout per repository (default `~/.tidewatch/workspaces`).
    #[arg(long, env = "TIDEWATCH_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Directory of the client `config.json` that receives registry credentials.
    #[arg(long, env = "DOCKER_CONFIG")]
    pub docker_config: Option<PathBuf>,
}

impl EngineArgs {
    pub fn config_path(&self) -> &Path {
        &self.config.config
    }

    /// Wire the engine from these options.
    pub fn reconciler(&self) -> Result<Reconciler> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        let workspace_root = self
            .workspace_root
            .clone()
            .unwrap_or_else(|| workspaces_root(&home));
        let vcs = GitCli::new(&self.git_program).shallow(!self.full_clone);
        let workspaces =
            WorkspaceSynchronizer::new(workspace_root, Arc::new(vcs), self.update_policy);

        let tool: Arc<dyn BuildTool> = match (self.builder, &self.builder_program) {
            (BuilderKind::Buildkit, Some(program)) => Arc::new(BuildKit::new(program)),
            (BuilderKind::Buildkit, None) => Arc::new(BuildKit::default()),
            (BuilderKind::Buildx, Some(program)) => Arc::new(Buildx::new(program)),
            (BuilderKind::Buildx, None) => Arc::new(Buildx::default()),
        };
        let dispatcher = BuildDispatcher::new(tool)
            .push(!self.no_push)
            .registry_cache(!self.no_cache);

        let authenticator = RegistryAuthenticator::new(docker_config_path(
            &home,
            self.docker_config.as_deref(),
        ));

        Ok(Reconciler::new(
            strategy_for(self.detection, workspaces),
            dispatcher,
            authenticator,
        ))
    }
}
