//! `tidewatch run`: the long-running reconciliation loop.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use tidewatch_daemon::{start_blocking, LoopSettings};

use super::EngineArgs;

/// Arguments for `tidewatch run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Ceiling, in seconds, for the retry delay after a config error.
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_backoff_secs: u64,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let reconciler = self.engine.reconciler()?;
        let mut settings = LoopSettings::new(self.engine.config_path());
        settings.max_backoff = Duration::from_secs(self.max_backoff_secs);

        start_blocking(reconciler, settings).context("tidewatch exited with error")
    }
}
