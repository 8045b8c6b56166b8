//! Tidewatch: continuous build reconciler.
//!
//! # Usage
//!
//! ```text
//! tidewatch run   [--config <path>] [--detection remote|workspace] [--builder buildkit|buildx] ...
//! tidewatch once  [--config <path>] [--json] ...
//! tidewatch check [--config <path>] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, once::OnceArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tidewatch",
    version,
    about = "Watch git branches and rebuild container images when they move",
    long_about = None,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "TIDEWATCH_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciliation loop until SIGINT or SIGTERM.
    Run(RunArgs),

    /// Run a single reconciliation cycle and print its report.
    Once(OnceArgs),

    /// Validate the config file and show the resolved targets.
    Check(CheckArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    tidewatch_daemon::init_tracing(cli.log_json);
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Once(args) => args.run(),
        Commands::Check(args) => args.run(),
    }
}
