//! `tidewatch once`: one reconciliation cycle with a printed report.
//!
//! State starts empty, so every configured repository whose branch can be
//! resolved is built.

use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tidewatch_core::config;
use tidewatch_reconcile::{AuthOutcome, CycleReport, Credentials, RepoStateStore, RepoSummary};

use super::EngineArgs;

/// Arguments for `tidewatch once`.
#[derive(Args, Debug)]
pub struct OnceArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl OnceArgs {
    pub fn run(self) -> Result<()> {
        let path = self.engine.config_path();
        let config = config::load_at(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        let reconciler = self.engine.reconciler()?;

        let credentials = Credentials::from_env();
        let mut store = RepoStateStore::new();
        let stop = AtomicBool::new(false);
        let report = reconciler.run_cycle(&config, credentials.as_ref(), &mut store, &stop);

        if self.json {
            print_json(&config.registry, &report)?;
        } else {
            print_table(&config.registry, &report);
        }

        if report.has_failures() {
            bail!(
                "{} of {} repositories failed",
                report.failed(),
                report.repos.len()
            );
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct OnceReportJson<'a> {
    registry: &'a str,
    auth: String,
    summary: OnceSummaryJson,
    repos: Vec<RepoSummary>,
}

#[derive(Serialize)]
struct OnceSummaryJson {
    built: usize,
    unchanged: usize,
    failed: usize,
}

#[derive(Tabled)]
struct RepoTableRow {
    #[tabled(rename = "repo")]
    repo: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn auth_label(report: &CycleReport) -> String {
    match &report.auth {
        Ok(AuthOutcome::Configured { .. }) => "configured".to_string(),
        Ok(AuthOutcome::Skipped) => "skipped".to_string(),
        Err(err) => format!("error: {err}"),
    }
}

fn print_json(registry: &str, report: &CycleReport) -> Result<()> {
    let payload = OnceReportJson {
        registry,
        auth: auth_label(report),
        summary: OnceSummaryJson {
            built: report.built(),
            unchanged: report.unchanged(),
            failed: report.failed(),
        },
        repos: report.repos.iter().map(|r| r.summary()).collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize report JSON")?
    );
    Ok(())
}

fn print_table(registry: &str, report: &CycleReport) {
    println!(
        "Tidewatch v{} | {} | {} built | {} unchanged | {} failed",
        env!("CARGO_PKG_VERSION"),
        registry,
        report.built(),
        report.unchanged(),
        report.failed(),
    );
    if report.auth.is_err() {
        println!("{} registry auth {}", "!".yellow().bold(), auth_label(report));
    }

    if report.repos.is_empty() {
        println!("No repositories configured.");
        return;
    }

    let rows: Vec<RepoTableRow> = report
        .repos
        .iter()
        .map(|r| {
            let summary = r.summary();
            RepoTableRow {
                repo: summary.repo,
                status: status_label(summary.status),
                commit: summary.commit.unwrap_or_else(|| "-".to_string()),
                detail: match (summary.image, summary.error) {
                    (Some(image), _) => image,
                    (None, Some(error)) => format!("[{}] {error}", summary.phase.unwrap_or("?")),
                    (None, None) => "no changes".to_string(),
                },
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: &str) -> String {
    match status {
        "built" => "BUILT".green().bold().to_string(),
        "unchanged" => "UNCHANGED".bright_black().bold().to_string(),
        _ => "FAILED".red().bold().to_string(),
    }
}
