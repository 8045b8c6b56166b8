//! `tidewatch check`: load and validate the config without touching git or
//! the registry.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tidewatch_core::{config, Config};
use tidewatch_reconcile::{image_repository, CACHE_TAG, LATEST_TAG};

use super::ConfigArg;

/// Arguments for `tidewatch check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let path = &self.config.config;
        let config = config::load_at(path)
            .with_context(|| format!("config check failed for {}", path.display()))?;

        if self.json {
            print_json(&config)?;
        } else {
            print_table(&config, &path.display().to_string());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CheckJson<'a> {
    registry: &'a str,
    interval_seconds: u64,
    repos: Vec<TargetJson<'a>>,
}

#[derive(Serialize)]
struct TargetJson<'a> {
    name: &'a str,
    link: &'a str,
    branch: &'a str,
    context: String,
    image: String,
    cache: String,
}

#[derive(Tabled)]
struct TargetTableRow {
    #[tabled(rename = "repo")]
    repo: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "context")]
    context: String,
    #[tabled(rename = "image")]
    image: String,
}

fn print_json(config: &Config) -> Result<()> {
    let payload = CheckJson {
        registry: &config.registry,
        interval_seconds: config.interval_seconds,
        repos: config
            .repos
            .iter()
            .map(|target| {
                let repository = image_repository(&config.registry, target);
                TargetJson {
                    name: target.name.as_str(),
                    link: &target.link,
                    branch: &target.branch,
                    context: target.context.display().to_string(),
                    image: format!("{repository}:{LATEST_TAG}"),
                    cache: format!("{repository}:{CACHE_TAG}"),
                }
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize config JSON")?
    );
    Ok(())
}

fn print_table(config: &Config, path: &str) {
    println!(
        "{} {} | registry {} | every {}s | {} repos",
        "✓".green().bold(),
        path,
        config.registry,
        config.interval_seconds,
        config.repos.len(),
    );
    if config.repos.is_empty() {
        println!("No repositories configured.");
        return;
    }

    let rows: Vec<TargetTableRow> = config
        .repos
        .iter()
        .map(|target| TargetTableRow {
            repo: target.name.to_string(),
            branch: target.branch.clone(),
            context: target.context.display().to_string(),
            image: format!("{}:{LATEST_TAG}", image_repository(&config.registry, target)),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
