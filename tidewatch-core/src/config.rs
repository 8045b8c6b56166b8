//! YAML configuration loader.
//!
//! # File layout
//!
//! ```yaml
//! registry: registry.example.com/team   # scheme optional, stripped
//! interval_seconds: 60                  # optional, default 60
//! repos:
//!   - name: svc-a
//!     link: https://git.example.com/team/svc-a.git
//!     branch: main                      # optional, default "main"
//!     context: .                        # optional, default "."
//! ```
//!
//! Parsing goes through private raw structs; the rest of the workspace only
//! ever sees the validated [`Config`].

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{Config, RepoName, RepositoryTarget};

/// Config file used when neither `--config` nor `TIDEWATCH_CONFIG` is set.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_CONTEXT: &str = ".";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    registry: Option<String>,
    #[serde(default = "default_interval")]
    interval_seconds: u64,
    #[serde(default)]
    repos: Vec<RawRepo>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRepo {
    name: String,
    link: String,
    #[serde(default = "default_branch")]
    branch: String,
    #[serde(default = "default_context")]
    context: PathBuf,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_context() -> PathBuf {
    PathBuf::from(DEFAULT_CONTEXT)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and validate the configuration at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// and line context) if the YAML is malformed, `ConfigError::Invalid` if it
/// parses but fails validation.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse(path, &contents)
}

/// Parse and validate YAML `contents`; `path` is only used for error context.
pub fn parse(path: &Path, contents: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(path, raw)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(path: &Path, raw: RawConfig) -> Result<Config, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    let registry = raw
        .registry
        .as_deref()
        .map(normalize_registry)
        .unwrap_or_default();
    if registry.is_empty() {
        return Err(invalid("`registry` is required".to_string()));
    }

    if raw.interval_seconds == 0 {
        return Err(invalid("`interval_seconds` must be at least 1".to_string()));
    }

    let mut seen = HashSet::new();
    let mut repos = Vec::with_capacity(raw.repos.len());
    for (idx, repo) in raw.repos.into_iter().enumerate() {
        let name = repo.name.trim().to_string();
        if !is_image_component(&name) {
            return Err(invalid(format!(
                "repos[{idx}].name '{}' must be a lowercase image name component \
                 ([a-z0-9] joined by '.', '_', '__' or dashes)",
                repo.name
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(invalid(format!("duplicate repository name '{name}'")));
        }
        let link = repo.link.trim();
        if link.is_empty() {
            return Err(invalid(format!("repos[{idx}] ('{name}') has an empty `link`")));
        }
        if link.starts_with('-') {
            return Err(invalid(format!(
                "repos[{idx}] ('{name}') `link` must not start with '-'"
            )));
        }
        let branch = repo.branch.trim();
        if branch.is_empty() {
            return Err(invalid(format!("repos[{idx}] ('{name}') has an empty `branch`")));
        }
        if branch.starts_with('-') {
            return Err(invalid(format!(
                "repos[{idx}] ('{name}') `branch` must not start with '-'"
            )));
        }
        if !is_contained_relative(&repo.context) {
            return Err(invalid(format!(
                "repos[{idx}] ('{name}') context '{}' must be relative and stay inside the repository",
                repo.context.display()
            )));
        }

        repos.push(RepositoryTarget {
            name: RepoName::from(name),
            link: link.to_string(),
            branch: branch.to_string(),
            context: repo.context,
        });
    }

    Ok(Config {
        registry,
        interval_seconds: raw.interval_seconds,
        repos,
    })
}

/// Strip an `http://` / `https://` scheme and trailing slashes; the build
/// tools expect a bare `host[:port]/path` prefix.
pub fn normalize_registry(registry: &str) -> String {
    let trimmed = registry.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// One image path component: `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`. Names
/// double as workspace directory names, so this also rules out `.`, `..`
/// and path separators.
fn is_image_component(name: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let (Some(first), Some(last)) = (name.chars().next(), name.chars().last()) else {
        return false;
    };
    alnum(first)
        && alnum(last)
        && name
            .split(alnum)
            .filter(|sep| !sep.is_empty())
            .all(|sep| matches!(sep, "." | "_" | "__") || sep.chars().all(|c| c == '-'))
}

fn is_contained_relative(context: &Path) -> bool {
    context
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
