//! Domain types for tidewatch.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! The structs here are the *validated* shapes produced by [`crate::config`];
//! the raw YAML layout lives privately in that module.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of characters used for the abbreviated commit in image tags.
pub const SHORT_COMMIT_LEN: usize = 7;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed repository name. Unique key across the configuration,
/// names the workspace directory and the last image path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoName(pub String);

impl RepoName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// An opaque commit identifier as reported by the version-control client.
///
/// Equality is the only comparison the reconciler performs; there is no
/// ordering between commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in image tags (first [`SHORT_COMMIT_LEN`] characters).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_COMMIT_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One repository the loop watches and builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryTarget {
    pub name: RepoName,
    /// Remote URL handed to the version-control client.
    pub link: String,
    pub branch: String,
    /// Build context, relative to the workspace root.
    pub context: PathBuf,
}

/// Validated configuration, re-read at the start of every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Bare registry base path (scheme and trailing slash stripped),
    /// e.g. `registry.example.com/team`.
    pub registry: String,
    pub interval_seconds: u64,
    /// In declaration order; the loop processes them in this order.
    pub repos: Vec<RepositoryTarget>,
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(RepoName::from("svc-a").to_string(), "svc-a");
        assert_eq!(CommitId::from("abc1234").to_string(), "abc1234");
    }

    #[test]
    fn short_commit_truncates_full_hash() {
        let id = CommitId::from("def5678a9b0c1d2e3f4a5b6c7d8e9f0a1b2c3d4e");
        assert_eq!(id.short(), "def5678");
    }

    #[test]
    fn short_commit_keeps_already_short_ids() {
        assert_eq!(CommitId::from("abc12").short(), "abc12");
        assert_eq!(CommitId::from("abc1234").short(), "abc1234");
    }

    #[test]
    fn commit_equality_is_exact() {
        assert_ne!(CommitId::from("abc1234"), CommitId::from("abc1234ff"));
        assert_eq!(CommitId::from("abc1234"), CommitId::from(String::from("abc1234")));
    }

    #[test]
    fn interval_is_seconds() {
        let cfg = Config {
            registry: "r".into(),
            interval_seconds: 90,
            repos: vec![],
        };
        assert_eq!(cfg.interval(), Duration::from_secs(90));
    }
}
