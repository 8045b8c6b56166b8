//! Repo state store: last successfully built commit per repository.
//!
//! Process memory only. A restart starts empty, so every repository is
//! built once more on the first cycle after boot.
//!
//! The store is owned by the loop's call frame and handed to each cycle by
//! `&mut`; nothing else holds it.

use std::collections::HashMap;

use tidewatch_core::{CommitId, RepoName};

/// Mapping `repo name → last successfully built commit`.
///
/// A missing entry means "never built in this process", which is distinct
/// from "built, and nothing changed since".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStateStore {
    built: HashMap<RepoName, CommitId>,
}

impl RepoStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_built(&self, repo: &RepoName) -> Option<&CommitId> {
        self.built.get(repo)
    }

    /// `true` when `commit` is exactly what was last built for `repo`.
    pub fn is_current(&self, repo: &RepoName, commit: &CommitId) -> bool {
        self.built.get(repo) == Some(commit)
    }

    /// Record a successful build. Call only after the build tool reported
    /// success for `commit`. Returns the previously recorded commit.
    pub fn record_success(&mut self, repo: RepoName, commit: CommitId) -> Option<CommitId> {
        self.built.insert(repo, commit)
    }

    /// Drop entries for repositories no longer configured, so re-adding one
    /// later triggers a fresh build. Returns the names that were dropped.
    pub fn retain_configured<'a, I>(&mut self, configured: I) -> Vec<RepoName>
    where
        I: IntoIterator<Item = &'a RepoName>,
    {
        let keep: std::collections::HashSet<&RepoName> = configured.into_iter().collect();
        let mut dropped: Vec<RepoName> = self
            .built
            .keys()
            .filter(|name| !keep.contains(name))
            .cloned()
            .collect();
        dropped.sort();
        for name in &dropped {
            self.built.remove(name);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }
}
