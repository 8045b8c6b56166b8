//! One reconciliation cycle.
//!
//! [`Reconciler::run_cycle`] is the synchronous body shared by the daemon
//! loop and `tidewatch once`: authenticate, then walk the configured
//! repositories in order, building each one whose detected commit differs
//! from the last recorded success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tidewatch_core::{CommitId, Config, RepoName, RepositoryTarget};

use crate::auth::{AuthOutcome, Credentials, RegistryAuthenticator};
use crate::detector::SyncStrategy;
use crate::dispatcher::{BuildDispatcher, ImageRefs};
use crate::error::{AuthError, RepoError};
use crate::state_store::RepoStateStore;

/// What happened to one repository in one cycle.
#[derive(Debug)]
pub enum RepoOutcome {
    /// Detected commit equals the last recorded success; nothing ran.
    Unchanged { commit: CommitId },
    /// Build succeeded and the store now holds `commit`.
    Built {
        previous: Option<CommitId>,
        commit: CommitId,
        images: ImageRefs,
    },
    /// Skipped for this cycle; the store was not touched.
    Failed(RepoError),
}

#[derive(Debug)]
pub struct RepoReport {
    pub name: RepoName,
    pub outcome: RepoOutcome,
    pub duration: Duration,
}

/// Flat, serializable view of a [`RepoReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSummary {
    pub repo: String,
    pub status: &'static str,
    pub previous: Option<String>,
    pub commit: Option<String>,
    pub image: Option<String>,
    pub phase: Option<&'static str>,
    pub error: Option<String>,
    pub duration_ms: u128,
}

impl RepoReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, RepoOutcome::Failed(_))
    }

    pub fn summary(&self) -> RepoSummary {
        let mut summary = RepoSummary {
            repo: self.name.to_string(),
            status: "",
            previous: None,
            commit: None,
            image: None,
            phase: None,
            error: None,
            duration_ms: self.duration.as_millis(),
        };
        match &self.outcome {
            RepoOutcome::Unchanged { commit } => {
                summary.status = "unchanged";
                summary.commit = Some(commit.short().to_string());
            }
            RepoOutcome::Built {
                previous,
                commit,
                images,
            } => {
                summary.status = "built";
                summary.previous = previous.as_ref().map(|c| c.short().to_string());
                summary.commit = Some(commit.short().to_string());
                summary.image = Some(images.pinned.clone());
            }
            RepoOutcome::Failed(err) => {
                summary.status = "failed";
                summary.phase = Some(err.kind().as_str());
                summary.error = Some(err.to_string());
            }
        }
        summary
    }
}

/// Everything one cycle did, in processing order.
#[derive(Debug)]
pub struct CycleReport {
    pub auth: Result<AuthOutcome, AuthError>,
    pub repos: Vec<RepoReport>,
    /// Store entries dropped because their repository left the config.
    pub pruned: Vec<RepoName>,
    /// A stop request cut the cycle short; the remaining repos were not visited.
    pub interrupted: bool,
}

impl CycleReport {
    pub fn built(&self) -> usize {
        self.count(|o| matches!(o, RepoOutcome::Built { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, RepoOutcome::Unchanged { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RepoOutcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&RepoOutcome) -> bool) -> usize {
        self.repos.iter().filter(|r| pred(&r.outcome)).count()
    }
}

pub struct Reconciler {
    strategy: Box<dyn SyncStrategy>,
    dispatcher: BuildDispatcher,
    authenticator: RegistryAuthenticator,
}

impl Reconciler {
    pub fn new(
        strategy: Box<dyn SyncStrategy>,
        dispatcher: BuildDispatcher,
        authenticator: RegistryAuthenticator,
    ) -> Self {
        Self {
            strategy,
            dispatcher,
            authenticator,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn tool_name(&self) -> &'static str {
        self.dispatcher.tool_name()
    }

    /// Run one full pass over `config.repos`.
    ///
    /// Repositories are processed strictly in declaration order. `stop` is
    /// checked before each repository; a running build is never interrupted.
    pub fn run_cycle(
        &self,
        config: &Config,
        credentials: Option<&Credentials>,
        store: &mut RepoStateStore,
        stop: &AtomicBool,
    ) -> CycleReport {
        let pruned = store.retain_configured(config.repos.iter().map(|r| &r.name));
        for name in &pruned {
            tracing::info!(repo = %name, "repository removed from config; forgetting last build");
        }

        let auth = self.authenticator.authenticate(&config.registry, credentials);
        if let Err(err) = &auth {
            tracing::error!(registry = %config.registry, error = %err, "registry authentication failed");
        }

        let mut repos = Vec::with_capacity(config.repos.len());
        let mut interrupted = false;
        for target in &config.repos {
            if stop.load(Ordering::SeqCst) {
                tracing::info!(remaining = config.repos.len() - repos.len(), "stop requested; ending cycle early");
                interrupted = true;
                break;
            }
            let started = Instant::now();
            let outcome = self.reconcile_repo(target, &config.registry, store);
            repos.push(RepoReport {
                name: target.name.clone(),
                outcome,
                duration: started.elapsed(),
            });
        }

        let report = CycleReport {
            auth,
            repos,
            pruned,
            interrupted,
        };
        tracing::info!(
            built = report.built(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            "cycle complete",
        );
        report
    }

    /// Detect, and when changed sync, build, and record one repository.
    ///
    /// Errors stay inside the returned outcome. The store only advances after
    /// the build tool reported success.
    pub fn reconcile_repo(
        &self,
        target: &RepositoryTarget,
        registry: &str,
        store: &mut RepoStateStore,
    ) -> RepoOutcome {
        match self.try_reconcile(target, registry, store) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    repo = %err.repo(),
                    phase = err.kind().as_str(),
                    previous = store.last_built(err.repo()).map(CommitId::short),
                    outcome = "failed",
                    error = %err,
                    "repository skipped this cycle",
                );
                RepoOutcome::Failed(err)
            }
        }
    }

    fn try_reconcile(
        &self,
        target: &RepositoryTarget,
        registry: &str,
        store: &mut RepoStateStore,
    ) -> Result<RepoOutcome, RepoError> {
        let detection = self.strategy.detect(target)?;
        let previous = store.last_built(&target.name).cloned();

        tracing::debug!(
            repo = %target.name,
            phase = "detect",
            previous = previous.as_ref().map(CommitId::short),
            current = %detection.commit.short(),
            "detected branch head",
        );

        if store.is_current(&target.name, &detection.commit) {
            tracing::info!(
                repo = %target.name,
                current = %detection.commit.short(),
                outcome = "unchanged",
                "no changes",
            );
            return Ok(RepoOutcome::Unchanged {
                commit: detection.commit,
            });
        }

        tracing::info!(
            repo = %target.name,
            previous = previous.as_ref().map(CommitId::short),
            current = %detection.commit.short(),
            "change detected",
        );

        let prepared = self.strategy.prepare(target, detection)?;
        tracing::info!(
            repo = %target.name,
            phase = "sync",
            action = ?prepared.handle.action,
            commit = %prepared.commit.short(),
            "workspace ready",
        );

        let built = self
            .dispatcher
            .build(&prepared.handle, target, &prepared.commit, registry)?;

        store.record_success(target.name.clone(), prepared.commit.clone());
        tracing::info!(
            repo = %target.name,
            phase = "build",
            previous = previous.as_ref().map(CommitId::short),
            current = %prepared.commit.short(),
            image = %built.images.pinned,
            elapsed_ms = built.duration.as_millis() as u64,
            outcome = "built",
            "image published",
        );

        Ok(RepoOutcome::Built {
            previous,
            commit: prepared.commit,
            images: built.images,
        })
    }
}
