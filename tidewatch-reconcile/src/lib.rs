//! # tidewatch-reconcile
//!
//! The reconciliation core: change detection, workspace synchronization,
//! build dispatch, registry authentication and the per-repository state
//! store.
//!
//! Everything here is synchronous. Call [`Reconciler::run_cycle`] once per
//! cycle with a freshly loaded [`tidewatch_core::Config`] and the store
//! owned by the caller.

pub mod auth;
pub mod cycle;
pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod state_store;
pub mod workspace;

pub use auth::{AuthOutcome, Credentials, RegistryAuthenticator};
pub use cycle::{CycleReport, Reconciler, RepoOutcome, RepoReport, RepoSummary};
pub use detector::{strategy_for, DetectionMode, SyncStrategy};
pub use dispatcher::{image_repository, BuildDispatcher, BuildOutcome, ImageRefs, CACHE_TAG, LATEST_TAG};
pub use error::{AuthError, FailureKind, RepoError};
pub use state_store::RepoStateStore;
pub use workspace::{UpdatePolicy, WorkspaceSynchronizer};
