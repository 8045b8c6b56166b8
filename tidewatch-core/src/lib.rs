//! Tidewatch core library: domain types, configuration loading, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and the validated configuration structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load and validate

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{CommitId, Config, RepoName, RepositoryTarget, SHORT_COMMIT_LEN};
