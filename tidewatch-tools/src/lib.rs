//! # tidewatch-tools
//!
//! Narrow clients for the external programs the reconciler drives.
//!
//! Every subprocess goes through [`command::run`], so the version-control
//! client and the build tools share one failure contract:
//! `Result<ToolOutput, ExternalToolError>`.

pub mod builder;
pub mod command;
pub mod error;
pub mod git;

pub use builder::{BuildKit, BuildRequest, BuildTool, Buildx};
pub use command::ToolOutput;
pub use error::ExternalToolError;
pub use git::{GitCli, Vcs};
