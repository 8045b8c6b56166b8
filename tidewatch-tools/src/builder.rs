//! Image build tools.
//!
//! The build tool is opaque to the reconciler: it receives a [`BuildRequest`]
//! and either exits zero or it does not. Two command-line front ends are
//! provided: BuildKit's daemonless `buildctl` wrapper and `docker buildx`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::command::{self, ToolOutput};
use crate::error::ExternalToolError;

/// Everything a build tool needs for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub context_dir: PathBuf,
    /// Directory holding the `Dockerfile`.
    pub dockerfile_dir: PathBuf,
    /// Registry cache reference, imported from and exported to.
    pub cache_ref: Option<String>,
    /// Fully-qualified image references, all pointing at the same result.
    pub images: Vec<String>,
    pub push: bool,
}

/// An external program that turns a build context into pushed images.
pub trait BuildTool: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    fn build(&self, request: &BuildRequest) -> Result<ToolOutput, ExternalToolError>;
}

// ---------------------------------------------------------------------------
// BuildKit
// ---------------------------------------------------------------------------

pub const BUILDKIT_PROGRAM: &str = "buildctl-daemonless.sh";

/// `buildctl build` with the Dockerfile frontend.
#[derive(Debug, Clone)]
pub struct BuildKit {
    program: PathBuf,
}

impl Default for BuildKit {
    fn default() -> Self {
        Self::new(BUILDKIT_PROGRAM)
    }
}

impl BuildKit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(request: &BuildRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "build".into(),
            "--frontend".into(),
            "dockerfile.v0".into(),
            "--local".into(),
            prefixed("context=", &request.context_dir),
            "--local".into(),
            prefixed("dockerfile=", &request.dockerfile_dir),
        ];
        if let Some(cache) = &request.cache_ref {
            let spec = format!("type=registry,ref={cache}");
            args.extend(["--import-cache".into(), spec.clone().into()]);
            args.extend(["--export-cache".into(), spec.into()]);
        }
        args.push("--output".into());
        args.push(
            format!(
                "type=image,\"name={}\",push={}",
                request.images.join(","),
                request.push
            )
            .into(),
        );
        args
    }
}

impl BuildTool for BuildKit {
    fn name(&self) -> &'static str {
        "buildkit"
    }

    fn build(&self, request: &BuildRequest) -> Result<ToolOutput, ExternalToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(request));
        command::run(&mut cmd)
    }
}

// ---------------------------------------------------------------------------
// Docker Buildx
// ---------------------------------------------------------------------------

pub const BUILDX_PROGRAM: &str = "docker";

/// `docker buildx build`.
#[derive(Debug, Clone)]
pub struct Buildx {
    program: PathBuf,
}

impl Default for Buildx {
    fn default() -> Self {
        Self::new(BUILDX_PROGRAM)
    }
}

impl Buildx {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(request: &BuildRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["buildx".into(), "build".into()];
        args.push("--file".into());
        args.push(request.dockerfile_dir.join("Dockerfile").into_os_string());
        if let Some(cache) = &request.cache_ref {
            args.extend([
                "--cache-from".into(),
                format!("type=registry,ref={cache}").into(),
                "--cache-to".into(),
                format!("type=registry,ref={cache},mode=max").into(),
            ]);
        }
        for image in &request.images {
            args.extend(["--tag".into(), image.into()]);
        }
        if request.push {
            args.push("--push".into());
        }
        args.push(request.context_dir.clone().into_os_string());
        args
    }
}

impl BuildTool for Buildx {
    fn name(&self) -> &'static str {
        "buildx"
    }

    fn build(&self, request: &BuildRequest) -> Result<ToolOutput, ExternalToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(request));
        command::run(&mut cmd)
    }
}

fn prefixed(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path.as_os_str());
    arg
}
