//! Build dispatcher: computes image references and invokes the build tool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tidewatch_core::{CommitId, RepositoryTarget};
use tidewatch_tools::command::tail;
use tidewatch_tools::{BuildRequest, BuildTool};

use crate::error::RepoError;
use crate::workspace::WorkspaceHandle;

/// Floating tag applied to every successful build.
pub const LATEST_TAG: &str = "latest";
/// Tag of the registry-hosted layer cache, one per image.
pub const CACHE_TAG: &str = "buildcache";

/// Destination references for one build of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRefs {
    /// `<registry>/<name>`
    pub repository: String,
    pub latest: String,
    /// `<registry>/<name>:<short commit>`
    pub pinned: String,
    pub cache: String,
}

/// `<registry>/<name>`, the untagged image path for `target`.
pub fn image_repository(registry: &str, target: &RepositoryTarget) -> String {
    format!("{registry}/{}", target.name)
}

impl ImageRefs {
    pub fn new(registry: &str, target: &RepositoryTarget, commit: &CommitId) -> Self {
        let repository = image_repository(registry, target);
        Self {
            latest: format!("{repository}:{LATEST_TAG}"),
            pinned: format!("{repository}:{}", commit.short()),
            cache: format!("{repository}:{CACHE_TAG}"),
            repository,
        }
    }

    /// Both tags, floating first.
    pub fn tags(&self) -> Vec<String> {
        vec![self.latest.clone(), self.pinned.clone()]
    }
}

/// What a successful dispatch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub images: ImageRefs,
    pub tool: &'static str,
    pub duration: Duration,
}

pub struct BuildDispatcher {
    tool: Arc<dyn BuildTool>,
    push: bool,
    registry_cache: bool,
}

impl BuildDispatcher {
    pub fn new(tool: Arc<dyn BuildTool>) -> Self {
        Self {
            tool,
            push: true,
            registry_cache: true,
        }
    }

    /// Push results to the registry (default `true`).
    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Import and export the `:buildcache` reference (default `true`).
    pub fn registry_cache(mut self, enabled: bool) -> Self {
        self.registry_cache = enabled;
        self
    }

    pub fn tool_name(&self) -> &'static str {
        self.tool.name()
    }

    /// The request that [`build`](Self::build) would hand to the tool.
    pub fn request(
        &self,
        workspace: &WorkspaceHandle,
        target: &RepositoryTarget,
        images: &ImageRefs,
    ) -> BuildRequest {
        let context_dir = workspace.path.join(&target.context);
        BuildRequest {
            dockerfile_dir: context_dir.clone(),
            context_dir,
            cache_ref: self.registry_cache.then(|| images.cache.clone()),
            images: images.tags(),
            push: self.push,
        }
    }

    /// Run the build tool synchronously. Only a zero exit is a success.
    pub fn build(
        &self,
        workspace: &WorkspaceHandle,
        target: &RepositoryTarget,
        commit: &CommitId,
        registry: &str,
    ) -> Result<BuildOutcome, RepoError> {
        let images = ImageRefs::new(registry, target, commit);
        let request = self.request(workspace, target, &images);

        if !request.context_dir.is_dir() {
            return Err(RepoError::BuildContextMissing {
                repo: target.name.clone(),
                path: request.context_dir,
            });
        }

        tracing::info!(
            repo = %target.name,
            tool = self.tool.name(),
            image = %images.pinned,
            context = %request.context_dir.display(),
            "building image",
        );

        let started = Instant::now();
        match self.tool.build(&request) {
            Ok(output) => {
                tracing::debug!(repo = %target.name, output = %tail(&output.stderr, 40), "build tool output");
                Ok(BuildOutcome {
                    images,
                    tool: self.tool.name(),
                    duration: started.elapsed(),
                })
            }
            Err(source) => {
                tracing::warn!(
                    repo = %target.name,
                    exit_code = ?source.exit_code(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "build tool failed",
                );
                Err(RepoError::BuildFailure {
                    repo: target.name.clone(),
                    source,
                })
            }
        }
    }
}
