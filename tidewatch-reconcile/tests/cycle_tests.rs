//! Reconciliation behavior against in-memory version-control and build fakes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use rstest::rstest;
use tempfile::TempDir;

use tidewatch_core::{CommitId, Config, RepoName, RepositoryTarget};
use tidewatch_reconcile::{
    strategy_for, AuthOutcome, BuildDispatcher, Credentials, DetectionMode, FailureKind,
    Reconciler, RegistryAuthenticator, RepoOutcome, RepoStateStore, UpdatePolicy,
    WorkspaceSynchronizer,
};
use tidewatch_tools::{BuildRequest, BuildTool, ExternalToolError, ToolOutput, Vcs};

const HEAD_FILE: &str = ".fake-head";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    LsRemote(String),
    Clone(String),
    Fetch(String),
    Pull(String),
}

/// Remote heads keyed by URL. A "checkout" is a directory holding the
/// commit in [`HEAD_FILE`] plus a `ctx/` subdirectory.
#[derive(Default)]
struct FakeVcs {
    heads: Mutex<HashMap<String, String>>,
    /// Commit the next sync of a URL lands on, overriding `heads`.
    sync_heads: Mutex<HashMap<String, String>>,
    unreachable: Mutex<HashSet<String>>,
    sync_broken: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeVcs {
    fn set_head(&self, url: &str, commit: &str) {
        self.heads
            .lock()
            .unwrap()
            .insert(url.to_string(), commit.to_string());
    }

    fn advance_before_sync(&self, url: &str, commit: &str) {
        self.sync_heads
            .lock()
            .unwrap()
            .insert(url.to_string(), commit.to_string());
    }

    fn make_unreachable(&self, url: &str) {
        self.unreachable.lock().unwrap().insert(url.to_string());
    }

    fn break_sync(&self, url: &str) {
        self.sync_broken.lock().unwrap().insert(url.to_string());
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn sync_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, Call::LsRemote(_)))
            .count()
    }

    fn failed(reason: &str) -> ExternalToolError {
        ExternalToolError::Failed {
            program: "git".to_string(),
            code: Some(128),
            detail: reason.to_string(),
        }
    }

    fn checkout(&self, url: &str, dest: &Path) -> Result<(), ExternalToolError> {
        if self.sync_broken.lock().unwrap().contains(url) {
            return Err(Self::failed("fatal: could not read from remote repository"));
        }
        let commit = match self.sync_heads.lock().unwrap().remove(url) {
            Some(commit) => commit,
            None => self.remote_head(url)?,
        };
        std::fs::create_dir_all(dest.join("ctx")).unwrap();
        std::fs::write(dest.join(HEAD_FILE), commit).unwrap();
        Ok(())
    }

    fn remote_head(&self, url: &str) -> Result<String, ExternalToolError> {
        if self.unreachable.lock().unwrap().contains(url) {
            return Err(Self::failed("fatal: unable to access remote"));
        }
        self.heads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ExternalToolError::UnexpectedOutput {
                program: "git".to_string(),
                reason: "branch not found".to_string(),
            })
    }
}

impl Vcs for FakeVcs {
    fn resolve_remote_head(&self, url: &str, _branch: &str) -> Result<CommitId, ExternalToolError> {
        self.calls.lock().unwrap().push(Call::LsRemote(url.to_string()));
        self.remote_head(url).map(CommitId::from)
    }

    fn clone_branch(&self, url: &str, _branch: &str, dest: &Path) -> Result<(), ExternalToolError> {
        self.calls.lock().unwrap().push(Call::Clone(url.to_string()));
        self.checkout(url, dest)
    }

    fn fetch_and_hard_reset(
        &self,
        dest: &Path,
        url: &str,
        _branch: &str,
    ) -> Result<(), ExternalToolError> {
        self.calls.lock().unwrap().push(Call::Fetch(url.to_string()));
        self.checkout(url, dest)
    }

    fn pull_fast_forward(
        &self,
        dest: &Path,
        url: &str,
        _branch: &str,
    ) -> Result<(), ExternalToolError> {
        self.calls.lock().unwrap().push(Call::Pull(url.to_string()));
        self.checkout(url, dest)
    }

    fn current_head(&self, dest: &Path) -> Result<CommitId, ExternalToolError> {
        std::fs::read_to_string(dest.join(HEAD_FILE))
            .map(CommitId::from)
            .map_err(|e| Self::failed(&e.to_string()))
    }
}

/// Records every request; fails builds whose pinned image contains one of
/// the configured needles.
#[derive(Default)]
struct FakeBuilder {
    requests: Mutex<Vec<BuildRequest>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeBuilder {
    fn fail_images_containing(&self, needle: &str) {
        self.failing.lock().unwrap().insert(needle.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl BuildTool for FakeBuilder {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn build(&self, request: &BuildRequest) -> Result<ToolOutput, ExternalToolError> {
        self.requests.lock().unwrap().push(request.clone());
        let failing = self.failing.lock().unwrap();
        if request
            .images
            .iter()
            .any(|image| failing.iter().any(|needle| image.contains(needle.as_str())))
        {
            return Err(ExternalToolError::Failed {
                program: "fake".to_string(),
                code: Some(1),
                detail: "error: failed to solve".to_string(),
            });
        }
        Ok(ToolOutput {
            program: "fake".to_string(),
            stdout: String::new(),
            stderr: "exporting to image\n".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    _tmp: TempDir,
    workspaces: PathBuf,
    docker_config: PathBuf,
    vcs: Arc<FakeVcs>,
    builder: Arc<FakeBuilder>,
    reconciler: Reconciler,
    store: RepoStateStore,
}

impl Harness {
    fn new(mode: DetectionMode) -> Self {
        Self::with_policy(mode, UpdatePolicy::HardReset)
    }

    fn with_policy(mode: DetectionMode, policy: UpdatePolicy) -> Self {
        let tmp = TempDir::new().unwrap();
        let workspaces = tmp.path().join("workspaces");
        let docker_config = tmp.path().join("docker").join("config.json");
        let vcs = Arc::new(FakeVcs::default());
        let builder = Arc::new(FakeBuilder::default());

        let sync = WorkspaceSynchronizer::new(&workspaces, vcs.clone(), policy);
        let reconciler = Reconciler::new(
            strategy_for(mode, sync),
            BuildDispatcher::new(builder.clone()),
            RegistryAuthenticator::new(&docker_config),
        );

        Self {
            _tmp: tmp,
            workspaces,
            docker_config,
            vcs,
            builder,
            reconciler,
            store: RepoStateStore::new(),
        }
    }

    fn cycle(&mut self, config: &Config) -> tidewatch_reconcile::CycleReport {
        let stop = AtomicBool::new(false);
        self.reconciler
            .run_cycle(config, None, &mut self.store, &stop)
    }

    fn last_built(&self, name: &str) -> Option<String> {
        self.store
            .last_built(&RepoName::from(name))
            .map(|c| c.to_string())
    }
}

fn url(name: &str) -> String {
    format!("https://git.local/{name}.git")
}

fn target(name: &str, context: &str) -> RepositoryTarget {
    RepositoryTarget {
        name: RepoName::from(name),
        link: url(name),
        branch: "main".to_string(),
        context: PathBuf::from(context),
    }
}

fn config(names: &[&str]) -> Config {
    Config {
        registry: "reg.local/team".to_string(),
        interval_seconds: 60,
        repos: names.iter().map(|n| target(n, "ctx")).collect(),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn unchanged_head_triggers_no_sync_or_build() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "abc1234");
    h.store
        .record_success(RepoName::from("svc-a"), CommitId::from("abc1234"));

    let report = h.cycle(&config(&["svc-a"]));

    assert_eq!(h.vcs.sync_calls(), 0);
    assert!(h.builder.requests().is_empty());
    assert!(matches!(report.repos[0].outcome, RepoOutcome::Unchanged { .. }));
    assert_eq!(report.unchanged(), 1);
    assert_eq!(h.last_built("svc-a").as_deref(), Some("abc1234"));
}

#[test]
fn first_sighting_clones_builds_and_records() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-b"), "def5678");

    let report = h.cycle(&config(&["svc-b"]));

    assert_eq!(
        h.vcs.calls(),
        vec![Call::LsRemote(url("svc-b")), Call::Clone(url("svc-b"))]
    );
    let requests = h.builder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].images,
        vec![
            "reg.local/team/svc-b:latest".to_string(),
            "reg.local/team/svc-b:def5678".to_string()
        ]
    );
    assert_eq!(
        requests[0].cache_ref.as_deref(),
        Some("reg.local/team/svc-b:buildcache")
    );
    assert_eq!(requests[0].context_dir, h.workspaces.join("svc-b").join("ctx"));
    assert!(requests[0].push);

    assert_eq!(report.built(), 1);
    assert_eq!(h.last_built("svc-b").as_deref(), Some("def5678"));
}

#[test]
fn failed_build_keeps_state_and_retries_next_cycle() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-c"), "222bbbb");
    h.store
        .record_success(RepoName::from("svc-c"), CommitId::from("111aaaa"));
    h.builder.fail_images_containing("svc-c");
    let cfg = config(&["svc-c"]);

    let first = h.cycle(&cfg);
    match &first.repos[0].outcome {
        RepoOutcome::Failed(err) => assert_eq!(err.kind(), FailureKind::Build),
        other => panic!("expected build failure, got {other:?}"),
    }
    assert!(first.has_failures());
    assert_eq!(h.last_built("svc-c").as_deref(), Some("111aaaa"));

    let second = h.cycle(&cfg);
    assert!(second.has_failures());
    assert_eq!(h.builder.requests().len(), 2);
    assert_eq!(h.last_built("svc-c").as_deref(), Some("111aaaa"));

    h.builder.heal();
    let third = h.cycle(&cfg);
    assert_eq!(third.built(), 1);
    assert_eq!(h.builder.requests().len(), 3);
    assert_eq!(h.last_built("svc-c").as_deref(), Some("222bbbb"));

    // Now current: a fourth cycle is a no-op.
    let fourth = h.cycle(&cfg);
    assert_eq!(fourth.unchanged(), 1);
    assert_eq!(h.builder.requests().len(), 3);
}

#[test]
fn one_failing_repo_does_not_stop_the_others() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.make_unreachable(&url("svc-a"));
    h.vcs.set_head(&url("svc-b"), "bbbbbbb1");
    h.vcs.set_head(&url("svc-c"), "ccccccc1");
    h.vcs.break_sync(&url("svc-b"));

    let report = h.cycle(&config(&["svc-a", "svc-b", "svc-c"]));

    let names: Vec<&str> = report.repos.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["svc-a", "svc-b", "svc-c"]);

    let kinds: Vec<Option<FailureKind>> = report
        .repos
        .iter()
        .map(|r| match &r.outcome {
            RepoOutcome::Failed(err) => Some(err.kind()),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![Some(FailureKind::Detection), Some(FailureKind::Sync), None]
    );
    assert_eq!(report.failed(), 2);
    assert_eq!(report.built(), 1);
    assert_eq!(h.last_built("svc-a"), None);
    assert_eq!(h.last_built("svc-b"), None);
    assert_eq!(h.last_built("svc-c").as_deref(), Some("ccccccc1"));
}

#[test]
fn failed_sync_leaves_existing_workspace_in_place() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa1");
    let cfg = config(&["svc-a"]);
    h.cycle(&cfg);
    let workspace = h.workspaces.join("svc-a");
    assert!(workspace.join(HEAD_FILE).exists());

    h.vcs.set_head(&url("svc-a"), "aaaaaaa2");
    h.vcs.break_sync(&url("svc-a"));
    let report = h.cycle(&cfg);

    assert!(report.has_failures());
    assert_eq!(
        std::fs::read_to_string(workspace.join(HEAD_FILE)).unwrap(),
        "aaaaaaa1"
    );
    assert_eq!(h.last_built("svc-a").as_deref(), Some("aaaaaaa1"));
}

#[test]
fn second_cycle_fetches_into_existing_workspace() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa1");
    let cfg = config(&["svc-a"]);
    h.cycle(&cfg);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa2");
    h.cycle(&cfg);

    let syncs: Vec<Call> = h
        .vcs
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, Call::LsRemote(_)))
        .collect();
    assert_eq!(syncs, vec![Call::Clone(url("svc-a")), Call::Fetch(url("svc-a"))]);
    assert_eq!(h.last_built("svc-a").as_deref(), Some("aaaaaaa2"));
}

#[rstest]
#[case::reset(UpdatePolicy::HardReset, Call::Fetch(url("svc-a-moved")))]
#[case::pull(UpdatePolicy::FastForward, Call::Pull(url("svc-a-moved")))]
fn edited_link_is_used_for_existing_workspace(#[case] policy: UpdatePolicy, #[case] expected: Call) {
    let mut h = Harness::with_policy(DetectionMode::Remote, policy);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa1");
    let mut cfg = config(&["svc-a"]);
    h.cycle(&cfg);

    cfg.repos[0].link = url("svc-a-moved");
    h.vcs.set_head(&url("svc-a-moved"), "bbbbbbb2");
    let report = h.cycle(&cfg);

    assert_eq!(report.built(), 1);
    assert_eq!(h.vcs.calls().last(), Some(&expected));
    assert_eq!(
        std::fs::read_to_string(h.workspaces.join("svc-a").join(HEAD_FILE)).unwrap(),
        "bbbbbbb2"
    );
    assert_eq!(h.last_built("svc-a").as_deref(), Some("bbbbbbb2"));
}

#[test]
fn branch_advancing_during_sync_builds_and_records_checked_out_commit() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "1111111aa");
    h.vcs.advance_before_sync(&url("svc-a"), "2222222bb");

    let report = h.cycle(&config(&["svc-a"]));

    match &report.repos[0].outcome {
        RepoOutcome::Built { commit, images, .. } => {
            assert_eq!(commit.as_str(), "2222222bb");
            assert_eq!(images.pinned, "reg.local/team/svc-a:2222222");
        }
        other => panic!("expected build, got {other:?}"),
    }
    assert_eq!(h.last_built("svc-a").as_deref(), Some("2222222bb"));
}

#[rstest]
#[case::remote(DetectionMode::Remote, 0)]
#[case::workspace(DetectionMode::Workspace, 1)]
fn steady_state_builds_once(#[case] mode: DetectionMode, #[case] syncs_per_idle_cycle: usize) {
    let mut h = Harness::new(mode);
    h.vcs.set_head(&url("svc-a"), "abc1234");
    let cfg = config(&["svc-a"]);

    h.cycle(&cfg);
    let syncs_after_first = h.vcs.sync_calls();
    h.cycle(&cfg);
    h.cycle(&cfg);

    assert_eq!(h.builder.requests().len(), 1);
    assert_eq!(
        h.vcs.sync_calls() - syncs_after_first,
        2 * syncs_per_idle_cycle
    );
    assert_eq!(h.last_built("svc-a").as_deref(), Some("abc1234"));
}

#[test]
fn workspace_mode_reads_head_from_checkout() {
    let mut h = Harness::new(DetectionMode::Workspace);
    h.vcs.set_head(&url("svc-a"), "abc1234");

    h.cycle(&config(&["svc-a"]));

    assert!(!h
        .vcs
        .calls()
        .iter()
        .any(|c| matches!(c, Call::LsRemote(_))));
    assert_eq!(h.last_built("svc-a").as_deref(), Some("abc1234"));
}

#[test]
fn missing_build_context_fails_in_build_phase() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "abc1234");
    let mut cfg = config(&["svc-a"]);
    cfg.repos[0].context = PathBuf::from("services/missing");

    let report = h.cycle(&cfg);

    match &report.repos[0].outcome {
        RepoOutcome::Failed(err) => {
            assert_eq!(err.kind(), FailureKind::Build);
            assert!(err.to_string().contains("services/missing"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(h.builder.requests().is_empty());
    assert_eq!(h.last_built("svc-a"), None);
}

#[test]
fn removed_repo_is_pruned_and_rebuilt_when_readded() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa");
    h.vcs.set_head(&url("svc-b"), "bbbbbbb");

    h.cycle(&config(&["svc-a", "svc-b"]));
    let report = h.cycle(&config(&["svc-a"]));
    assert_eq!(report.pruned, vec![RepoName::from("svc-b")]);
    assert_eq!(h.last_built("svc-b"), None);

    let readded = h.cycle(&config(&["svc-a", "svc-b"]));
    assert_eq!(readded.built(), 1);
    assert_eq!(readded.unchanged(), 1);
    assert_eq!(h.builder.requests().len(), 3);
}

#[test]
fn stop_request_ends_cycle_before_next_repo() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa");
    let stop = AtomicBool::new(true);

    let report = h
        .reconciler
        .run_cycle(&config(&["svc-a"]), None, &mut h.store, &stop);

    assert!(report.interrupted);
    assert!(report.repos.is_empty());
    assert!(h.vcs.calls().is_empty());
}

#[test]
fn cycle_authenticates_before_processing_repos() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa");
    let creds = Credentials::Basic {
        username: "ci".to_string(),
        password: "s3cret".to_string(),
    };
    let stop = AtomicBool::new(false);

    let report = h
        .reconciler
        .run_cycle(&config(&["svc-a"]), Some(&creds), &mut h.store, &stop);

    assert!(matches!(report.auth, Ok(AuthOutcome::Configured { .. })));
    let written = std::fs::read_to_string(&h.docker_config).unwrap();
    assert!(written.contains("reg.local/team"));
}

#[test]
fn missing_credentials_still_build() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa");

    let report = h.cycle(&config(&["svc-a"]));

    assert!(matches!(report.auth, Ok(AuthOutcome::Skipped)));
    assert_eq!(report.built(), 1);
    assert!(!h.docker_config.exists());
}

#[test]
fn broken_client_config_does_not_abort_cycle() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "aaaaaaa");
    std::fs::create_dir_all(h.docker_config.parent().unwrap()).unwrap();
    std::fs::write(&h.docker_config, "{{{").unwrap();
    let creds = Credentials::Token("tok".to_string());
    let stop = AtomicBool::new(false);

    let report = h
        .reconciler
        .run_cycle(&config(&["svc-a"]), Some(&creds), &mut h.store, &stop);

    assert!(report.auth.is_err());
    assert_eq!(report.built(), 1);
}

#[test]
fn summary_flattens_outcomes() {
    let mut h = Harness::new(DetectionMode::Remote);
    h.vcs.set_head(&url("svc-a"), "abc1234ffff");
    h.vcs.make_unreachable(&url("svc-b"));

    let report = h.cycle(&config(&["svc-a", "svc-b"]));
    let rows: Vec<_> = report.repos.iter().map(|r| r.summary()).collect();

    assert_eq!(rows[0].status, "built");
    assert_eq!(rows[0].commit.as_deref(), Some("abc1234"));
    assert_eq!(rows[0].image.as_deref(), Some("reg.local/team/svc-a:abc1234"));
    assert_eq!(rows[1].status, "failed");
    assert_eq!(rows[1].phase, Some("detect"));
    assert!(rows[1].error.as_deref().unwrap().contains("svc-b"));
}
