use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";
pub const DOCKER_CONFIG_FILE: &str = "config.json";

/// First back-off after a failed config load; doubles on each further failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

pub fn tidewatch_root(home: &Path) -> PathBuf {
    home.join(".tidewatch")
}

pub fn workspaces_root(home: &Path) -> PathBuf {
    tidewatch_root(home).join("workspaces")
}

/// Client config the build tool reads credentials from: `$DOCKER_CONFIG/config.json`
/// when `docker_config_dir` is set, `~/.docker/config.json` otherwise.
pub fn docker_config_path(home: &Path, docker_config_dir: Option<&Path>) -> PathBuf {
    match docker_config_dir {
        Some(dir) => dir.join(DOCKER_CONFIG_FILE),
        None => home.join(".docker").join(DOCKER_CONFIG_FILE),
    }
}
