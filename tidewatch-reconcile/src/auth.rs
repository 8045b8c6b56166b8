//! Registry authenticator.
//!
//! Build tools read push credentials from the Docker client config
//! (`config.json`). [`RegistryAuthenticator::authenticate`] merges an
//! `auths.<registry>` entry into that file, keeping every other entry, and
//! is safe to call once per cycle.
//!
//! Writes use the atomic `.tmp` + rename pattern, mode `0600`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use crate::error::{io_err, AuthError};

pub const USERNAME_ENV: &str = "REGISTRY_USERNAME";
pub const PASSWORD_ENV: &str = "REGISTRY_PASSWORD";
pub const TOKEN_ENV: &str = "REGISTRY_TOKEN";

/// Registry credentials sourced from the environment.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    /// Bearer-style push token with no username.
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

impl Credentials {
    /// Read [`USERNAME_ENV`] / [`PASSWORD_ENV`] / [`TOKEN_ENV`] from the process
    /// environment.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve credentials through `lookup`. A token stands in for the
    /// password when a username is present. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let username = get(USERNAME_ENV);
        let secret = get(PASSWORD_ENV).or_else(|| get(TOKEN_ENV));

        match (username, secret) {
            (Some(username), Some(password)) => Some(Credentials::Basic { username, password }),
            (None, Some(_)) => get(TOKEN_ENV).map(Credentials::Token),
            _ => None,
        }
    }

    fn auth_entry(&self) -> Value {
        match self {
            Credentials::Basic { username, password } => json!({
                "username": username,
                "password": password,
            }),
            Credentials::Token(token) => json!({ "registrytoken": token }),
        }
    }
}

/// Result of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Configured { config_path: PathBuf },
    /// No credentials in the environment; pushes may fail downstream.
    Skipped,
}

pub struct RegistryAuthenticator {
    config_path: PathBuf,
}

impl RegistryAuthenticator {
    /// `config_path` is the client `config.json` the build tool reads.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn authenticate(
        &self,
        registry: &str,
        credentials: Option<&Credentials>,
    ) -> Result<AuthOutcome, AuthError> {
        let Some(credentials) = credentials else {
            tracing::warn!(
                registry,
                "{USERNAME_ENV}/{PASSWORD_ENV} (or {TOKEN_ENV}) not set; push might fail",
            );
            return Ok(AuthOutcome::Skipped);
        };

        let mut root = into_object(self.load()?);
        let mut auths = into_object(root.remove("auths").unwrap_or_default());
        auths.insert(registry.to_string(), credentials.auth_entry());
        root.insert("auths".to_string(), Value::Object(auths));

        self.save(&Value::Object(root))?;
        tracing::info!(registry, path = %self.config_path.display(), "configured registry credentials");
        Ok(AuthOutcome::Configured {
            config_path: self.config_path.clone(),
        })
    }

    fn load(&self) -> Result<Value, AuthError> {
        let path = &self.config_path;
        match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Ok(json!({})),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| AuthError::Json {
                path: path.clone(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(json!({})),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn save(&self, config: &Value) -> Result<(), AuthError> {
        let path = &self.config_path;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(config).map_err(|source| AuthError::Json {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }
}

/// The object inside `value`; anything else is replaced by an empty one.
fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}
