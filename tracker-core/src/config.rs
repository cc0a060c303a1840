//! User configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.grant-tracker/
//!   config.yaml   (mode 0600)
//!   daemon.sock   (daemon only)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_DOCS_API_BASE: &str = "https://docs.googleapis.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PROVISION_CONCURRENCY: usize = 3;

pub const ENV_ACCESS_TOKEN: &str = "GRANT_TRACKER_ACCESS_TOKEN";
pub const ENV_GOOGLE_ACCESS_TOKEN: &str = "GOOGLE_ACCESS_TOKEN";
pub const ENV_DOCS_API_BASE: &str = "GRANT_TRACKER_DOCS_API_BASE";

/// Settings shared by the CLI and the daemon.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base URL of the document service, without a trailing slash.
    pub docs_api_base: String,
    /// OAuth bearer token for the document service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Upper bound on documents synced at the same time.
    pub provision_concurrency: usize,
    /// Approvers used when a sync request names none.
    pub default_approvers: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            docs_api_base: DEFAULT_DOCS_API_BASE.to_string(),
            access_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            provision_concurrency: DEFAULT_PROVISION_CONCURRENCY,
            default_approvers: Vec::new(),
        }
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("docs_api_base", &self.docs_api_base)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("provision_concurrency", &self.provision_concurrency)
            .field("default_approvers", &self.default_approvers)
            .finish()
    }
}

impl TrackerConfig {
    /// Apply environment overrides using `lookup` as the variable source.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ENV_ACCESS_TOKEN).or_else(|| non_empty(ENV_GOOGLE_ACCESS_TOKEN))
        {
            self.access_token = Some(token.trim().to_string());
        }
        if let Some(base) = non_empty(ENV_DOCS_API_BASE) {
            self.docs_api_base = base.trim().to_string();
        }
    }

    /// The configured access token, or [`ConfigError::MissingAccessToken`].
    pub fn require_access_token(&self, home: &Path) -> Result<&str, ConfigError> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingAccessToken {
                path: config_path_at(home),
            })
    }

    fn normalize(mut self) -> Result<Self, ConfigError> {
        while self.docs_api_base.ends_with('/') {
            self.docs_api_base.pop();
        }
        if self.docs_api_base.is_empty() {
            return Err(ConfigError::Invalid {
                field: "docs_api_base",
                reason: "must not be empty".to_string(),
            });
        }
        if self.provision_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "provision_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        self.default_approvers = self
            .default_approvers
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.grant-tracker/`
pub fn tracker_dir_at(home: &Path) -> PathBuf {
    home.join(".grant-tracker")
}

/// `<home>/.grant-tracker/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    tracker_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the config file only, without environment overrides.
///
/// A missing file yields [`TrackerConfig::default`].
pub fn load_file_at(home: &Path) -> Result<TrackerConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return TrackerConfig::default().normalize();
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    if contents.trim().is_empty() {
        return TrackerConfig::default().normalize();
    }
    let config: TrackerConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    config.normalize()
}

/// Load the config file and apply process environment overrides.
pub fn load_at(home: &Path) -> Result<TrackerConfig, ConfigError> {
    let mut config = load_file_at(home)?;
    config.apply_env(|key| std::env::var(key).ok());
    config.normalize()
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<TrackerConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save `config` to `<home>/.grant-tracker/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &TrackerConfig) -> Result<(), ConfigError> {
    let dir = tracker_dir_at(home);
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;
    let path = config_path_at(home);
    let tmp = dir.join("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|source| ConfigError::Io {
        path: tmp.clone(),
        source,
    })?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|source| ConfigError::Io { path, source })?;
    Ok(())
}

/// The user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|source| {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
