//! Run configuration and hosting-platform credential.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Base URLs of the external services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub index_host: String,
    pub api_host: String,
    pub raw_host: String,
    pub qna_host: String,
}

impl Endpoints {
    /// Points every service at one base URL (test servers).
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            index_host: base.clone(),
            api_host: base.clone(),
            raw_host: base.clone(),
            qna_host: base,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            index_host: "https://pypi.org".to_string(),
            api_host: "https://api.github.com".to_string(),
            raw_host: "https://raw.githubusercontent.com".to_string(),
            qna_host: "https://api.stackexchange.com".to_string(),
        }
    }
}

/// Request budgets, per the services' published limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub index_per_minute: usize,
    pub forge_per_minute: usize,
    pub hosting_per_hour: usize,
    pub hosting_per_hour_authenticated: usize,
    pub qna_per_day: usize,
    /// Longest a call may wait for a free slot before it is recorded as failed.
    pub max_wait_secs: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            index_per_minute: 600,
            forge_per_minute: 600,
            hosting_per_hour: 60,
            hosting_per_hour_authenticated: 5000,
            qna_per_day: 300,
            max_wait_secs: 30,
        }
    }
}

/// Everything a run needs, passed explicitly to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Directories whose `*.py` files are scanned for imports (not recursive)
    pub source_dirs: Vec<PathBuf>,

    /// Conda environment manifests
    pub manifest_paths: Vec<PathBuf>,

    /// Captured `pip list` output
    pub pip_list_path: Option<PathBuf>,

    /// Captured `conda list` output
    pub conda_list_path: Option<PathBuf>,

    /// Drop scanned imports found in neither installed listing
    pub skip_unlisted_imports: bool,

    /// Require import lines to start with `import`/`from`
    pub strict_imports: bool,

    /// Names treated as standard library in addition to the reference list
    pub extra_stdlib: Vec<String>,

    /// Output document, overwritten on every run
    pub output_path: PathBuf,

    pub endpoints: Endpoints,

    /// Maximum packages enriched at once
    pub concurrency: usize,

    pub request_timeout_secs: u64,

    /// Upper bound for all calls made for one package
    pub package_timeout_secs: u64,

    pub rate_limits: RateLimits,

    /// Dotenv-format file holding the hosting credential (default `~/.env`)
    pub secrets_path: Option<PathBuf>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            source_dirs: Vec::new(),
            manifest_paths: Vec::new(),
            pip_list_path: None,
            conda_list_path: None,
            skip_unlisted_imports: false,
            strict_imports: false,
            extra_stdlib: Vec::new(),
            output_path: PathBuf::from("output/package_health.json"),
            endpoints: Endpoints::default(),
            concurrency: 4,
            request_timeout_secs: 30,
            package_timeout_secs: 300,
            rate_limits: RateLimits::default(),
            secrets_path: None,
        }
    }
}

impl HealthConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dirs.push(dir.into());
        self
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_paths.push(path.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn package_timeout(&self) -> Duration {
        Duration::from_secs(self.package_timeout_secs)
    }
}

// ============================================================================
// Credential
// ============================================================================

const USER_KEYS: [&str; 2] = ["GITHUB_USER", "github_user"];
const TOKEN_KEYS: [&str; 2] = ["GITHUB_TOKEN", "github_token"];

/// Username/token pair for the hosting platform. Empty values are legal and
/// only lower the caller's rate limit.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub token: String,
}

impl Credential {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }

    pub fn is_present(&self) -> bool {
        !self.token.is_empty()
    }

    /// Process environment first, then the secrets file (default `~/.env`).
    ///
    /// The secrets file is read without modifying the process environment.
    pub fn load(secrets_path: Option<&Path>) -> Self {
        let from_env = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        };

        let mut user = from_env(&USER_KEYS[..]);
        let mut token = from_env(&TOKEN_KEYS[..]);

        if user.is_none() || token.is_none() {
            let path = secrets_path
                .map(Path::to_path_buf)
                .or_else(|| dirs::home_dir().map(|home| home.join(".env")));
            if let Some(path) = path {
                let (file_user, file_token) = Self::read_secrets(&path);
                user = user.or(file_user);
                token = token.or(file_token);
            }
        }

        let credential = Self {
            user: user.unwrap_or_default(),
            token: token.unwrap_or_default(),
        };
        if !credential.is_present() {
            warn!("no hosting credential found; unauthenticated rate limit applies");
        }
        credential
    }

    // Reads without exporting into the process environment.
    #[allow(deprecated)]
    fn read_secrets(path: &Path) -> (Option<String>, Option<String>) {
        let entries = match dotenv::from_path_iter(path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "secrets file not read");
                return (None, None);
            }
        };

        let mut user = None;
        let mut token = None;
        for entry in entries {
            match entry {
                Ok((key, value)) if USER_KEYS.contains(&key.as_str()) => user = Some(value),
                Ok((key, value)) if TOKEN_KEYS.contains(&key.as_str()) => token = Some(value),
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "skipping secrets line"),
            }
        }
        (user.filter(|v| !v.is_empty()), token.filter(|v| !v.is_empty()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .finish()
    }
}
