//! Configuration loading for huginnd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! Unlike the metrics file, the process configuration is optional: when no
//! file is found every section takes its defaults. Secrets are never read
//! from the file; `[remote] token_env` names the environment variable that
//! holds the bearer token.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{HttpServiceClient, RetryConfig, RetryingServiceClient, ServiceClient};
use crate::{HuginnError, Result};

/// Exporter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Constant labels attached to every exported series.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:9150).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:9150".to_string()
}

/// Collection scheduling.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    /// Seconds between cycles of one definition (default: 300).
    #[serde(default = "default_period")]
    pub period_secs: u64,
    /// Maximum cycles in flight at once; 0 = unbounded (default: 0).
    #[serde(default)]
    pub concurrency: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period(),
            concurrency: 0,
        }
    }
}

fn default_period() -> u64 {
    300
}

/// Retry settings for remote calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        RetryConfig::new()
            .max_attempts(section.max_attempts)
            .initial_delay(Duration::from_millis(section.initial_delay_ms))
            .max_delay(Duration::from_millis(section.max_delay_ms))
            .jitter(section.jitter)
    }
}

/// Where remote operations are sent.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Services without an explicit endpoint are reached at
    /// `{base_url}/{service}` (default: http://127.0.0.1:8080).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Environment variable holding a bearer token, if the remote needs one.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Explicit endpoint per service.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            token_env: None,
            endpoints: HashMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl RemoteConfig {
    /// Bearer token from the configured environment variable.
    ///
    /// A configured but unset variable is an error, so a missing secret is
    /// noticed at startup rather than as a stream of 401s.
    pub fn token(&self) -> Result<Option<String>> {
        let Some(var) = &self.token_env else {
            return Ok(None);
        };
        std::env::var(var).map(Some).map_err(|_| {
            HuginnError::Configuration(format!("environment variable {var} is not set"))
        })
    }
}

impl ExporterConfig {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided, must exist)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Build the remote client described by `[remote]` and `[retry]`.
    pub fn build_client(&self) -> Result<Arc<dyn ServiceClient>> {
        let mut builder = HttpServiceClient::builder(&self.remote.base_url)
            .timeout(Duration::from_secs(self.remote.timeout_secs));
        for (service, url) in &self.remote.endpoints {
            builder = builder.endpoint(service, url);
        }
        if let Some(token) = self.remote.token()? {
            builder = builder.bearer_token(token);
        }
        let http: Arc<dyn ServiceClient> = Arc::new(builder.build()?);

        let retry = RetryConfig::from(&self.retry);
        if retry.max_attempts <= 1 {
            return Ok(http);
        }
        Ok(Arc::new(RetryingServiceClient::new(http, retry)))
    }
}
