//! Configuration loading for itinerad.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.itinera/config.toml` (user)
//! 3. `/etc/itinera/config.toml` (system)
//!
//! With no file at all, built-in defaults are used.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.itinera/secrets.toml` (user, must be 0600)
//! 2. `/etc/itinera/secrets.toml` (system, must be 0600)

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::gateway::{DEFAULT_IMAGE_LIMIT, DEFAULT_MODELS, default_image_quota, default_llm_quota};
use crate::providers::RetryConfig;
use crate::quota::QuotaPolicy;
use crate::store::{CounterStore, JsonFileStore, MemoryStore, RemoteStore};
use crate::types::GenerationConfig;
use crate::{CacheConfig, ItineraError, Result};

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8787).
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            limits: LimitsConfig::default(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8787".to_string()
}

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Per-attempt upstream timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

/// Budget overrides. Unset fields keep the API's built-in default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuotaConfig {
    pub max_per_minute: Option<u32>,
    pub max_per_day: Option<u32>,
    pub max_per_month: Option<u32>,
    pub min_interval_ms: Option<u64>,
    pub cost_per_call: Option<f64>,
}

impl QuotaConfig {
    /// Apply the overrides on top of `defaults`.
    pub fn to_policy(&self, defaults: QuotaPolicy) -> QuotaPolicy {
        QuotaPolicy {
            max_per_minute: self.max_per_minute.unwrap_or(defaults.max_per_minute),
            max_per_day: self.max_per_day.unwrap_or(defaults.max_per_day),
            max_per_month: self.max_per_month.unwrap_or(defaults.max_per_month),
            min_interval: self
                .min_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
            cost_per_call: self.cost_per_call.unwrap_or(defaults.cost_per_call),
        }
    }
}

/// Retry settings for each LLM model before falling back.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
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

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new()
            .max_attempts(settings.max_attempts)
            .initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .max_delay(Duration::from_millis(settings.max_delay_ms))
    }
}

/// LLM (`[llm]`) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Model fallback order.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Per-model retry; absent means no retry.
    #[serde(default)]
    pub retry: Option<RetrySettings>,
    /// Override the Gemini API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            quota: QuotaConfig::default(),
            generation: GenerationConfig::default(),
            retry: None,
            base_url: None,
        }
    }
}

fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

impl LlmConfig {
    pub fn quota_policy(&self) -> QuotaPolicy {
        self.quota.to_policy(default_llm_quota())
    }
}

/// Image search (`[images]`) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,
    #[serde(default = "default_image_limit")]
    pub default_limit: usize,
    /// Override the Freepik API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            quota: QuotaConfig::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            default_limit: default_image_limit(),
            base_url: None,
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> u64 {
    10_000
}

fn default_image_limit() -> usize {
    DEFAULT_IMAGE_LIMIT
}

impl ImagesConfig {
    pub fn quota_policy(&self) -> QuotaPolicy {
        self.quota.to_policy(default_image_quota())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.cache_max_entries)
            .ttl(Duration::from_secs(self.cache_ttl_secs))
    }
}

/// Counter store backing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Remote,
}

/// Counter store (`[store]`) configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for the file backend (default: `~/.itinera/usage`).
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Base URL for the remote backend.
    #[serde(default)]
    pub url: Option<String>,
}

impl StoreConfig {
    /// Build the configured counter store.
    pub fn build(&self) -> Result<Arc<dyn CounterStore>> {
        match self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::File => {
                let dir = self
                    .dir
                    .clone()
                    .or_else(JsonFileStore::default_dir)
                    .ok_or_else(|| {
                        ItineraError::Configuration(
                            "store.dir is required when no home directory is available".into(),
                        )
                    })?;
                Ok(Arc::new(JsonFileStore::new(dir)))
            }
            StoreBackend::Remote => {
                let url = self.url.as_deref().ok_or_else(|| {
                    ItineraError::Configuration("store.url is required for the remote backend".into())
                })?;
                Ok(Arc::new(RemoteStore::new(url)))
            }
        }
    }
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
    #[serde(default)]
    pub freepik: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("gemini", "GEMINI_API_KEY"),
    ("freepik", "FREEPIK_API_KEY"),
];

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.itinera/config.toml`
    /// 3. `/etc/itinera/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ItineraError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            ItineraError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(ItineraError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".itinera").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/itinera/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Per-attempt upstream timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.limits.request_timeout_secs)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".itinera").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/itinera/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ItineraError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            ItineraError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    pub fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            ItineraError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(ItineraError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    pub fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a provider, falling back to its environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "gemini" => self.gemini.as_ref(),
            "freepik" => self.freepik.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
                .filter(|key| !key.trim().is_empty())
        })
    }
}
