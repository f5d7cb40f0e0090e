//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config PATH`, or `config.toml` in the platform config dir)
//! 3. environment variables prefixed `PLATELENS_`, with `__` for nesting
//!    (`PLATELENS_MODEL__TIMEOUT_SECS=10`)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::LocalTierConfig;
use crate::pipeline::PipelineSettings;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PLATELENS_";

/// Model endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub identify_model: String,
    pub detail_model: String,
    /// Cheaper model used for subject guesses.
    pub subject_model: String,
    /// Upper bound on each model call, in seconds.
    pub timeout_secs: u64,
    pub identify_max_tokens: u32,
    pub detail_max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let pipeline = PipelineSettings::default();
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "PLATELENS_API_KEY".to_string(),
            identify_model: pipeline.identify_model,
            detail_model: pipeline.detail_model,
            subject_model: pipeline.subject_model,
            timeout_secs: pipeline.timeout.as_secs(),
            identify_max_tokens: pipeline.identify_max_tokens,
            detail_max_tokens: pipeline.detail_max_tokens,
        }
    }
}

impl ModelConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("API key not set; export {}", self.api_key_env))
    }

    /// Pipeline settings derived from this configuration.
    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            identify_model: self.identify_model.clone(),
            detail_model: self.detail_model.clone(),
            subject_model: self.subject_model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            identify_max_tokens: self.identify_max_tokens,
            detail_max_tokens: self.detail_max_tokens,
            ..PipelineSettings::default()
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file for the persistent tier.
    pub database_path: PathBuf,
    /// Snapshot file for the local tier. `None` keeps it in memory.
    pub local_snapshot_path: Option<PathBuf>,
    /// Maximum local entries.
    pub local_capacity: usize,
    /// Local entries older than this are dropped.
    pub local_max_age_days: u32,
    /// Maximum local snapshot size in bytes.
    pub local_quota_bytes: usize,
    /// Model endpoint settings.
    pub model: ModelConfig,
}

impl Default for Config {
    fn default() -> Self {
        let local = LocalTierConfig::default();
        let data_dir = Self::data_dir();
        Self {
            database_path: data_dir.join("analyses.db"),
            local_snapshot_path: Some(data_dir.join("local-cache.json")),
            local_capacity: local.capacity,
            local_max_age_days: local.max_age_days,
            local_quota_bytes: local.quota_bytes,
            model: ModelConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults on error.
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        match Self::try_load_from_path(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from `path` (which may not exist), then the
    /// environment.
    pub fn try_load_from_path(path: &Path) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if path.exists() {
            log::debug!("Reading config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration ({})", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the caches or model calls unusable.
    pub fn validate(&self) -> Result<()> {
        if self.local_capacity == 0 {
            anyhow::bail!("local_capacity must be at least 1");
        }
        if self.local_max_age_days == 0 {
            anyhow::bail!("local_max_age_days must be at least 1");
        }
        if self.model.timeout_secs == 0 {
            anyhow::bail!("model.timeout_secs must be at least 1");
        }
        if self.model.base_url.trim().is_empty() {
            anyhow::bail!("model.base_url must not be empty");
        }
        if self.model.identify_max_tokens == 0 || self.model.detail_max_tokens == 0 {
            anyhow::bail!("model token budgets must be at least 1");
        }
        Ok(())
    }

    /// Settings for the local tier.
    #[must_use]
    pub fn local_tier(&self) -> LocalTierConfig {
        let config = LocalTierConfig::default()
            .with_capacity(self.local_capacity)
            .with_max_age_days(self.local_max_age_days)
            .with_quota_bytes(self.local_quota_bytes);
        match &self.local_snapshot_path {
            Some(path) => config.with_snapshot(path),
            None => config,
        }
    }

    /// Save the configuration as TOML to `path`.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Default platform-specific configuration path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "platelens", "platelens")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))
    }

    fn data_dir() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|_| PathBuf::from(".platelens"))
    }
}
