use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::criteria::CriteriaConfig;
use crate::error::ConfigError;

/// Which resolved profiles get their own neighbors expanded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecursionPolicy {
    /// Only the seed account is expanded.
    Disabled,
    /// Every resolved profile is expanded, matched or not.
    All,
    /// Only profiles that satisfied the criteria are expanded.
    #[default]
    MatchedOnly,
}

impl RecursionPolicy {
    pub fn should_expand(self, matched: bool) -> bool {
        match self {
            RecursionPolicy::Disabled => false,
            RecursionPolicy::All => true,
            RecursionPolicy::MatchedOnly => matched,
        }
    }
}

/// TOML-backed configuration loaded from disk.
/// Secrets (API tokens) stay as env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Screen name of the account the crawl starts from.
    pub seed: String,
    #[serde(default = "default_true")]
    pub following: bool,
    #[serde(default = "default_true")]
    pub followers: bool,
    #[serde(default)]
    pub recursion: RecursionPolicy,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default)]
    pub criteria: CriteriaConfig,
    #[serde(default)]
    pub crawl: CrawlSettings,
}

impl FileConfig {
    /// Minimal config for a seed account with default crawl settings.
    pub fn for_seed(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            following: true,
            followers: true,
            recursion: RecursionPolicy::default(),
            storage_dir: default_storage_dir(),
            criteria: CriteriaConfig::default(),
            crawl: CrawlSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed.trim().is_empty() {
            return Err(ConfigError::EmptySeed);
        }
        self.criteria.validate()?;
        self.crawl.validate()
    }
}

/// Tuning knobs for the crawl pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlSettings {
    /// IDs per bulk profile lookup. The platform caps this at 100.
    pub resolve_batch_size: usize,
    /// Matched profiles per result-sink delivery.
    pub result_batch_size: usize,
    /// Capacity of the investigation queue; pushes beyond it are dropped.
    pub investigating_capacity: usize,
    /// Buffer between the frontier and the resolver.
    pub candidate_buffer: usize,
    pub snapshot_interval_secs: u64,
    /// Transient-error retries per network call.
    pub max_retries: u32,
    pub retry_backoff_secs: u64,
    /// How long a partial batch may wait for more input before it is flushed.
    pub batch_linger_ms: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            resolve_batch_size: 100,
            result_batch_size: 20,
            investigating_capacity: 1000,
            candidate_buffer: 1000,
            snapshot_interval_secs: 60,
            max_retries: 3,
            retry_backoff_secs: 60,
            batch_linger_ms: 2000,
        }
    }
}

impl CrawlSettings {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn batch_linger(&self) -> Duration {
        Duration::from_millis(self.batch_linger_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("crawl.resolve_batch_size", self.resolve_batch_size),
            ("crawl.result_batch_size", self.result_batch_size),
            ("crawl.investigating_capacity", self.investigating_capacity),
            ("crawl.candidate_buffer", self.candidate_buffer),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroSetting(name));
            }
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::ZeroSetting("crawl.snapshot_interval_secs"));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}

/// Load, parse and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Credentials and endpoint overrides loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub bearer_token: String,
    pub api_base: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bearer_token = env::var("TWITTER_BEARER_TOKEN")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnv("TWITTER_BEARER_TOKEN"))?;

        Ok(Self {
            bearer_token,
            api_base: env::var("TWITTER_API_BASE").ok().filter(|v| !v.is_empty()),
        })
    }

    pub fn log_redacted(&self) {
        let preview: String = self.bearer_token.chars().take(5).collect();
        tracing::info!(
            "  TWITTER_BEARER_TOKEN: {}...({} chars)",
            preview,
            self.bearer_token.len()
        );
        tracing::info!(
            "  TWITTER_API_BASE: {}",
            self.api_base.as_deref().unwrap_or("<default>")
        );
    }
}
