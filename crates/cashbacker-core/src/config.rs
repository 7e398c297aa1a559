//! Application configuration
//!
//! Config is loaded with a three-layer resolution:
//! 1. Explicit path (`--config` or `CASHBACKER_CONFIG`)
//! 2. Override in the data dir (~/.local/share/cashbacker/config/cashbacker.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! A few values can also be overridden from the environment:
//! - `CASHBACKER_BANK_API_URL`: bank network base URL
//! - `CASHBACKER_CATEGORIZER_HOST`: remote categorizer URL (switches backend to http)
//! - `CASHBACKER_SYNC_COOLDOWN_MINUTES`: sync throttle window

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/cashbacker.toml");

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "CASHBACKER_CONFIG";

/// Upper bound on the sync cool-down (one week)
pub const MAX_COOLDOWN_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub cashback: CashbackConfig,
    pub bank_api: BankApiConfig,
    pub categorizer: CategorizerConfig,
    pub categories: CategoriesConfig,
}

/// Sync pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub cooldown_minutes: i64,
    pub timeout_secs: u64,
    pub classify_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 30,
            timeout_secs: 15,
            classify_batch_size: 64,
        }
    }
}

impl SyncConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cooldown_minutes)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Cashback selection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CashbackConfig {
    /// Banks whose accounts may choose cashback categories
    pub eligible_banks: Vec<String>,
    pub max_candidates: usize,
    pub min_percent: i64,
    pub max_percent: i64,
    pub history_days: i64,
    /// Bound for recommender calls
    pub timeout_secs: u64,
}

impl Default for CashbackConfig {
    fn default() -> Self {
        Self {
            eligible_banks: vec!["center-invest".to_string()],
            max_candidates: 5,
            min_percent: 3,
            max_percent: 10,
            history_days: 90,
            timeout_secs: 15,
        }
    }
}

impl CashbackConfig {
    /// Whether accounts at `bank` may choose cashback categories
    pub fn is_eligible_bank(&self, bank: &str) -> bool {
        self.eligible_banks
            .iter()
            .any(|b| b.trim().eq_ignore_ascii_case(bank.trim()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bank network endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BankApiConfig {
    pub base_url: Option<String>,
}

/// Which categorizer backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorizerBackend {
    #[default]
    Rules,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategorizerConfig {
    pub backend: CategorizerBackend,
    pub host: Option<String>,
    pub fallback_category: String,
    pub rules: Vec<CategoryRule>,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            backend: CategorizerBackend::Rules,
            host: None,
            fallback_category: "other".to_string(),
            rules: Vec::new(),
        }
    }
}

/// Regex patterns that map a description to a category
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoriesConfig {
    /// Categories seeded into the catalog on init
    pub catalog: Vec<String>,
}

impl AppConfig {
    /// Load configuration using the standard resolution order
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let path = explicit
            .map(Path::to_path_buf)
            .or(env_path)
            .or_else(|| default_config_path().filter(|p| p.exists()));

        let content = match path {
            Some(ref p) => {
                debug!(path = %p.display(), "Loading config");
                fs::read_to_string(p).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", p.display(), e))
                })?
            }
            None => DEFAULT_CONFIG.to_string(),
        };

        let mut config = Self::from_toml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults only (no files, no environment)
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Parse config from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let c = &self.cashback;
        if c.min_percent < 0 || c.min_percent > c.max_percent {
            return Err(Error::Config(format!(
                "cashback percent range {}..={} is invalid",
                c.min_percent, c.max_percent
            )));
        }
        if c.max_candidates == 0 {
            return Err(Error::Config("cashback.max_candidates must be > 0".into()));
        }
        if self.sync.classify_batch_size == 0 {
            return Err(Error::Config("sync.classify_batch_size must be > 0".into()));
        }
        if !(0..=MAX_COOLDOWN_MINUTES).contains(&self.sync.cooldown_minutes) {
            return Err(Error::Config(format!(
                "sync.cooldown_minutes must be within 0..={}",
                MAX_COOLDOWN_MINUTES
            )));
        }
        Ok(())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("CASHBACKER_BANK_API_URL") {
            if !url.trim().is_empty() {
                self.bank_api.base_url = Some(url);
            }
        }
        if let Some(host) = var("CASHBACKER_CATEGORIZER_HOST") {
            if !host.trim().is_empty() {
                self.categorizer.host = Some(host);
                self.categorizer.backend = CategorizerBackend::Http;
            }
        }
        if let Some(minutes) =
            var("CASHBACKER_SYNC_COOLDOWN_MINUTES").and_then(|s| s.trim().parse().ok())
        {
            self.sync.cooldown_minutes = minutes;
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("cashbacker").join("config").join("cashbacker.toml"))
}
