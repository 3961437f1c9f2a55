//! Dashboard Configuration
//!
//! Values come from `BIAS_DASHBOARD_*` environment variables (a `.env`
//! file is honoured); every field has a default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::ExpiryBehavior;
use crate::types::Result;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "BIAS_DASHBOARD";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DashboardConfig {
    /// Base URL of the bias API, `/api/bias` is appended
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Auto-refresh period
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Age after which cached data is stale
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub expiry_behavior: ExpiryBehavior,
    /// Directory for persisted state; in-memory only when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            refresh_interval_ms: default_refresh_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            expiry_behavior: ExpiryBehavior::default(),
            cache_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl DashboardConfig {
    /// Load from `.env` and the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env_prefix(ENV_PREFIX)
    }

    pub fn from_env_prefix(prefix: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Never zero, tokio intervals reject a zero period
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl_ms(&self) -> i64 {
        i64::try_from(self.cache_ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn max_log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn default_api_base_url() -> String { "http://localhost:8000".to_string() }
fn default_refresh_interval_ms() -> u64 { 60_000 }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_cache_ttl_secs() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
