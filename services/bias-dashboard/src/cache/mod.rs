// Local key-value persistence: last good response and win-rate overrides
use crate::classifier::{validate_win_rate, WinRateTable};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Key holding the last successful `/api/bias` response
pub const CACHE_KEY: &str = "bias_cache";
/// Key holding user win-rate overrides
pub const WIN_RATES_KEY: &str = "win_rates";

/// Default cache TTL in milliseconds
pub const DEFAULT_CACHE_TTL_MS: i64 = 5 * 60 * 1000; // 5 minutes

/// Minimal string key-value store
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key under a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DashboardError::Storage(e.to_string()))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DashboardError::Storage(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));

        // Write then rename so readers never see a partial entry
        fs::write(&tmp, value)
            .await
            .map_err(|e| DashboardError::Storage(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| DashboardError::Storage(e.to_string()))?;

        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DashboardError::Storage(e.to_string())),
        }
    }
}

/// In-process store, nothing survives a restart
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// What to do with an entry older than the TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryBehavior {
    /// Still return it, flagged stale
    #[default]
    ShowStale,
    /// Report it as if nothing were cached
    TreatAsAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Persisted record; payload and timestamp always written together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: BiasResponse,
    pub stored_at_ms: i64,
}

/// Result of a cache load
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBias {
    pub payload: BiasResponse,
    pub stored_at: DateTime<Utc>,
    pub age_ms: i64,
    pub freshness: Freshness,
}

impl CachedBias {
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

/// Single-entry TTL cache of the last successful response
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
    ttl_ms: i64,
    expiry: ExpiryBehavior,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            expiry: ExpiryBehavior::default(),
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms.max(0);
        self
    }

    pub fn with_expiry(mut self, expiry: ExpiryBehavior) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    pub async fn save(&self, payload: &BiasResponse) {
        self.save_at(payload, Utc::now()).await
    }

    /// Overwrite the cached entry. Failures are logged and the previous entry is left alone.
    pub async fn save_at(&self, payload: &BiasResponse, now: DateTime<Utc>) {
        let entry = CacheEntry {
            payload: payload.clone(),
            stored_at_ms: now.timestamp_millis(),
        };

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize bias cache: {}", e);
                return;
            }
        };

        match self.store.set(CACHE_KEY, &json).await {
            Ok(()) => debug!("Cached {} records", payload.data.len()),
            Err(e) => warn!("Failed to save bias cache: {}", e),
        }
    }

    pub async fn load(&self) -> Option<CachedBias> {
        self.load_at(Utc::now()).await
    }

    /// Read the cached entry and classify its age against the TTL
    pub async fn load_at(&self, now: DateTime<Utc>) -> Option<CachedBias> {
        let raw = match self.store.get(CACHE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read bias cache: {}", e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring unreadable bias cache: {}", e);
                return None;
            }
        };

        let stored_at = DateTime::from_timestamp_millis(entry.stored_at_ms)?;
        // Clock skew can put the entry in the future
        let age_ms = (now.timestamp_millis() - entry.stored_at_ms).max(0);
        let freshness = if age_ms > self.ttl_ms {
            Freshness::Stale
        } else {
            Freshness::Fresh
        };

        if freshness == Freshness::Stale && self.expiry == ExpiryBehavior::TreatAsAbsent {
            debug!("Bias cache expired ({}ms old), treating as absent", age_ms);
            return None;
        }

        Some(CachedBias {
            payload: entry.payload,
            stored_at,
            age_ms,
            freshness,
        })
    }

    /// Delete the cached entry
    pub async fn invalidate(&self) -> Result<()> {
        self.store.remove(CACHE_KEY).await
    }
}

/// Persisted win-rate overrides
pub struct WinRateStore {
    store: Arc<dyn KeyValueStore>,
}

impl WinRateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Defaults merged with whatever overrides are stored; bad data counts as none
    pub async fn load_table(&self) -> WinRateTable {
        let mut overrides = match self.store.get(WIN_RATES_KEY).await {
            Ok(Some(raw)) => serde_json::from_str::<HashMap<String, f64>>(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed win rate overrides: {}", e);
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Failed to read win rate overrides: {}", e);
                HashMap::new()
            }
        };

        // Hand-edited files can hold anything; drop entries a save would reject
        overrides.retain(|grade, rate| match validate_win_rate(grade, *rate) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring stored win rate override: {}", e);
                false
            }
        });

        WinRateTable::new(overrides)
    }

    pub async fn save_overrides(&self, overrides: &HashMap<String, f64>) -> Result<()> {
        for (grade, rate) in overrides {
            validate_win_rate(grade, *rate)?;
        }

        let json = serde_json::to_string(overrides)?;
        self.store.set(WIN_RATES_KEY, &json).await
    }
}
