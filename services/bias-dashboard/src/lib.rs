//! Bias Dashboard Library
//!
//! Polls a bias API, keeps the last good response in a local TTL cache and
//! grades monthly/weekly/daily bias alignment.

pub mod types;
pub mod sources {
    pub mod bias_api;
}
pub mod cache;
pub mod calculator;
pub mod classifier;
pub mod display;
pub mod runner;
pub mod session;
pub mod settings;

pub use cache::{CacheStore, CachedBias, ExpiryBehavior, FileStore, Freshness, KeyValueStore, MemoryStore, WinRateStore};
pub use calculator::{bias_from_candles, calculate_bias, Candle};
pub use classifier::{determine_grade, get_win_rate, grade_for, partition_by_signal, SignalGroups, WinRateTable};
pub use runner::{Command, DashboardRunner};
pub use session::{ConnectionStatus, DashboardSession, DashboardView, RefreshOutcome};
pub use settings::DashboardConfig;
pub use sources::bias_api::BiasApiClient;
pub use types::*;
