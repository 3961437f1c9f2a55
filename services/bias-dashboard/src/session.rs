//! Dashboard session - fetch/cache reconciliation
//!
//! Holds everything the view needs between polls: visible rows, connection
//! status, last update time and the single-flight busy flag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, CachedBias};
use crate::classifier::{partition_by_signal, SignalGroups};
use crate::display::{last_update_label, status_text};
use crate::types::{BiasResponse, BiasSource, SymbolBiasRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Nothing shown yet
    Empty,
    Loading,
    /// Fresh server data
    Online,
    /// Older or offline data
    Cached,
    /// No data at all and the last attempt failed
    Error,
}

/// What a refresh call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another fetch was in flight, nothing was sent
    Skipped,
    Online { count: usize },
    Cached { error: String },
    Error { error: String },
}

#[derive(Debug)]
struct SessionState {
    status: ConnectionStatus,
    rows: Vec<SymbolBiasRecord>,
    count: usize,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl SessionState {
    fn show(&mut self, payload: BiasResponse, updated: DateTime<Utc>, status: ConnectionStatus) {
        self.count = payload.count;
        self.rows = payload.data;
        self.last_update = Some(updated);
        self.status = status;
    }

    fn show_cached(&mut self, cached: CachedBias) {
        self.show(cached.payload, cached.stored_at, ConnectionStatus::Cached);
    }
}

/// Snapshot handed to the renderer
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub status: ConnectionStatus,
    pub status_text: &'static str,
    pub groups: SignalGroups,
    pub count: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub last_update_label: String,
    pub last_error: Option<String>,
}

/// Clears the busy flag however the fetch ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DashboardSession {
    source: Arc<dyn BiasSource>,
    cache: CacheStore,
    busy: AtomicBool,
    state: RwLock<SessionState>,
}

impl DashboardSession {
    pub fn new(source: Arc<dyn BiasSource>, cache: CacheStore) -> Self {
        Self {
            source,
            cache,
            busy: AtomicBool::new(false),
            state: RwLock::new(SessionState {
                status: ConnectionStatus::Empty,
                rows: Vec::new(),
                count: 0,
                last_update: None,
                last_error: None,
            }),
        }
    }

    /// Show cached data straight away, whatever its age. Returns whether anything was shown.
    pub async fn mount(&self) -> bool {
        match self.cache.load().await {
            Some(cached) => {
                info!(
                    "Showing {} cached records ({}s old, {:?})",
                    cached.payload.data.len(),
                    cached.age_ms / 1000,
                    cached.freshness
                );
                self.state.write().await.show_cached(cached);
                true
            }
            None => {
                debug!("No cached bias data");
                false
            }
        }
    }

    /// Fetch once. A call made while another fetch is in flight is dropped, not queued.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in progress, ignoring");
            return RefreshOutcome::Skipped;
        }
        let _guard = BusyGuard(&self.busy);

        self.state.write().await.status = ConnectionStatus::Loading;

        match self.source.fetch_bias().await {
            Ok(payload) => {
                self.cache.save(&payload).await;

                let count = payload.count;
                let mut state = self.state.write().await;
                state.show(payload, Utc::now(), ConnectionStatus::Online);
                state.last_error = None;
                info!("Fetched {} pairs from {}", count, self.source.name());
                RefreshOutcome::Online { count }
            }
            Err(e) => {
                let error = e.to_string();
                warn!("Error fetching bias data: {}", error);

                let has_rows = !self.state.read().await.rows.is_empty();
                let fallback = if has_rows {
                    None
                } else {
                    self.cache.load().await
                };

                let mut state = self.state.write().await;
                state.last_error = Some(error.clone());

                if has_rows {
                    // Keep what is on screen, only the status changes
                    state.status = ConnectionStatus::Cached;
                    RefreshOutcome::Cached { error }
                } else if let Some(cached) = fallback {
                    state.show_cached(cached);
                    RefreshOutcome::Cached { error }
                } else {
                    state.status = ConnectionStatus::Error;
                    RefreshOutcome::Error { error }
                }
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    pub async fn rows(&self) -> Vec<SymbolBiasRecord> {
        self.state.read().await.rows.clone()
    }

    pub fn source(&self) -> &Arc<dyn BiasSource> {
        &self.source
    }

    pub async fn view(&self) -> DashboardView {
        self.view_at(Utc::now()).await
    }

    pub async fn view_at(&self, now: DateTime<Utc>) -> DashboardView {
        let state = self.state.read().await;
        DashboardView {
            status: state.status,
            status_text: status_text(state.status),
            groups: partition_by_signal(&state.rows),
            count: state.count,
            last_update: state.last_update,
            last_update_label: last_update_label(state.last_update, now),
            last_error: state.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::types::{BiasLabel, DashboardError, Result, SignalLabel, SourceHealth};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Source that replays scripted results, optionally held until released
    struct ScriptedSource {
        results: Mutex<VecDeque<Result<BiasResponse>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<BiasResponse>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl BiasSource for ScriptedSource {
        async fn fetch_bias(&self) -> Result<BiasResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self.results.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(DashboardError::Network("no more results".to_string())))
        }

        async fn health(&self) -> SourceHealth {
            SourceHealth {
                source: "scripted".to_string(),
                is_healthy: true,
                last_success: None,
                last_error: None,
                success_rate: 1.0,
                avg_latency_ms: 0,
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn payload(n: usize) -> BiasResponse {
        BiasResponse::new(
            (0..n)
                .map(|i| {
                    let rec = SymbolBiasRecord::new(
                        &format!("PAIR{}", i),
                        BiasLabel::Bull,
                        BiasLabel::Bull,
                        BiasLabel::StrongBull,
                    );
                    if i % 2 == 0 {
                        rec.with_signal(SignalLabel::Buy)
                    } else {
                        rec
                    }
                })
                .collect(),
        )
    }

    fn offline() -> DashboardError {
        DashboardError::Network("connection refused".to_string())
    }

    fn session(source: Arc<ScriptedSource>) -> (DashboardSession, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheStore::new(store.clone());
        (DashboardSession::new(source, cache), store)
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let (session, _) = session(Arc::new(ScriptedSource::new(vec![])));
        assert_eq!(session.status().await, ConnectionStatus::Empty);
        assert!(!session.mount().await);
        assert_eq!(session.status().await, ConnectionStatus::Empty);

        let view = session.view().await;
        assert_eq!(view.last_update_label, "--");
        assert!(view.groups.is_empty());
    }

    #[tokio::test]
    async fn test_success_goes_online_and_saves_cache() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(3))]));
        let store = Arc::new(MemoryStore::new());
        let session = DashboardSession::new(source.clone(), CacheStore::new(store.clone()));

        assert_eq!(session.refresh().await, RefreshOutcome::Online { count: 3 });
        assert_eq!(session.status().await, ConnectionStatus::Online);
        assert!(!session.is_busy());

        let view = session.view().await;
        assert_eq!(view.count, 3);
        assert_eq!(view.groups.buy.len(), 2);
        assert_eq!(view.groups.wait.len(), 1);
        assert_eq!(view.last_update_label, "Just now");

        let cached = CacheStore::new(store).load().await.unwrap();
        assert_eq!(cached.payload, payload(3));
    }

    #[tokio::test]
    async fn test_failure_with_rows_keeps_rows() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(5)), Err(offline())]));
        let (session, _) = session(source);

        session.refresh().await;
        let before = session.rows().await;
        assert_eq!(before.len(), 5);

        let outcome = session.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Cached { .. }));
        assert_eq!(session.status().await, ConnectionStatus::Cached);
        assert_eq!(session.rows().await, before);
        assert!(session.view().await.last_error.unwrap().contains("connection refused"));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_failure_without_anything_is_error() {
        let source = Arc::new(ScriptedSource::new(vec![Err(DashboardError::HttpStatus {
            status: 503,
            body: String::new(),
        })]));
        let (session, _) = session(source);

        let outcome = session.refresh().await;
        match outcome {
            RefreshOutcome::Error { error } => assert!(error.contains("503")),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(session.status().await, ConnectionStatus::Error);
        assert!(session.rows().await.is_empty());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_cache() {
        let source = Arc::new(ScriptedSource::new(vec![Err(offline())]));
        let (session, store) = session(source);
        CacheStore::new(store).save(&payload(4)).await;

        let outcome = session.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Cached { .. }));
        assert_eq!(session.status().await, ConnectionStatus::Cached);
        assert_eq!(session.rows().await.len(), 4);
    }

    #[tokio::test]
    async fn test_mount_shows_cache_then_refresh_replaces_it() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(2))]));
        let (session, store) = session(source);
        CacheStore::new(store).save(&payload(6)).await;

        assert!(session.mount().await);
        assert_eq!(session.status().await, ConnectionStatus::Cached);
        assert_eq!(session.rows().await.len(), 6);

        session.refresh().await;
        assert_eq!(session.status().await, ConnectionStatus::Online);
        assert_eq!(session.rows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_is_single_flight() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(1)), Ok(payload(2))]).gated(gate.clone()));
        let (session, _) = session(source.clone());
        let session = Arc::new(session);

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.refresh().await }
        });

        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(session.is_busy());
        assert_eq!(session.status().await, ConnectionStatus::Loading);

        assert_eq!(session.refresh().await, RefreshOutcome::Skipped);
        assert_eq!(source.calls(), 1);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), RefreshOutcome::Online { count: 1 });
        assert!(!session.is_busy());

        // Flag cleared, next refresh goes through
        gate.notify_one();
        assert_eq!(session.refresh().await, RefreshOutcome::Online { count: 2 });
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_busy_cleared_after_failure() {
        let source = Arc::new(ScriptedSource::new(vec![Err(offline()), Ok(payload(1))]));
        let (session, _) = session(source.clone());

        session.refresh().await;
        assert!(!session.is_busy());
        assert_eq!(session.refresh().await, RefreshOutcome::Online { count: 1 });
        assert_eq!(source.calls(), 2);
    }
}
