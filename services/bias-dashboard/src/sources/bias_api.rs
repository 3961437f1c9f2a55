use crate::types::*;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Per-client request outcomes. A fetch counts once, after it has been
/// fully decoded and validated, so `health()` needs no extra API calls.
#[derive(Default)]
struct RequestStats {
    successes: AtomicU64,
    failures: AtomicU64,
    /// Failures since the last success
    failure_streak: AtomicU32,
    /// Millis since epoch, 0 until the first success
    last_success_ms: AtomicI64,
    last_latency_ms: AtomicU64,
}

impl RequestStats {
    fn succeeded(&self, started: Instant) {
        self.last_latency_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.last_success_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.failure_streak.store(0, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    fn failed(&self) {
        self.failure_streak.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn last_success(&self) -> Option<DateTime<Utc>> {
        match self.last_success_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    fn success_rate(&self) -> f64 {
        let successes = self.successes.load(Ordering::Relaxed);
        let total = successes + self.failures.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        successes as f64 / total as f64
    }
}

/// Client for the bias API (`GET /api/bias`)
pub struct BiasApiClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    stats: RequestStats,
}

impl BiasApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Trailing slash so join() appends instead of replacing the last segment
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| DashboardError::Network(format!("Invalid base URL {}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DashboardError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
            stats: RequestStats::default(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DashboardError::Network(e.to_string()))
    }

    /// GET with explicit timeout; non-2xx is an error. Only failures are
    /// recorded here, the caller records success once the body is usable.
    async fn get(&self, url: &Url) -> Result<reqwest::Response> {
        debug!("GET {}", url);

        let response = match tokio::time::timeout(self.timeout, self.client.get(url.clone()).send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) if e.is_timeout() => return Err(self.timed_out(url)),
            Ok(Err(e)) => return Err(DashboardError::Network(e.to_string())),
            Err(_) => return Err(self.timed_out(url)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Bias API returned {} for {}", status, url);
            return Err(DashboardError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    fn timed_out(&self, url: &Url) -> DashboardError {
        DashboardError::Timeout {
            url: url.to_string(),
            secs: self.timeout.as_secs(),
        }
    }

    async fn fetch_validated(&self, url: &Url) -> Result<BiasResponse> {
        let payload: BiasResponse = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|e| DashboardError::InvalidResponse(e.to_string()))?;

        payload.validate()?;
        Ok(payload)
    }

    /// Fetch and validate the full bias table
    pub async fn fetch_bias(&self) -> Result<BiasResponse> {
        let url = self.endpoint("api/bias")?;
        let started = Instant::now();

        match self.fetch_validated(&url).await {
            Ok(payload) => {
                self.stats.succeeded(started);
                debug!("Received {} bias records", payload.count);
                Ok(payload)
            }
            Err(e) => {
                self.stats.failed();
                Err(e)
            }
        }
    }

    /// Server liveness probe (`GET /api/health`)
    pub async fn health_check(&self) -> Result<()> {
        let url = self.endpoint("api/health")?;
        let started = Instant::now();

        match self.get(&url).await {
            Ok(_) => {
                self.stats.succeeded(started);
                Ok(())
            }
            Err(e) => {
                self.stats.failed();
                Err(e)
            }
        }
    }

    /// Health from recorded request outcomes
    pub async fn health(&self) -> SourceHealth {
        let streak = self.stats.failure_streak.load(Ordering::Relaxed);
        let last_success = self.stats.last_success();

        SourceHealth {
            source: self.name().to_string(),
            is_healthy: last_success.is_some() && streak == 0,
            last_success,
            last_error: (streak > 0).then(|| format!("{} consecutive failed requests", streak)),
            success_rate: self.stats.success_rate(),
            avg_latency_ms: self.stats.last_latency_ms.load(Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        "bias_api"
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }
}

#[async_trait::async_trait]
impl BiasSource for BiasApiClient {
    async fn fetch_bias(&self) -> Result<BiasResponse> {
        BiasApiClient::fetch_bias(self).await
    }

    async fn health(&self) -> SourceHealth {
        BiasApiClient::health(self).await
    }

    fn name(&self) -> &str {
        "bias_api"
    }
}
