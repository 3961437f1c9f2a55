use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trend direction for one symbol at one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BiasLabel {
    #[serde(rename = "STRONG BULL")]
    StrongBull,
    #[serde(rename = "BULL")]
    Bull,
    #[default]
    #[serde(rename = "NEUTRAL")]
    Neutral,
    #[serde(rename = "BEAR")]
    Bear,
    #[serde(rename = "STRONG BEAR")]
    StrongBear,
}

impl BiasLabel {
    pub const ALL: [BiasLabel; 5] = [
        BiasLabel::StrongBull,
        BiasLabel::Bull,
        BiasLabel::Neutral,
        BiasLabel::Bear,
        BiasLabel::StrongBear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BiasLabel::StrongBull => "STRONG BULL",
            BiasLabel::Bull => "BULL",
            BiasLabel::Neutral => "NEUTRAL",
            BiasLabel::Bear => "BEAR",
            BiasLabel::StrongBear => "STRONG BEAR",
        }
    }

    /// Case-insensitive parse, `None` for anything unrecognized
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "STRONG BULL" => Some(BiasLabel::StrongBull),
            "BULL" => Some(BiasLabel::Bull),
            "NEUTRAL" => Some(BiasLabel::Neutral),
            "BEAR" => Some(BiasLabel::Bear),
            "STRONG BEAR" => Some(BiasLabel::StrongBear),
            _ => None,
        }
    }
}

impl fmt::Display for BiasLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BiasLabel {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| DashboardError::InvalidResponse(format!("Unknown bias: {}", s)))
    }
}

/// Trade action recommended by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalLabel {
    Buy,
    Sell,
    Wait,
}

impl SignalLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLabel::Buy => "BUY",
            SignalLabel::Sell => "SELL",
            SignalLabel::Wait => "WAIT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "BUY" => Some(SignalLabel::Buy),
            "SELL" => Some(SignalLabel::Sell),
            "WAIT" => Some(SignalLabel::Wait),
            _ => None,
        }
    }
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Setup quality derived from monthly/weekly/daily alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GradeLabel {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B")]
    B,
}

impl GradeLabel {
    pub const ALL: [GradeLabel; 4] = [
        GradeLabel::APlus,
        GradeLabel::A,
        GradeLabel::AMinus,
        GradeLabel::B,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GradeLabel::APlus => "A+",
            GradeLabel::A => "A",
            GradeLabel::AMinus => "A-",
            GradeLabel::B => "B",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "A+" => Some(GradeLabel::APlus),
            "A" => Some(GradeLabel::A),
            "A-" => Some(GradeLabel::AMinus),
            "B" => Some(GradeLabel::B),
            _ => None,
        }
    }
}

impl fmt::Display for GradeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Bias classification for one tradable symbol, as sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolBiasRecord {
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_bias")]
    pub daily: BiasLabel,
    #[serde(default, deserialize_with = "lenient_bias")]
    pub weekly: BiasLabel,
    #[serde(default, deserialize_with = "lenient_bias")]
    pub monthly: BiasLabel,
    #[serde(
        default,
        deserialize_with = "lenient_signal",
        skip_serializing_if = "Option::is_none"
    )]
    pub signal: Option<SignalLabel>,
}

impl SymbolBiasRecord {
    pub fn new(symbol: &str, daily: BiasLabel, weekly: BiasLabel, monthly: BiasLabel) -> Self {
        Self {
            symbol: symbol.to_string(),
            daily,
            weekly,
            monthly,
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: SignalLabel) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Server signal, `WAIT` when absent
    pub fn effective_signal(&self) -> SignalLabel {
        self.signal.unwrap_or(SignalLabel::Wait)
    }
}

/// Full `/api/bias` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BiasResponse {
    pub data: Vec<SymbolBiasRecord>,
    pub count: usize,
}

impl BiasResponse {
    pub fn new(data: Vec<SymbolBiasRecord>) -> Self {
        let count = data.len();
        Self { data, count }
    }

    /// Reject payloads the dashboard cannot render consistently
    pub fn validate(&self) -> Result<()> {
        if self.count != self.data.len() {
            return Err(DashboardError::InvalidResponse(format!(
                "count {} does not match {} records",
                self.count,
                self.data.len()
            )));
        }

        if let Some(pos) = self.data.iter().position(|r| r.symbol.trim().is_empty()) {
            return Err(DashboardError::InvalidResponse(format!(
                "record {} has an empty symbol",
                pos
            )));
        }

        Ok(())
    }
}

/// Unknown, empty, null or non-string labels become NEUTRAL
fn lenient_bias<'de, D>(deserializer: D) -> std::result::Result<BiasLabel, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw.as_str().and_then(BiasLabel::parse).unwrap_or_default())
}

/// Anything but a recognized string is treated as no signal
fn lenient_signal<'de, D>(deserializer: D) -> std::result::Result<Option<SignalLabel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw.as_str().and_then(SignalLabel::parse))
}

/// Data source health/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
}

/// Error types for the dashboard
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("API request failed: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid win rate for {grade}: {reason}")]
    InvalidWinRate { grade: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Result type for dashboard operations
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Trait for bias data sources
#[async_trait::async_trait]
pub trait BiasSource: Send + Sync {
    /// Fetch the full bias table
    async fn fetch_bias(&self) -> Result<BiasResponse>;

    /// Get source health status
    async fn health(&self) -> SourceHealth;

    /// Source name
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bias_label_parse_is_case_insensitive() {
        assert_eq!(BiasLabel::parse("strong bull"), Some(BiasLabel::StrongBull));
        assert_eq!(BiasLabel::parse("  Bear "), Some(BiasLabel::Bear));
        assert_eq!(BiasLabel::parse("sideways"), None);
        assert!("bull".parse::<BiasLabel>().is_ok());
        assert!("".parse::<BiasLabel>().is_err());
    }

    #[test]
    fn test_record_deserialize_defaults() {
        let json = r#"{"symbol":"EUR/USD","daily":"bull","weekly":null,"monthly":"CHOPPY","signal":"sell"}"#;
        let rec: SymbolBiasRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.daily, BiasLabel::Bull);
        assert_eq!(rec.weekly, BiasLabel::Neutral);
        assert_eq!(rec.monthly, BiasLabel::Neutral);
        assert_eq!(rec.signal, Some(SignalLabel::Sell));

        let json = r#"{"symbol":"XAU/USD"}"#;
        let rec: SymbolBiasRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.daily, BiasLabel::Neutral);
        assert_eq!(rec.signal, None);
        assert_eq!(rec.effective_signal(), SignalLabel::Wait);
    }

    #[test]
    fn test_record_non_string_labels_default() {
        let json = r#"{"symbol":"EUR/USD","daily":1,"weekly":true,"monthly":{"trend":"BULL"},"signal":["BUY"]}"#;
        let rec: SymbolBiasRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.daily, BiasLabel::Neutral);
        assert_eq!(rec.weekly, BiasLabel::Neutral);
        assert_eq!(rec.monthly, BiasLabel::Neutral);
        assert_eq!(rec.signal, None);

        // One odd record must not sink the rest of the response
        let json = r#"{"data":[
            {"symbol":"EUR/USD","daily":"BULL","weekly":"BULL","monthly":"STRONG BULL","signal":true},
            {"symbol":"USD/JPY","daily":"BEAR","weekly":"BEAR","monthly":"BEAR","signal":"SELL"}
        ],"count":2}"#;
        let response: BiasResponse = serde_json::from_str(json).unwrap();
        assert!(response.validate().is_ok());
        assert_eq!(response.data[0].signal, None);
        assert_eq!(response.data[0].effective_signal(), SignalLabel::Wait);
        assert_eq!(response.data[1].signal, Some(SignalLabel::Sell));
    }

    #[test]
    fn test_record_serializes_wire_labels() {
        let rec = SymbolBiasRecord::new("GBP/USD", BiasLabel::StrongBear, BiasLabel::Bear, BiasLabel::Neutral)
            .with_signal(SignalLabel::Sell);
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["daily"], "STRONG BEAR");
        assert_eq!(value["signal"], "SELL");

        let no_signal = SymbolBiasRecord::new("USD/JPY", BiasLabel::Bull, BiasLabel::Bull, BiasLabel::Bull);
        let value = serde_json::to_value(&no_signal).unwrap();
        assert!(value.get("signal").is_none());
    }

    #[test]
    fn test_response_validation() {
        let ok = BiasResponse::new(vec![SymbolBiasRecord::new(
            "EUR/USD",
            BiasLabel::Bull,
            BiasLabel::Bull,
            BiasLabel::Bull,
        )]);
        assert!(ok.validate().is_ok());

        let mut bad_count = ok.clone();
        bad_count.count = 3;
        assert!(matches!(bad_count.validate(), Err(DashboardError::InvalidResponse(_))));

        let empty_symbol = BiasResponse::new(vec![SymbolBiasRecord::new(
            " ",
            BiasLabel::Bull,
            BiasLabel::Bull,
            BiasLabel::Bull,
        )]);
        assert!(empty_symbol.validate().is_err());
    }

    #[test]
    fn test_grade_label_parse() {
        assert_eq!(GradeLabel::parse("a+"), Some(GradeLabel::APlus));
        assert_eq!(GradeLabel::parse("A-"), Some(GradeLabel::AMinus));
        assert_eq!(GradeLabel::parse("Z"), None);
    }
}
