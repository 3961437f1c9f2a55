// Grade, win-rate and signal grouping logic
use crate::types::*;
use serde::Serialize;
use std::collections::HashMap;

/// Grade a bias triple given as free-form strings.
///
/// Labels are compared case-insensitively. Anything that is not a known
/// label never matches a grading rule, so the result falls back to `B`.
pub fn determine_grade(monthly: &str, weekly: &str, daily: &str) -> GradeLabel {
    match (
        BiasLabel::parse(monthly),
        BiasLabel::parse(weekly),
        BiasLabel::parse(daily),
    ) {
        (Some(m), Some(w), Some(d)) => grade_for(m, w, d),
        _ => GradeLabel::B,
    }
}

/// Grade a typed bias triple. Rules are checked in priority order, first match wins.
pub fn grade_for(monthly: BiasLabel, weekly: BiasLabel, daily: BiasLabel) -> GradeLabel {
    use BiasLabel::*;

    match (monthly, weekly, daily) {
        // Strong conviction on both higher timeframes, daily confirms
        (StrongBull, StrongBull, Bull) | (StrongBear, StrongBear, Bear) => GradeLabel::APlus,
        (StrongBull, Bull, Bull) | (StrongBear, Bear, Bear) => GradeLabel::A,
        // Weekly accelerating past monthly
        (Bull, StrongBull, Bull) | (Bear, StrongBear, Bear) => GradeLabel::AMinus,
        _ => GradeLabel::B,
    }
}

impl SymbolBiasRecord {
    pub fn grade(&self) -> GradeLabel {
        grade_for(self.monthly, self.weekly, self.daily)
    }
}

/// Built-in win rates per grade, in percent
pub fn default_win_rates() -> HashMap<String, f64> {
    [
        (GradeLabel::APlus, 90.0),
        (GradeLabel::A, 80.0),
        (GradeLabel::AMinus, 70.0),
        (GradeLabel::B, 50.0),
    ]
    .into_iter()
    .map(|(g, rate)| (g.as_str().to_string(), rate))
    .collect()
}

/// Look up a win rate: overrides first, then defaults, then 0
pub fn get_win_rate(
    grade: &str,
    overrides: &HashMap<String, f64>,
    defaults: &HashMap<String, f64>,
) -> f64 {
    overrides
        .get(grade)
        .or_else(|| defaults.get(grade))
        .copied()
        .unwrap_or(0.0)
}

/// Default win rates with user overrides merged on top, key by key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinRateTable {
    defaults: HashMap<String, f64>,
    overrides: HashMap<String, f64>,
}

impl Default for WinRateTable {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl WinRateTable {
    pub fn new(overrides: HashMap<String, f64>) -> Self {
        Self {
            defaults: default_win_rates(),
            overrides,
        }
    }

    pub fn win_rate(&self, grade: GradeLabel) -> f64 {
        get_win_rate(grade.as_str(), &self.overrides, &self.defaults)
    }

    pub fn overrides(&self) -> &HashMap<String, f64> {
        &self.overrides
    }

    /// Effective rate for every grade, best grade first
    pub fn effective(&self) -> Vec<(GradeLabel, f64)> {
        GradeLabel::ALL
            .iter()
            .map(|g| (*g, self.win_rate(*g)))
            .collect()
    }
}

/// Check a user-entered override before it is persisted
pub fn validate_win_rate(grade: &str, rate: f64) -> Result<()> {
    if GradeLabel::parse(grade).map(|g| g.as_str()) != Some(grade) {
        return Err(DashboardError::InvalidWinRate {
            grade: grade.to_string(),
            reason: "unknown grade".to_string(),
        });
    }

    if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
        return Err(DashboardError::InvalidWinRate {
            grade: grade.to_string(),
            reason: format!("{} is outside 0-100", rate),
        });
    }

    Ok(())
}

/// Records split by server signal, each group keeping the original order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignalGroups {
    pub buy: Vec<SymbolBiasRecord>,
    pub sell: Vec<SymbolBiasRecord>,
    pub wait: Vec<SymbolBiasRecord>,
}

impl SignalGroups {
    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len() + self.wait.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stable three-way partition; a missing signal counts as WAIT
pub fn partition_by_signal(records: &[SymbolBiasRecord]) -> SignalGroups {
    let mut groups = SignalGroups::default();

    for record in records {
        let bucket = match record.effective_signal() {
            SignalLabel::Buy => &mut groups.buy,
            SignalLabel::Sell => &mut groups.sell,
            SignalLabel::Wait => &mut groups.wait,
        };
        bucket.push(record.clone());
    }

    groups
}
