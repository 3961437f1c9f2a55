// Candle comparison that produces a bias label for one timeframe
use crate::types::BiasLabel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLC candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }
}

/// Compare the last closed candle `c1` against the one before it `c2`.
///
/// Priority order, first match wins:
/// 1. STRONG BULL - close breaks above the previous high
/// 2. STRONG BEAR - close breaks below the previous low
/// 3. BEAR - traded above the previous high but closed back under it
/// 4. BULL - traded below the previous low but closed back over it
/// 5. NEUTRAL - inside bar or anything else
pub fn calculate_bias(c1: &Candle, c2: &Candle) -> BiasLabel {
    if c1.close > c2.high {
        return BiasLabel::StrongBull;
    }

    if c1.close < c2.low {
        return BiasLabel::StrongBear;
    }

    if c1.high > c2.high && c1.close < c2.high {
        return BiasLabel::Bear;
    }

    if c1.low < c2.low && c1.close > c2.low {
        return BiasLabel::Bull;
    }

    BiasLabel::Neutral
}

/// Bias from candles ordered most recent first.
///
/// Index 0 is the still-forming candle and is skipped; index 1 is compared
/// with index 2. Fewer than three candles gives NEUTRAL.
pub fn bias_from_candles(candles: &[Candle]) -> BiasLabel {
    match candles {
        [_, c1, c2, ..] => calculate_bias(c1, c2),
        _ => BiasLabel::Neutral,
    }
}
