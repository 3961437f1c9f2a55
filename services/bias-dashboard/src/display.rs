// Presentation helpers shared by the terminal renderer
use chrono::{DateTime, Local, Utc};

use crate::session::ConnectionStatus;
use crate::types::BiasLabel;

/// Badge style per bias label
pub static BADGE_CLASSES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "STRONG BULL" => "strong-bull",
    "BULL" => "bull",
    "NEUTRAL" => "neutral",
    "BEAR" => "bear",
    "STRONG BEAR" => "strong-bear",
};

/// Badge class for a raw label, `neutral` when unknown
pub fn badge_class(bias: &str) -> &'static str {
    BADGE_CLASSES.get(bias).copied().unwrap_or("neutral")
}

/// Table cell for one timeframe: wire label tagged with its badge class
pub fn bias_cell(bias: BiasLabel) -> String {
    format!("{} ({})", bias.as_str(), badge_class(bias.as_str()))
}

/// Label text, `NEUTRAL` when absent or blank
pub fn bias_text(bias: Option<&str>) -> &str {
    match bias {
        Some(text) if !text.trim().is_empty() => text,
        _ => "NEUTRAL",
    }
}

/// Human-readable age of the last successful update
pub fn last_update_label(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last) = last else {
        return "--".to_string();
    };

    let secs = (now - last).num_seconds().max(0);
    if secs < 60 {
        "Just now".to_string()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        last.with_timezone(&Local).format("%H:%M:%S").to_string()
    }
}

pub fn status_text(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Empty => "Waiting for data",
        ConnectionStatus::Loading => "Fetching data...",
        ConnectionStatus::Online => "Connected",
        ConnectionStatus::Cached => "Showing cached data",
        ConnectionStatus::Error => "Connection failed",
    }
}
