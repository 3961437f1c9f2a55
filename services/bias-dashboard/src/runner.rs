//! Dashboard Runner - main event loop
//!
//! Mounts cached data, then refreshes on a timer and on demand. Refreshes
//! run as their own tasks so a manual request during a fetch is dropped by
//! the session instead of waiting behind it.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::cache::WinRateStore;
use crate::classifier::{determine_grade, WinRateTable};
use crate::display::{bias_cell, bias_text};
use crate::session::{DashboardSession, DashboardView, RefreshOutcome};
use crate::types::SymbolBiasRecord;

/// Interval for re-rendering the "last update" label
const LABEL_TICK: Duration = Duration::from_secs(60);

/// User commands read from the terminal
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    Grade {
        monthly: String,
        weekly: String,
        daily: String,
    },
    /// Persist a win-rate override for one grade
    SetWinRate { grade: String, rate: f64 },
    /// Print the effective win-rate table
    WinRates,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match head.to_lowercase().as_str() {
            "r" | "refresh" => Ok(Command::Refresh),
            "q" | "quit" | "exit" => Ok(Command::Quit),
            "h" | "help" | "?" => Ok(Command::Help),
            "g" | "grade" => {
                let parts: Vec<&str> = rest.split(',').map(str::trim).collect();
                match parts.as_slice() {
                    [monthly, weekly, daily] => Ok(Command::Grade {
                        monthly: monthly.to_string(),
                        weekly: weekly.to_string(),
                        daily: daily.to_string(),
                    }),
                    _ => Err("usage: grade <monthly>, <weekly>, <daily>".to_string()),
                }
            }
            "rates" => Ok(Command::WinRates),
            "rate" => match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
                [grade, rate] => rate
                    .trim_end_matches('%')
                    .parse::<f64>()
                    .map(|rate| Command::SetWinRate {
                        grade: grade.to_uppercase(),
                        rate,
                    })
                    .map_err(|e| format!("invalid win rate {}: {}", rate, e)),
                _ => Err("usage: rate <grade> <percent>".to_string()),
            },
            "" => Err("empty command".to_string()),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

pub const HELP: &str =
    "commands: refresh | grade <monthly>, <weekly>, <daily> | rates | rate <grade> <percent> | quit";

/// Grade line for a user-entered triple
pub fn grade_report(table: &WinRateTable, monthly: &str, weekly: &str, daily: &str) -> String {
    let grade = determine_grade(monthly, weekly, daily);
    format!(
        "M:{} W:{} D:{} => grade {} ({:.0}% win rate)",
        bias_text(Some(monthly)),
        bias_text(Some(weekly)),
        bias_text(Some(daily)),
        grade,
        table.win_rate(grade)
    )
}

/// One line per grade with its effective win rate
pub fn win_rate_lines(table: &WinRateTable) -> Vec<String> {
    table
        .effective()
        .into_iter()
        .map(|(grade, rate)| {
            let marker = if table.overrides().contains_key(grade.as_str()) {
                " (custom)"
            } else {
                ""
            };
            format!("  {:<3} {:>5.1}%{}", grade.as_str(), rate, marker)
        })
        .collect()
}

fn format_row(record: &SymbolBiasRecord) -> String {
    format!(
        "  {:<10} D:{:<26} W:{:<26} M:{:<26} [{}]",
        record.symbol,
        bias_cell(record.daily),
        bias_cell(record.weekly),
        bias_cell(record.monthly),
        record.grade()
    )
}

/// Header line: connection status, pair count and update age
pub fn status_line(view: &DashboardView) -> String {
    format!(
        "{} | {} pairs | updated {}",
        view.status_text, view.count, view.last_update_label
    )
}

/// Text lines for one render of the dashboard
pub fn render_lines(view: &DashboardView) -> Vec<String> {
    let mut lines = vec![status_line(view)];

    if view.groups.is_empty() {
        match &view.last_error {
            Some(error) => {
                lines.push(format!("Failed to load data: {}", error));
                lines.push("Make sure the backend server is running".to_string());
            }
            None => lines.push("No data available".to_string()),
        }
        return lines;
    }

    for (title, rows) in [
        ("BUY", &view.groups.buy),
        ("SELL", &view.groups.sell),
        ("WAIT", &view.groups.wait),
    ] {
        lines.push(format!("{} ({})", title, rows.len()));
        lines.extend(rows.iter().map(format_row));
    }

    lines
}

fn render(view: &DashboardView) {
    for line in render_lines(view) {
        info!("{}", line);
    }
}

/// Main dashboard loop
pub struct DashboardRunner {
    session: Arc<DashboardSession>,
    win_rates: WinRateStore,
    refresh_interval: Duration,
}

impl DashboardRunner {
    pub fn new(
        session: Arc<DashboardSession>,
        win_rates: WinRateStore,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            session,
            win_rates,
            refresh_interval,
        }
    }

    /// Run until a quit command arrives. A closed command channel only stops manual input.
    pub async fn run(self, mut commands: mpsc::Receiver<Command>) {
        info!("Dashboard starting, refresh every {:?}", self.refresh_interval);

        if self.session.mount().await {
            render(&self.session.view().await);
        }

        // First tick fires immediately, which is the initial fetch
        let mut refresh_interval = interval(self.refresh_interval);
        let mut label_interval = interval(LABEL_TICK);
        label_interval.tick().await;
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = refresh_interval.tick() => {
                    self.spawn_refresh("timer");
                }
                _ = label_interval.tick() => {
                    let view = self.session.view().await;
                    debug!("Last update: {}", view.last_update_label);
                }
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Refresh) => self.spawn_refresh("manual"),
                    Some(Command::Grade { monthly, weekly, daily }) => {
                        let table = self.win_rates.load_table().await;
                        info!("{}", grade_report(&table, &monthly, &weekly, &daily));
                    }
                    Some(Command::SetWinRate { grade, rate }) => self.set_win_rate(grade, rate).await,
                    Some(Command::WinRates) => {
                        let table = self.win_rates.load_table().await;
                        for line in win_rate_lines(&table) {
                            info!("{}", line);
                        }
                    }
                    Some(Command::Help) => info!("{}", HELP),
                    Some(Command::Quit) => {
                        info!("Dashboard stopping");
                        break;
                    }
                    None => {
                        debug!("Command input closed");
                        commands_open = false;
                    }
                },
            }
        }
    }

    async fn set_win_rate(&self, grade: String, rate: f64) {
        let mut overrides = self.win_rates.load_table().await.overrides().clone();
        overrides.insert(grade.clone(), rate);

        match self.win_rates.save_overrides(&overrides).await {
            Ok(()) => info!("Win rate for {} set to {:.1}%", grade, rate),
            Err(e) => warn!("Win rate not saved: {}", e),
        }
    }

    fn spawn_refresh(&self, trigger: &'static str) {
        let session = Arc::clone(&self.session);

        tokio::spawn(async move {
            match session.refresh().await {
                RefreshOutcome::Skipped => {
                    debug!("{} refresh skipped, fetch already in flight", trigger);
                }
                RefreshOutcome::Online { count } => {
                    debug!("{} refresh: {} pairs", trigger, count);
                    render(&session.view().await);
                }
                RefreshOutcome::Cached { error } => {
                    // Rows stay as they are, only the status line changes
                    warn!("{} refresh failed, keeping cached data: {}", trigger, error);
                    info!("{}", status_line(&session.view().await));
                }
                RefreshOutcome::Error { error } => {
                    let health = session.source().health().await;
                    error!(
                        "{} refresh failed with nothing to show: {} (success rate {:.0}%)",
                        trigger,
                        error,
                        health.success_rate * 100.0
                    );
                    render(&session.view().await);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SignalGroups;
    use crate::session::ConnectionStatus;
    use crate::types::{BiasLabel, SignalLabel};
    use std::collections::HashMap;

    #[test]
    fn test_parse_commands() {
        assert_eq!("r".parse::<Command>(), Ok(Command::Refresh));
        assert_eq!(" Refresh ".parse::<Command>(), Ok(Command::Refresh));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
        assert_eq!("?".parse::<Command>(), Ok(Command::Help));
        assert_eq!(
            "grade strong bull, Bull ,bull".parse::<Command>(),
            Ok(Command::Grade {
                monthly: "strong bull".to_string(),
                weekly: "Bull".to_string(),
                daily: "bull".to_string(),
            })
        );
        assert!("grade bull, bull".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
        assert_eq!("rates".parse::<Command>(), Ok(Command::WinRates));
        assert_eq!(
            "rate a+ 85%".parse::<Command>(),
            Ok(Command::SetWinRate {
                grade: "A+".to_string(),
                rate: 85.0,
            })
        );
        assert!("rate A+ lots".parse::<Command>().is_err());
        assert!("rate A+".parse::<Command>().is_err());
    }

    #[test]
    fn test_grade_report() {
        let table = WinRateTable::default();
        let line = grade_report(&table, "bull", "strong bull", "bull");
        assert!(line.ends_with("grade A- (70% win rate)"), "{}", line);

        let overrides: HashMap<String, f64> = [("B".to_string(), 45.0)].into_iter().collect();
        let line = grade_report(&WinRateTable::new(overrides), "", "", "");
        assert!(line.contains("M:NEUTRAL"));
        assert!(line.ends_with("grade B (45% win rate)"), "{}", line);
    }

    #[test]
    fn test_win_rate_lines() {
        let overrides: HashMap<String, f64> = [("A".to_string(), 77.5)].into_iter().collect();
        let lines = win_rate_lines(&WinRateTable::new(overrides));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "  A+   90.0%");
        assert_eq!(lines[1], "  A    77.5% (custom)");
        assert_eq!(lines[3], "  B    50.0%");
    }

    fn view(groups: SignalGroups, last_error: Option<String>) -> DashboardView {
        DashboardView {
            status: ConnectionStatus::Online,
            status_text: "Connected",
            count: groups.len(),
            groups,
            last_update: None,
            last_update_label: "Just now".to_string(),
            last_error,
        }
    }

    #[test]
    fn test_render_groups() {
        let groups = SignalGroups {
            buy: vec![SymbolBiasRecord::new(
                "EUR/USD",
                BiasLabel::Bull,
                BiasLabel::StrongBull,
                BiasLabel::StrongBull,
            )
            .with_signal(SignalLabel::Buy)],
            sell: vec![],
            wait: vec![SymbolBiasRecord::new(
                "USD/JPY",
                BiasLabel::Neutral,
                BiasLabel::Neutral,
                BiasLabel::Neutral,
            )],
        };

        let lines = render_lines(&view(groups, None));
        assert_eq!(lines[0], "Connected | 2 pairs | updated Just now");
        assert_eq!(lines[1], "BUY (1)");
        assert!(lines[2].contains("EUR/USD") && lines[2].ends_with("[A+]"));
        assert!(lines[2].contains("D:BULL (bull) "), "{}", lines[2]);
        assert!(lines[2].contains("W:STRONG BULL (strong-bull) "), "{}", lines[2]);
        assert_eq!(lines[3], "SELL (0)");
        assert_eq!(lines[4], "WAIT (1)");
        assert!(lines[5].ends_with("[B]"));
    }

    #[test]
    fn test_status_line_for_cached_fallback() {
        let mut cached = view(SignalGroups::default(), Some("HTTP 503: maintenance".to_string()));
        cached.status = ConnectionStatus::Cached;
        cached.status_text = "Showing cached data";
        cached.count = 28;
        cached.last_update_label = "7m ago".to_string();

        let line = status_line(&cached);
        assert_eq!(line, "Showing cached data | 28 pairs | updated 7m ago");
        assert_eq!(render_lines(&cached)[0], line);
    }

    #[test]
    fn test_render_placeholders() {
        let lines = render_lines(&view(SignalGroups::default(), None));
        assert_eq!(lines[1], "No data available");

        let lines = render_lines(&view(SignalGroups::default(), Some("HTTP 500: ".to_string())));
        assert_eq!(lines[1], "Failed to load data: HTTP 500: ");
    }
}
