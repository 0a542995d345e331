use anyhow::Result;
use chrono::{DateTime, Utc};

#[cfg(feature = "colors")]
use owo_colors::OwoColorize;

// Provide a no-op color shim when "colors" feature is disabled
#[cfg(not(feature = "colors"))]
pub mod color_shim {
    use std::fmt::{self, Display, Formatter};

    #[derive(Clone)]
    pub struct Plain(pub String);

    impl Display for Plain {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    pub trait ColorizeShim {
        fn as_str(&self) -> &str;

        fn red(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn yellow(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn green(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bold(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn dimmed(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
    }

    impl ColorizeShim for &str {
        fn as_str(&self) -> &str {
            self
        }
    }
    impl ColorizeShim for String {
        fn as_str(&self) -> &str {
            self.as_str()
        }
    }
    impl ColorizeShim for Plain {
        fn as_str(&self) -> &str {
            &self.0
        }
    }
}
#[cfg(not(feature = "colors"))]
use color_shim::ColorizeShim as OwoColorize;

use crate::models::UsageBucket;
use crate::orchestrator::{MonitorState, MonitorStateJson, RefreshState};
use crate::settings::{AppSettings, MetricSettings};
use crate::utils::format_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLevel {
    Green,
    Yellow,
    Red,
}

pub fn usage_level(value: f64, thresholds: &MetricSettings) -> UsageLevel {
    if value < thresholds.yellow_threshold {
        UsageLevel::Green
    } else if value < thresholds.red_threshold {
        UsageLevel::Yellow
    } else {
        UsageLevel::Red
    }
}

/// Compact label for a menu bar / status line.
pub fn menu_bar_text(state: &MonitorState) -> String {
    match &state.state {
        RefreshState::Loading => "...".to_string(),
        RefreshState::Loaded(usage) => format!(
            "5h: {}% | 7d: {}%",
            usage.five_hour.utilization as i64,
            usage.seven_day.utilization as i64
        ),
        RefreshState::Failed(_) => "⚠️".to_string(),
    }
}

/// "45m", "3h", "1d", "7d"
pub fn format_window(hours: f64) -> String {
    if hours < 1.0 {
        format!("{}m", (hours * 60.0) as i64)
    } else if hours < 24.0 {
        format!("{}h", hours as i64)
    } else {
        format!("{}d", (hours / 24.0) as i64)
    }
}

/// Time remaining until `at`, as "2h 13m" / "3d 4h" / "now".
pub fn format_until(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mins = (at - now).num_minutes();
    if mins <= 0 {
        return "now".to_string();
    }
    let (d, h, m) = (mins / 1440, (mins % 1440) / 60, mins % 60);
    if d > 0 {
        format!("{d}d {h}h")
    } else if h > 0 {
        format!("{h}h {m}m")
    } else {
        format!("{m}m")
    }
}

fn colorize_percent(value: f64, thresholds: &MetricSettings) -> String {
    let text = format!("{}%", value as i64);
    match usage_level(value, thresholds) {
        UsageLevel::Green => text.green().to_string(),
        UsageLevel::Yellow => text.yellow().bold().to_string(),
        UsageLevel::Red => text.red().bold().to_string(),
    }
}

fn bucket_line(
    label: &str,
    bucket: &UsageBucket,
    thresholds: &MetricSettings,
    now: DateTime<Utc>,
) -> String {
    let reset = match bucket.resets_at {
        Some(at) => format!("resets in {}", format_until(at, now)),
        None => "no usage recorded".to_string(),
    };
    format!(
        "{label:<8} {}  {}",
        colorize_percent(bucket.utilization, thresholds),
        reset.dimmed()
    )
}

/// Multi-line human readable summary.
pub fn render_text(state: &MonitorState, settings: &AppSettings, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();
    match &state.state {
        RefreshState::Loading => lines.push("Loading...".dimmed().to_string()),
        RefreshState::Failed(e) => lines.push(format!("{} {}", "⚠️".red(), e)),
        RefreshState::Loaded(usage) => {
            lines.push(bucket_line("5-hour", &usage.five_hour, &settings.five_hour, now));
            lines.push(bucket_line("7-day", &usage.seven_day, &settings.seven_day, now));
            // Model-specific windows only when they carry information.
            for (label, bucket) in [
                ("Sonnet", usage.seven_day_sonnet.as_ref()),
                ("Opus", usage.seven_day_opus.as_ref()),
            ] {
                if let Some(b) = bucket.filter(|b| b.utilization > 0.0 || b.resets_at.is_some()) {
                    lines.push(bucket_line(label, b, &settings.seven_day, now));
                }
            }
            if let Some(extra) = usage.extra_usage.as_ref().filter(|e| e.is_enabled) {
                let used = extra.used_credits.unwrap_or(0.0);
                let line = match extra.monthly_limit {
                    Some(limit) => format!("Extra    {used:.2} / {limit:.2} credits"),
                    None => format!("Extra    {used:.2} credits"),
                };
                lines.push(line);
            }
        }
    }

    let history = state.token_history.as_slice();
    let window = format_window(settings.graph.time_window_hours);
    if history.is_empty() {
        lines.push(format!("Tokens ({window}): no usage data available").dimmed().to_string());
    } else {
        let input: u64 = history.iter().map(|p| p.input_tokens).sum();
        let output: u64 = history.iter().map(|p| p.output_tokens).sum();
        let peak = history.iter().map(|p| p.total_tokens()).max().unwrap_or(0);
        lines.push(format!(
            "Tokens ({window}): {} in / {} out, peak {} across {} points",
            format_tokens(input),
            format_tokens(output),
            format_tokens(peak),
            history.len()
        ));
    }

    if let Some(updated) = state.last_updated {
        let ago = (now - updated).num_seconds().max(0);
        lines.push(format!("Updated {ago}s ago").dimmed().to_string());
    }
    lines.join("\n")
}

pub fn render_json(state: &MonitorState) -> Result<String> {
    Ok(serde_json::to_string(&MonitorStateJson::from(state))?)
}
