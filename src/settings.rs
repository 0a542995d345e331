//! User settings: colour thresholds, automation rule and graph window.
//!
//! The settings file is owned by whatever UI edits it; this crate only reads
//! it, once per refresh cycle, through [`SettingsSource`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSettings {
    pub yellow_threshold: f64,
    pub red_threshold: f64,
}

impl MetricSettings {
    pub const FIVE_HOUR_DEFAULT: MetricSettings = MetricSettings {
        yellow_threshold: 50.0,
        red_threshold: 80.0,
    };
    pub const SEVEN_DAY_DEFAULT: MetricSettings = MetricSettings {
        yellow_threshold: 80.0,
        red_threshold: 95.0,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomationConfig {
    pub enabled: bool,
    pub five_hour_threshold: f64,
    pub seven_day_threshold: f64,
    pub script_path: Option<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            five_hour_threshold: 80.0,
            seven_day_threshold: 50.0,
            script_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphSettings {
    pub time_window_hours: f64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            time_window_hours: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub five_hour: MetricSettings,
    pub seven_day: MetricSettings,
    pub automation: AutomationConfig,
    pub graph: GraphSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            five_hour: MetricSettings::FIVE_HOUR_DEFAULT,
            seven_day: MetricSettings::SEVEN_DAY_DEFAULT,
            automation: AutomationConfig::default(),
            graph: GraphSettings::default(),
        }
    }
}

impl AppSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse settings {}", path.display()))
    }
}

/// Per-cycle view of the settings the refresh loop needs.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> AppSettings;
}

impl SettingsSource for AppSettings {
    fn current(&self) -> AppSettings {
        self.clone()
    }
}

/// Settings re-read from disk on every cycle so external edits apply on the
/// next refresh. A missing file means defaults; an unreadable one is logged.
pub struct SettingsFile {
    path: PathBuf,
    window_override: Option<f64>,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            window_override: None,
        }
    }

    pub fn with_window_override(mut self, hours: Option<f64>) -> Self {
        self.window_override = hours;
        self
    }
}

impl SettingsSource for SettingsFile {
    fn current(&self) -> AppSettings {
        let mut settings = if self.path.exists() {
            AppSettings::load(&self.path).unwrap_or_else(|e| {
                warn!(error = %format!("{e:#}"), "invalid settings file; using defaults");
                AppSettings::default()
            })
        } else {
            AppSettings::default()
        };
        if let Some(hours) = self.window_override {
            settings.graph.time_window_hours = hours;
        }
        settings
    }
}

/// `<config dir>/claude-usage-monitor/settings.json`
pub fn default_settings_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("claude-usage-monitor")
        .join("settings.json")
}
