use std::path::PathBuf;

use crate::logging::LogFormat;
use crate::orchestrator::DEFAULT_REFRESH_INTERVAL;

#[derive(clap::Parser, Debug)]
#[command(version, about = "Watch Claude subscription usage limits and local token history")]
pub struct Args {
    /// Force Claude data path(s), comma-separated. Defaults to ~/.claude and ~/.config/claude
    #[arg(long, env = "CLAUDE_CONFIG_DIR")]
    pub claude_config_dir: Option<String>,

    /// Settings file (thresholds, automation, graph window)
    #[arg(long, env = "CLAUDE_USAGE_MONITOR_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Seconds between scheduled refreshes
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Override the token history window from the settings file (hours)
    #[arg(long)]
    pub window_hours: Option<f64>,

    /// Run a single refresh cycle, print it and exit
    #[arg(long)]
    pub once: bool,

    /// Emit JSON instead of colored text
    #[arg(long)]
    pub json: bool,

    /// Log filter when RUST_LOG is unset (e.g. warn, info, claude_usage_monitor=debug)
    #[arg(long, env = "CLAUDE_USAGE_MONITOR_LOG", default_value = "warn")]
    pub log_level: String,

    /// Log output format: pretty|json
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}
