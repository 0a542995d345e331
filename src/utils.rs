use chrono::{DateTime, NaiveDateTime, Utc};
use std::env;
use std::path::PathBuf;

/// Resolve the Claude data directory.
///
/// An explicit override may be a comma-separated list; the first entry that
/// contains a `projects/` directory wins. Without a usable override we prefer
/// `~/.claude`, then `<xdg config>/claude`, and finally fall back to
/// `~/.claude` even if it does not exist yet.
pub fn claude_dir(override_dirs: Option<&str>) -> PathBuf {
    if let Some(list) = override_dirs {
        let list = list.trim();
        if !list.is_empty() {
            let mut first: Option<PathBuf> = None;
            for p in list.split(',') {
                let p = p.trim();
                if p.is_empty() {
                    continue;
                }
                let pb = PathBuf::from(p);
                if pb.join("projects").is_dir() {
                    return pb;
                }
                first.get_or_insert(pb);
            }
            if let Some(pb) = first {
                return pb;
            }
        }
    }
    let basedirs = directories::BaseDirs::new();
    let home = basedirs
        .as_ref()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~"));
    let xdg_config = basedirs
        .as_ref()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| home.join(".config"));
    for base in [home.join(".claude"), xdg_config.join("claude")] {
        if base.join("projects").is_dir() {
            return base;
        }
    }
    home.join(".claude")
}

/// Parse an ISO-8601 timestamp.
///
/// Strict RFC 3339 first (fractional seconds optional), then an offset-less
/// `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_tokens(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.1}B", n as f64 / 1e9)
    } else if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1e3)
    } else {
        n.to_string()
    }
}

/// Read a trimmed, non-empty environment variable.
pub fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
