//! # History Module
//!
//! Builds the token-usage time series shown under the usage gauges.
//!
//! Two sources, picked by window size:
//!
//! - windows up to 24 hours scan the per-session transcripts under
//!   `projects/**/*.jsonl` and sum assistant usage into 5-minute buckets;
//! - longer windows read the daily rollup in `stats-cache.json`, which only
//!   has per-model totals, so the input/output split is estimated.
//!
//! Nothing here returns an error: unreadable files and malformed lines are
//! skipped and the caller gets whatever could be recovered.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::models::{StatsCacheFile, TokenDataPoint, TranscriptLine};
use crate::utils::parse_iso8601;

/// Windows at or below this size use transcript-level granularity.
pub const FINE_GRAINED_MAX_HOURS: f64 = 24.0;
/// Width of a transcript time bucket.
pub const BUCKET_SECONDS: i64 = 5 * 60;

/// How daily totals are divided between input and output tokens when the
/// source only records a combined count. A rough estimate, not measured data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitEstimate {
    pub input_share: f64,
}

impl SplitEstimate {
    pub const DAILY_ROLLUP: SplitEstimate = SplitEstimate { input_share: 0.4 };

    /// Returns `(input, output)`; the output side takes the rounding remainder.
    pub fn split(&self, total: u64) -> (u64, u64) {
        let input = (total as f64 * self.input_share).floor() as u64;
        (input, total - input)
    }
}

pub struct LogAggregator {
    projects_dir: PathBuf,
    stats_cache_path: PathBuf,
}

impl LogAggregator {
    pub fn new(claude_dir: &Path) -> Self {
        Self {
            projects_dir: claude_dir.join("projects"),
            stats_cache_path: claude_dir.join("stats-cache.json"),
        }
    }

    pub fn fetch_history(&self, window_hours: f64) -> Vec<TokenDataPoint> {
        self.fetch_history_at(window_hours, Utc::now())
    }

    pub fn fetch_history_at(&self, window_hours: f64, now: DateTime<Utc>) -> Vec<TokenDataPoint> {
        let cutoff = window_cutoff(window_hours, now);
        let points = if window_hours <= FINE_GRAINED_MAX_HOURS {
            self.from_transcripts(cutoff)
        } else {
            self.from_stats_cache(cutoff)
        };
        debug!(window_hours, points = points.len(), "token history refreshed");
        points
    }

    fn from_transcripts(&self, cutoff: DateTime<Utc>) -> Vec<TokenDataPoint> {
        if !self.projects_dir.is_dir() {
            return Vec::new();
        }

        let mut buckets: BTreeMap<i64, (u64, u64)> = BTreeMap::new();
        let walker = WalkDir::new(&self.projects_dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
        for entry in walker.flatten() {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("jsonl")
            {
                continue;
            }

            // A file untouched since before the cutoff cannot hold newer records.
            if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                let mtime: DateTime<Utc> = modified.into();
                if mtime < cutoff {
                    continue;
                }
            }

            accumulate_transcript(path, cutoff, &mut buckets);
        }

        buckets
            .into_iter()
            .filter_map(|(start_secs, (input, output))| {
                DateTime::<Utc>::from_timestamp(start_secs, 0).map(|timestamp| TokenDataPoint {
                    timestamp,
                    input_tokens: input,
                    output_tokens: output,
                })
            })
            .collect()
    }

    fn from_stats_cache(&self, cutoff: DateTime<Utc>) -> Vec<TokenDataPoint> {
        let stats: StatsCacheFile = match fs::read_to_string(&self.stats_cache_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
        {
            Some(s) => s,
            None => {
                debug!(path = %self.stats_cache_path.display(), "stats cache unavailable");
                return Vec::new();
            }
        };

        let mut points: Vec<TokenDataPoint> = stats
            .daily_model_tokens
            .unwrap_or_default()
            .into_iter()
            .filter_map(|day| {
                let timestamp = local_day_start(&day.date)?;
                if timestamp < cutoff {
                    return None;
                }
                let total: u64 = day.tokens_by_model.values().sum();
                let (input_tokens, output_tokens) = SplitEstimate::DAILY_ROLLUP.split(total);
                Some(TokenDataPoint {
                    timestamp,
                    input_tokens,
                    output_tokens,
                })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        points
    }
}

/// Earliest timestamp inside a window of `window_hours` ending at `now`.
///
/// NaN and negative windows are empty. Windows reaching past the
/// representable range start at the beginning of time.
pub fn window_cutoff(window_hours: f64, now: DateTime<Utc>) -> DateTime<Utc> {
    if window_hours.is_nan() || window_hours <= 0.0 {
        return now;
    }
    let window_ms = window_hours * 3_600_000.0;
    if !window_ms.is_finite() || window_ms >= i64::MAX as f64 {
        return DateTime::<Utc>::MIN_UTC;
    }
    Duration::try_milliseconds(window_ms as i64)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Start of the bucket containing `ts`, in epoch seconds.
pub fn bucket_start(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(BUCKET_SECONDS) * BUCKET_SECONDS
}

/// Local midnight of a `YYYY-MM-DD` day, as UTC.
pub fn local_day_start(date: &str) -> Option<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    Local
        .from_local_datetime(&day.and_hms_opt(0, 0, 0)?)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn accumulate_transcript(
    path: &Path,
    cutoff: DateTime<Utc>,
    buckets: &mut BTreeMap<i64, (u64, u64)>,
) {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unreadable transcript");
            return;
        }
    };
    let reader = BufReader::new(file);
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        let parsed: TranscriptLine = match serde_json::from_str(t) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if parsed.kind.as_deref() != Some("assistant") {
            continue;
        }
        let Some(usage) = parsed.message.and_then(|m| m.usage) else {
            continue;
        };
        let Some(ts) = parsed.timestamp.as_deref().and_then(parse_iso8601) else {
            continue;
        };
        if ts < cutoff {
            continue;
        }
        let input = usage.input_tokens.unwrap_or(0);
        let output = usage.output_tokens.unwrap_or(0);
        if input + output == 0 {
            continue;
        }
        let slot = buckets.entry(bucket_start(ts)).or_insert((0, 0));
        slot.0 += input;
        slot.1 += output;
    }
}
