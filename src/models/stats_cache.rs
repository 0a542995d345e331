//! Shape of `~/.claude/stats-cache.json`, the daily rollup Claude Code keeps.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatsCacheFile {
    #[allow(dead_code)]
    pub version: Option<u32>,
    #[allow(dead_code)]
    pub last_computed_date: Option<String>,
    pub daily_model_tokens: Option<Vec<DailyModelTokens>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DailyModelTokens {
    /// Calendar day, `YYYY-MM-DD`, in the writer's local time.
    pub date: String,
    #[serde(default)]
    pub tokens_by_model: HashMap<String, u64>,
}
