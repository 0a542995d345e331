use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One quota window as reported by the OAuth usage endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBucket {
    /// Percentage of the window consumed; exceeds 100 when over quota.
    pub utilization: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso8601_opt"
    )]
    pub resets_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraUsage {
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_credits: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

/// A single, immutable usage reading. `five_hour` and `seven_day` are required
/// by the decoder; everything else is present only if the response carried it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub five_hour: UsageBucket,
    pub seven_day: UsageBucket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_day_opus: Option<UsageBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_day_sonnet: Option<UsageBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_usage: Option<ExtraUsage>,
}

/// `resets_at` codec: RFC 3339 with optional fractional seconds on the way in
/// (falling back to an offset-less timestamp read as UTC), RFC 3339 with
/// the source precision on the way out.
mod iso8601_opt {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => crate::utils::parse_iso8601(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("cannot decode date: {s}"))),
            None => Ok(None),
        }
    }
}
