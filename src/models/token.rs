use chrono::{DateTime, Utc};
use serde::Serialize;

/// Token counts for one time bucket (five minutes or one day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenDataPoint {
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenDataPoint {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
