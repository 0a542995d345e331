pub mod message;
pub mod stats_cache;
pub mod token;
pub mod usage;

pub use message::{MessageUsage, TranscriptLine};
pub use stats_cache::{DailyModelTokens, StatsCacheFile};
pub use token::TokenDataPoint;
pub use usage::{ExtraUsage, UsageBucket, UsageSnapshot};
