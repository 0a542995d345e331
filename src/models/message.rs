use serde::Deserialize;

/// Token counts on an assistant message. Cache counters are not part of the
/// history series and are left undecoded.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct MessageUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Deserialize, Debug)]
pub struct TranscriptMessage {
    #[serde(default)]
    pub usage: Option<MessageUsage>,
}

/// One line of a session transcript (`projects/**/*.jsonl`). Only the fields
/// the history scan looks at; everything else is ignored.
#[derive(Deserialize, Debug)]
pub struct TranscriptLine {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<String>,
    pub message: Option<TranscriptMessage>,
}
