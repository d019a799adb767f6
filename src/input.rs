//! Command request parsing
//!
//! Requests arrive as one JSON object per line: `{"requester": "...", "command": "..."}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One command awaiting admission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Requesting principal; credits are charged here
    pub requester: String,

    /// Raw command text
    pub command: String,

    /// Arrival time; stamped on parse when absent
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl CommandRequest {
    pub fn new(requester: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            command: command.into(),
            received_at: Utc::now(),
        }
    }

    /// Parse input from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Command text shortened for logs
    pub fn summary(&self) -> String {
        summarize(&self.command)
    }
}

/// First 100 characters, with an ellipsis when cut
pub fn summarize(command: &str) -> String {
    match command.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &command[..idx]),
        None => command.to_string(),
    }
}
