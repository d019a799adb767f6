//! Verdict records
//!
//! One Verdict per command request; printed as a JSON line by the binary and
//! handed to the audit sink.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Terminal status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    /// Scored safe, no escalation
    Executed,
    /// Rejected by a rule, or the request could not be read
    Blocked,
    /// No rule matched and the score was high
    NoMatchBlocked,
    EscalatedThenExecuted,
    EscalatedThenBlocked,
    InsufficientCredits,
}

impl VerdictStatus {
    /// The command may run
    pub fn is_executed(&self) -> bool {
        matches!(
            self,
            VerdictStatus::Executed | VerdictStatus::EscalatedThenExecuted
        )
    }

    pub fn is_escalated(&self) -> bool {
        matches!(
            self,
            VerdictStatus::EscalatedThenExecuted | VerdictStatus::EscalatedThenBlocked
        )
    }
}

/// Stage that produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionLayer {
    /// Request could not be parsed
    Intake,
    Credits,
    PatternMatch,
    RiskScore,
    Judge,
}

/// Final immutable record for one request
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub status: VerdictStatus,

    pub requester: String,

    pub command: String,

    pub layer: DecisionLayer,

    /// Layer-1 rule that matched, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,

    /// Layer-2 score, if Layer 2 ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,

    pub reason: String,

    /// Credits debited: 1 on execution, 0 otherwise
    pub credits_used: u32,

    pub received_at: DateTime<Utc>,

    pub decided_at: DateTime<Utc>,

    pub elapsed_ms: u64,
}

impl Verdict {
    /// Fail-closed verdict for input that never became a request
    pub fn unreadable(reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: VerdictStatus::Blocked,
            requester: "unknown".to_string(),
            command: String::new(),
            layer: DecisionLayer::Intake,
            matched_rule: None,
            score: None,
            reason: reason.into(),
            credits_used: 0,
            received_at: now,
            decided_at: now,
            elapsed_ms: 0,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status.is_executed()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
