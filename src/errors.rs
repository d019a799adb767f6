//! Error types for cmdgate
//!
//! One enum per concern, `thiserror` only. Layer-3 failures never escape the
//! orchestrator; they are resolved fail-closed and logged.

use crate::rules::conflict::RuleConflictReport;

/// A rule pattern that cannot be admitted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("invalid pattern '{pattern}': {message}")]
    Invalid { pattern: String, message: String },

    #[error("invalid pattern '{pattern}' at offset {offset}: {message}")]
    Syntax {
        pattern: String,
        offset: usize,
        message: String,
    },

    #[error("unsupported construct in pattern '{pattern}': {feature}")]
    Unsupported { pattern: String, feature: String },

    #[error("pattern '{pattern}' is too complex to verify: {reason}")]
    TooComplex { pattern: String, reason: String },
}

impl PatternError {
    /// The offending pattern text
    pub fn pattern(&self) -> &str {
        match self {
            PatternError::Invalid { pattern, .. }
            | PatternError::Syntax { pattern, .. }
            | PatternError::Unsupported { pattern, .. }
            | PatternError::TooComplex { pattern, .. } => pattern,
        }
    }
}

/// Rejections on the rule-authoring path
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleAdminError {
    #[error(transparent)]
    Validation(#[from] PatternError),

    #[error("rule conflicts with an existing rule of the opposite action: {0}")]
    HardConflict(RuleConflictReport),

    #[error("rule overlaps an existing rule and soft overlaps are blocked: {0}")]
    SoftConflict(RuleConflictReport),

    #[error("rule not found: {0}")]
    NotFound(String),

    #[error("rule id already exists: {0}")]
    DuplicateId(String),

    #[error("rule set changed (expected version {expected}, found {actual})")]
    StaleVersion { expected: u64, actual: u64 },
}

/// Layer-3 failures
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("judge unavailable: {0}")]
    Unavailable(String),

    #[error("judge returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("judge I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
