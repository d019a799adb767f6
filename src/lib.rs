//! cmdgate - three-layer admission control for shell commands
//!
//! Every command passes through administrator rules (Layer 1), a heuristic
//! risk score (Layer 2) and, when the first two disagree or are unsure, a
//! contextual judge (Layer 3). Rule writes are checked for overlap with the
//! existing rule set by intersecting the patterns' automata.
//!
//! # Features
//!
//! - **Rule matching**: first-match-wins over a versioned rule snapshot
//! - **Risk scoring**: configurable weight table over shell tokens
//! - **Conflict detection**: exact pattern-overlap proofs with witness commands
//! - **Credits**: reserve-then-commit, one credit per executed command
//! - **Audit logging**: JSONL log of all verdicts
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cmdgate::{CommandRequest, Config, MemoryAuditSink, Orchestrator, RuleStore, VerdictStatus};
//!
//! let config = Config::default();
//! let store = RuleStore::from_config(&config.rules).unwrap();
//! let engine = Orchestrator::from_config(&config, Arc::new(store), Arc::new(MemoryAuditSink::new())).unwrap();
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let verdict = runtime.block_on(engine.evaluate(CommandRequest::new("alice", "rm -rf /")));
//! assert_eq!(verdict.status, VerdictStatus::Blocked);
//! ```

pub mod audit;
pub mod automaton;
pub mod config;
pub mod engine;
pub mod errors;
pub mod input;
pub mod output;
pub mod parser;
pub mod rules;

// Re-exports for convenience
pub use audit::{AuditSink, JsonlAuditSink, MemoryAuditSink, NullAuditSink};
pub use config::Config;
pub use engine::credits::{CreditLedger, InMemoryLedger};
pub use engine::judge::{ContextualJudge, FailClosedJudge, JudgeDecision, JudgeRequest, ProcessJudge};
pub use engine::scorer::{RiskAssessment, RiskBand, RiskScorer};
pub use engine::Orchestrator;
pub use errors::{ConfigError, JudgeError, PatternError, RuleAdminError};
pub use input::CommandRequest;
pub use output::{DecisionLayer, Verdict, VerdictStatus};
pub use rules::{
    CompiledPattern, ConflictDetector, RuleAction, RuleConflictReport, RuleDraft, RuleSnapshot,
    RuleSource, RuleStore,
};
