//! Layer 1: first-match-wins rule evaluation

use serde::Serialize;
use std::sync::Arc;

use crate::rules::{Rule, RuleAction, RuleSnapshot};

/// Outcome of Layer 1
#[derive(Debug, Clone)]
pub enum Layer1Outcome {
    /// A reject rule matched first; the pipeline stops here
    AutoReject(Arc<Rule>),
    /// An accept rule matched first; Layer 2 still runs
    AutoAccept(Arc<Rule>),
    /// Nothing matched; Layer 2 still runs
    NoMatch,
}

impl Layer1Outcome {
    pub fn rule(&self) -> Option<&Arc<Rule>> {
        match self {
            Layer1Outcome::AutoReject(rule) | Layer1Outcome::AutoAccept(rule) => Some(rule),
            Layer1Outcome::NoMatch => None,
        }
    }

    pub fn rule_id(&self) -> Option<&str> {
        self.rule().map(|r| r.id.as_str())
    }

    pub fn kind(&self) -> Layer1Kind {
        match self {
            Layer1Outcome::AutoReject(_) => Layer1Kind::AutoReject,
            Layer1Outcome::AutoAccept(_) => Layer1Kind::AutoAccept,
            Layer1Outcome::NoMatch => Layer1Kind::NoMatch,
        }
    }
}

/// Layer-1 outcome without the rule, for records and judge input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Layer1Kind {
    AutoReject,
    AutoAccept,
    NoMatch,
}

/// Stateless matcher over a rule snapshot
pub struct PatternMatcher;

impl PatternMatcher {
    /// Evaluate `command` against the active rules of `snapshot`
    pub fn evaluate(snapshot: &RuleSnapshot, command: &str) -> Layer1Outcome {
        tracing::debug!(
            version = snapshot.version(),
            rules = snapshot.len(),
            "layer 1: evaluating"
        );

        for rule in snapshot.active() {
            tracing::trace!(rule_id = %rule.id, pattern = rule.pattern.as_str(), "layer 1: testing");
            if !rule.pattern.is_match(command) {
                continue;
            }
            tracing::info!(rule_id = %rule.id, action = %rule.action, "layer 1: match");
            return match rule.action {
                RuleAction::AutoReject => Layer1Outcome::AutoReject(Arc::clone(rule)),
                RuleAction::AutoAccept => Layer1Outcome::AutoAccept(Arc::clone(rule)),
            };
        }

        Layer1Outcome::NoMatch
    }
}
