//! Authoring-time overlap detection between rule patterns
//!
//! Runs on every rule write, never on the command path. For each active rule
//! the candidate's automaton is intersected with the rule's; a non-empty
//! intersection is an overlap, and an overlap between rules with opposite
//! actions is a hard conflict.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::automaton::{intersect, Intersection};
use crate::errors::PatternError;
use crate::rules::{CompiledPattern, Rule, RuleAction};

/// Default product-node budget per pairwise check
pub const DEFAULT_MAX_PRODUCT_STATES: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// Actions disagree on a shared command; blocks the write
    Hard,
    /// Same action, overlapping patterns; reported only
    Soft,
}

/// One existing rule the candidate overlaps with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overlap {
    pub rule_id: String,
    pub rule_pattern: String,
    pub rule_action: RuleAction,
    pub kind: ConflictKind,
    /// A command both patterns match
    pub witness: String,
}

/// Result of checking a candidate pattern against the active rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleConflictReport {
    /// Rule being edited, if this is an update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    pub pattern: String,
    pub action: RuleAction,
    pub overlaps: Vec<Overlap>,
}

impl RuleConflictReport {
    pub fn clear(pattern: &str, action: RuleAction, candidate_id: Option<&str>) -> Self {
        Self {
            candidate_id: candidate_id.map(String::from),
            pattern: pattern.to_string(),
            action,
            overlaps: Vec::new(),
        }
    }

    pub fn is_clear(&self) -> bool {
        self.overlaps.is_empty()
    }

    pub fn has_hard(&self) -> bool {
        self.first_hard().is_some()
    }

    pub fn first_hard(&self) -> Option<&Overlap> {
        self.overlaps.iter().find(|o| o.kind == ConflictKind::Hard)
    }

    pub fn soft(&self) -> impl Iterator<Item = &Overlap> {
        self.overlaps.iter().filter(|o| o.kind == ConflictKind::Soft)
    }
}

impl fmt::Display for RuleConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let overlap = self.first_hard().or_else(|| self.overlaps.first());
        match overlap {
            None => write!(f, "no overlap for '{}'", self.pattern),
            Some(o) => write!(
                f,
                "'{}' ({}) overlaps rule {} ('{}', {}); both would match the command '{}'",
                self.pattern, self.action, o.rule_id, o.rule_pattern, o.rule_action, o.witness
            ),
        }
    }
}

/// Pairwise automaton-intersection checker
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    max_product_states: usize,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PRODUCT_STATES)
    }
}

impl ConflictDetector {
    pub fn new(max_product_states: usize) -> Self {
        Self { max_product_states }
    }

    /// Check `candidate` against every active rule in `existing`, skipping
    /// the rule with id `exclude` (the rule being edited)
    ///
    /// Rules are visited in the order given, so the report is deterministic
    /// for a given snapshot.
    pub fn check(
        &self,
        candidate: &CompiledPattern,
        action: RuleAction,
        existing: &[Arc<Rule>],
        exclude: Option<&str>,
    ) -> Result<RuleConflictReport, PatternError> {
        let mut report = RuleConflictReport::clear(candidate.as_str(), action, exclude);

        for rule in existing {
            if !rule.active || Some(rule.id.as_str()) == exclude {
                continue;
            }

            match intersect(candidate.nfa(), rule.pattern.nfa(), self.max_product_states) {
                Intersection::Empty => {
                    tracing::debug!(rule_id = %rule.id, "no overlap");
                }
                Intersection::NonEmpty { witness } => {
                    let kind = if rule.action == action {
                        ConflictKind::Soft
                    } else {
                        ConflictKind::Hard
                    };
                    tracing::debug!(rule_id = %rule.id, ?kind, %witness, "overlap found");
                    report.overlaps.push(Overlap {
                        rule_id: rule.id.clone(),
                        rule_pattern: rule.pattern.as_str().to_string(),
                        rule_action: rule.action,
                        kind,
                        witness,
                    });
                }
                Intersection::BudgetExceeded { explored } => {
                    return Err(PatternError::TooComplex {
                        pattern: candidate.as_str().to_string(),
                        reason: format!(
                            "overlap check against rule {} gave up after {} product states",
                            rule.id, explored
                        ),
                    });
                }
            }
        }

        Ok(report)
    }
}
