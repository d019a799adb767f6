//! Administrator rules for Layer 1
//!
//! A rule pairs a compiled pattern with an action. Rules are only ever built
//! from a [`CompiledPattern`], so anything that reaches the matcher has
//! already passed validation.

pub mod conflict;
pub mod defaults;
pub mod store;

pub use conflict::{ConflictDetector, ConflictKind, Overlap, RuleConflictReport};
pub use store::{RuleSnapshot, RuleSource, RuleStore, RuleWrite};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::automaton::{self, Nfa};
use crate::errors::PatternError;

/// What happens when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    /// Continue to Layer 2 with the rule recorded as the match
    AutoAccept,
    /// Block immediately
    AutoReject,
}

impl RuleAction {
    /// Parse from CLI-style text
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "accept" | "auto_accept" | "allow" => Some(RuleAction::AutoAccept),
            "reject" | "auto_reject" | "deny" => Some(RuleAction::AutoReject),
            _ => None,
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::AutoAccept => write!(f, "AUTO_ACCEPT"),
            RuleAction::AutoReject => write!(f, "AUTO_REJECT"),
        }
    }
}

struct PatternInner {
    source: String,
    regex: Regex,
    nfa: Nfa,
}

/// A pattern that compiled both for matching and for overlap analysis
#[derive(Clone)]
pub struct CompiledPattern(Arc<PatternInner>);

impl CompiledPattern {
    /// Validate and compile a rule pattern
    pub fn new(source: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&ascii_shorthands(source)).map_err(|e| PatternError::Invalid {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        let nfa = automaton::compile(source)?;
        Ok(Self(Arc::new(PatternInner {
            source: source.to_string(),
            regex,
            nfa,
        })))
    }

    pub fn as_str(&self) -> &str {
        &self.0.source
    }

    /// Unanchored search: the pattern's own anchors decide position
    pub fn is_match(&self, command: &str) -> bool {
        self.0.regex.is_match(command)
    }

    pub fn nfa(&self) -> &Nfa {
        &self.0.nfa
    }
}

/// Rewrite `\d \w \s` and their negations as ASCII POSIX classes so the
/// matcher accepts exactly what the automaton models
fn ascii_shorthands(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_class = false;
    let mut class_start = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(e) = chars.next() else {
                    out.push(c);
                    break;
                };
                let name = match e.to_ascii_lowercase() {
                    'd' => "digit",
                    'w' => "word",
                    's' => "space",
                    _ => "",
                };
                let caret = if e.is_ascii_uppercase() { "^" } else { "" };
                if name.is_empty() {
                    out.push(c);
                    out.push(e);
                } else if in_class {
                    out.push_str(&format!("[:{}{}:]", caret, name));
                } else {
                    out.push_str(&format!("[[:{}{}:]]", caret, name));
                }
                class_start = false;
                continue;
            }
            '[' if !in_class => {
                in_class = true;
                class_start = true;
                out.push(c);
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                continue;
            }
            ']' if in_class && !class_start => in_class = false,
            _ => {}
        }
        class_start = false;
        out.push(c);
    }
    out
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledPattern").field(&self.0.source).finish()
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.0.source == other.0.source
    }
}

/// An installed rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique identifier
    pub id: String,

    /// Compiled pattern
    pub pattern: CompiledPattern,

    /// Action on match
    pub action: RuleAction,

    /// Evaluation order, lower first
    pub priority: i64,

    /// Human-readable description
    pub description: String,

    /// Inactive rules are neither matched nor conflict-checked
    pub active: bool,

    /// When the rule was first created
    pub created_at: DateTime<Utc>,

    /// Insertion sequence, breaks priority ties
    pub(crate) seq: u64,
}

impl Rule {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Input to the rule-authoring path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    /// Explicit identifier; generated when absent
    #[serde(default)]
    pub id: Option<String>,

    pub pattern: String,

    pub action: RuleAction,

    #[serde(default)]
    pub description: String,

    /// Explicit priority; appended after the current maximum when absent
    #[serde(default)]
    pub priority: Option<i64>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RuleDraft {
    pub fn new(pattern: impl Into<String>, action: RuleAction) -> Self {
        Self {
            id: None,
            pattern: pattern.into(),
            action,
            description: String::new(),
            priority: None,
            active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Serializable view of a rule, for listings
#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub id: String,
    pub pattern: String,
    pub action: RuleAction,
    pub priority: i64,
    pub description: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Rule> for RuleView {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id.clone(),
            pattern: rule.pattern.as_str().to_string(),
            action: rule.action,
            priority: rule.priority,
            description: rule.description.clone(),
            active: rule.active,
            created_at: rule.created_at,
        }
    }
}
