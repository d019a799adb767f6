//! Rules installed when no seed set is configured

use crate::rules::{RuleAction, RuleDraft};

/// A built-in rule definition
#[derive(Debug, Clone, Copy)]
pub struct SeedRule {
    pub id: &'static str,
    pub pattern: &'static str,
    pub action: RuleAction,
    pub description: &'static str,
}

impl SeedRule {
    pub const fn new(
        id: &'static str,
        pattern: &'static str,
        action: RuleAction,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            pattern,
            action,
            description,
        }
    }
}

/// Ordered default rule set; priority follows position
pub const DEFAULT_RULES: &[SeedRule] = &[
    SeedRule::new(
        "rule_001",
        r"^git (pull|fetch|status)",
        RuleAction::AutoAccept,
        "Safe git read operations",
    ),
    SeedRule::new(
        "rule_002",
        r"^rm -rf",
        RuleAction::AutoReject,
        "Dangerous file deletion",
    ),
    SeedRule::new(
        "rule_003",
        r"^sudo",
        RuleAction::AutoReject,
        "Elevated privileges",
    ),
    SeedRule::new(
        "rule_004",
        r"^ls|^pwd|^echo",
        RuleAction::AutoAccept,
        "Basic shell commands",
    ),
];

/// Default rules as drafts for the rule store
pub fn default_drafts() -> Vec<RuleDraft> {
    DEFAULT_RULES
        .iter()
        .enumerate()
        .map(|(i, seed)| {
            RuleDraft::new(seed.pattern, seed.action)
                .with_id(seed.id)
                .with_description(seed.description)
                .with_priority(i as i64 + 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::CompiledPattern;

    #[test]
    fn test_all_patterns_compile() {
        for seed in DEFAULT_RULES {
            let result = CompiledPattern::new(seed.pattern);
            assert!(result.is_ok(), "Rule {} has invalid pattern: {}", seed.id, seed.pattern);
        }
    }

    #[test]
    fn test_git_read_matches() {
        let p = CompiledPattern::new(DEFAULT_RULES[0].pattern).unwrap();
        assert!(p.is_match("git pull origin main"));
        assert!(p.is_match("git status"));
        assert!(!p.is_match("git push"));
    }

    #[test]
    fn test_default_drafts_are_ordered() {
        let drafts = default_drafts();
        assert_eq!(drafts.len(), DEFAULT_RULES.len());
        assert_eq!(drafts[0].priority, Some(1));
        assert_eq!(drafts[3].id.as_deref(), Some("rule_004"));
    }
}
