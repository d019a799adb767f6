//! Versioned rule storage
//!
//! Readers take an `Arc` of the current snapshot and keep it for the whole
//! pipeline run; writers build a new snapshot and swap it in. Writes are
//! serialized by a mutex held across validate, conflict-check and publish, so
//! two concurrent writes can never both pass their checks against a view
//! that lacks the other.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::config::RulesConfig;
use crate::errors::RuleAdminError;
use crate::rules::{
    CompiledPattern, ConflictDetector, Rule, RuleConflictReport, RuleDraft,
};

/// An immutable, versioned view of the rule set
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    version: u64,
    rules: Vec<Arc<Rule>>,
}

impl RuleSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All rules, in evaluation order (priority, then insertion)
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Active rules, in evaluation order
    pub fn active(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter().filter(|r| r.active)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Rule>> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn next(&self, mut rules: Vec<Arc<Rule>>) -> Self {
        rules.sort_by_key(|r| (r.priority, r.seq));
        Self {
            version: self.version + 1,
            rules,
        }
    }
}

/// Source of the rule set seen by Layer 1
pub trait RuleSource: Send + Sync {
    fn current_rules(&self) -> Arc<RuleSnapshot>;
}

/// A successful write, with any soft overlaps it was admitted with
#[derive(Debug, Clone)]
pub struct RuleWrite {
    pub rule: Arc<Rule>,
    pub report: RuleConflictReport,
    pub version: u64,
}

#[derive(Debug, Default)]
struct WriterState {
    next_seq: u64,
    next_id: u64,
}

/// Rule store with copy-on-write snapshots
pub struct RuleStore {
    current: RwLock<Arc<RuleSnapshot>>,
    writer: Mutex<WriterState>,
    detector: ConflictDetector,
    block_soft_conflicts: bool,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(ConflictDetector::default(), false)
    }
}

impl RuleStore {
    pub fn new(detector: ConflictDetector, block_soft_conflicts: bool) -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSnapshot::default())),
            writer: Mutex::new(WriterState::default()),
            detector,
            block_soft_conflicts,
        }
    }

    /// Build a store by creating each draft in order
    pub fn with_rules(
        detector: ConflictDetector,
        block_soft_conflicts: bool,
        drafts: impl IntoIterator<Item = RuleDraft>,
    ) -> Result<Self, RuleAdminError> {
        let store = Self::new(detector, block_soft_conflicts);
        for draft in drafts {
            store.create(draft)?;
        }
        Ok(store)
    }

    /// Store seeded from the `[rules]` config section
    pub fn from_config(config: &RulesConfig) -> Result<Self, RuleAdminError> {
        Self::with_rules(
            config.detector(),
            config.block_soft_conflicts,
            config.seed_drafts(),
        )
    }

    /// Point-in-time view for one pipeline run
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Check a candidate without writing anything
    pub fn check(&self, draft: &RuleDraft) -> Result<RuleConflictReport, RuleAdminError> {
        let pattern = CompiledPattern::new(&draft.pattern)?;
        let snapshot = self.snapshot();
        Ok(self
            .detector
            .check(&pattern, draft.action, snapshot.rules(), draft.id.as_deref())?)
    }

    /// Create a rule
    pub fn create(&self, draft: RuleDraft) -> Result<RuleWrite, RuleAdminError> {
        let mut writer = self.lock_writer();
        let snapshot = self.snapshot();
        self.insert_locked(&mut writer, &snapshot, draft)
    }

    /// Create a rule only if the store is still at `expected_version`
    pub fn create_if_version(
        &self,
        expected_version: u64,
        draft: RuleDraft,
    ) -> Result<RuleWrite, RuleAdminError> {
        let mut writer = self.lock_writer();
        let snapshot = self.snapshot();
        if snapshot.version != expected_version {
            return Err(RuleAdminError::StaleVersion {
                expected: expected_version,
                actual: snapshot.version,
            });
        }
        self.insert_locked(&mut writer, &snapshot, draft)
    }

    /// Replace the pattern/action/description/priority of an existing rule
    pub fn update(&self, id: &str, draft: RuleDraft) -> Result<RuleWrite, RuleAdminError> {
        let _writer = self.lock_writer();
        self.update_locked(id, draft)
    }

    fn update_locked(&self, id: &str, draft: RuleDraft) -> Result<RuleWrite, RuleAdminError> {
        let snapshot = self.snapshot();
        let existing = snapshot
            .get(id)
            .ok_or_else(|| RuleAdminError::NotFound(id.to_string()))?;

        let pattern = CompiledPattern::new(&draft.pattern)?;
        let report = if draft.active {
            self.detector
                .check(&pattern, draft.action, snapshot.rules(), Some(id))?
        } else {
            RuleConflictReport::clear(&draft.pattern, draft.action, Some(id))
        };
        self.enforce(&report)?;

        let rule = Arc::new(Rule {
            id: existing.id.clone(),
            pattern,
            action: draft.action,
            priority: draft.priority.unwrap_or(existing.priority),
            description: draft.description,
            active: draft.active,
            created_at: existing.created_at,
            seq: existing.seq,
        });

        let rules = snapshot
            .rules
            .iter()
            .map(|r| if r.id == id { Arc::clone(&rule) } else { Arc::clone(r) })
            .collect();
        let version = self.publish(snapshot.next(rules));
        tracing::info!(rule_id = %id, version, "rule updated");

        Ok(RuleWrite {
            rule,
            report,
            version,
        })
    }

    /// Remove a rule
    pub fn delete(&self, id: &str) -> Result<u64, RuleAdminError> {
        let _writer = self.lock_writer();
        let snapshot = self.snapshot();
        if snapshot.get(id).is_none() {
            return Err(RuleAdminError::NotFound(id.to_string()));
        }

        let rules = snapshot
            .rules
            .iter()
            .filter(|r| r.id != id)
            .cloned()
            .collect();
        let version = self.publish(snapshot.next(rules));
        tracing::info!(rule_id = %id, version, "rule deleted");
        Ok(version)
    }

    /// Activate or deactivate a rule; activation re-runs the conflict check
    pub fn set_active(&self, id: &str, active: bool) -> Result<RuleWrite, RuleAdminError> {
        let _writer = self.lock_writer();
        let existing = self
            .snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| RuleAdminError::NotFound(id.to_string()))?;

        let draft = RuleDraft {
            id: Some(existing.id.clone()),
            pattern: existing.pattern.as_str().to_string(),
            action: existing.action,
            description: existing.description.clone(),
            priority: Some(existing.priority),
            active,
        };
        self.update_locked(id, draft)
    }

    fn insert_locked(
        &self,
        writer: &mut WriterState,
        snapshot: &RuleSnapshot,
        draft: RuleDraft,
    ) -> Result<RuleWrite, RuleAdminError> {
        let pattern = CompiledPattern::new(&draft.pattern)?;

        let id = match draft.id {
            Some(id) if snapshot.get(&id).is_some() => {
                return Err(RuleAdminError::DuplicateId(id));
            }
            Some(id) => id,
            None => loop {
                writer.next_id += 1;
                let candidate = format!("rule_{:03}", writer.next_id);
                if snapshot.get(&candidate).is_none() {
                    break candidate;
                }
            },
        };

        let report = if draft.active {
            self.detector
                .check(&pattern, draft.action, snapshot.rules(), None)?
        } else {
            RuleConflictReport::clear(&draft.pattern, draft.action, None)
        };
        self.enforce(&report)?;

        let priority = draft.priority.unwrap_or_else(|| {
            snapshot
                .rules
                .iter()
                .map(|r| r.priority)
                .max()
                .map_or(1, |max| max.saturating_add(1))
        });

        let rule = Arc::new(Rule {
            id,
            pattern,
            action: draft.action,
            priority,
            description: draft.description,
            active: draft.active,
            created_at: Utc::now(),
            seq: writer.next_seq,
        });
        writer.next_seq += 1;

        let mut rules = snapshot.rules.clone();
        rules.push(Arc::clone(&rule));
        let version = self.publish(snapshot.next(rules));
        tracing::info!(rule_id = %rule.id, version, soft_overlaps = report.soft().count(), "rule created");

        Ok(RuleWrite {
            rule,
            report,
            version,
        })
    }

    fn enforce(&self, report: &RuleConflictReport) -> Result<(), RuleAdminError> {
        if report.has_hard() {
            tracing::warn!(pattern = %report.pattern, "rule write rejected: {}", report);
            return Err(RuleAdminError::HardConflict(report.clone()));
        }
        if self.block_soft_conflicts && !report.is_clear() {
            tracing::warn!(pattern = %report.pattern, "rule write rejected: {}", report);
            return Err(RuleAdminError::SoftConflict(report.clone()));
        }
        Ok(())
    }

    fn publish(&self, snapshot: RuleSnapshot) -> u64 {
        let version = snapshot.version;
        let next = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        version
    }

    fn lock_writer(&self) -> MutexGuard<'_, WriterState> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RuleSource for RuleStore {
    fn current_rules(&self) -> Arc<RuleSnapshot> {
        self.snapshot()
    }
}
