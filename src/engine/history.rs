//! Recent verdicts per requester
//!
//! Bounded; the judge sees the newest entries first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::output::{Verdict, VerdictStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub command: String,
    pub status: VerdictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    pub decided_at: DateTime<Utc>,
}

impl From<&Verdict> for HistoryEntry {
    fn from(verdict: &Verdict) -> Self {
        Self {
            command: verdict.command.clone(),
            status: verdict.status,
            score: verdict.score,
            decided_at: verdict.decided_at,
        }
    }
}

/// Keeps one ring per requester that has reached a verdict; rings are never
/// evicted, so memory grows with the number of distinct requesters
pub struct CommandHistory {
    capacity: usize,
    entries: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, verdict: &Verdict) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let ring = entries.entry(verdict.requester.clone()).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(HistoryEntry::from(verdict));
    }

    /// Newest first
    pub fn recent(&self, requester: &str) -> Vec<HistoryEntry> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .get(requester)
            .map(|ring| ring.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}
