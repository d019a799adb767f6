//! JSONL audit logging for cmdgate
//!
//! Records every verdict to a JSONL file for later analysis.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use crate::input::summarize;
use crate::output::{DecisionLayer, Verdict, VerdictStatus};

/// An audit log entry
#[derive(Debug, Serialize)]
pub struct AuditEntry {
    /// Timestamp of the decision
    pub timestamp: DateTime<Utc>,

    pub requester: String,

    /// Command, truncated
    pub input_summary: String,

    pub status: VerdictStatus,

    pub layer: DecisionLayer,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,

    /// Rule ID that matched (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// Reason for the decision
    pub reason: String,

    pub credits_used: u32,

    pub elapsed_ms: u64,
}

impl From<&Verdict> for AuditEntry {
    fn from(verdict: &Verdict) -> Self {
        Self {
            timestamp: verdict.decided_at,
            requester: verdict.requester.clone(),
            input_summary: summarize(&verdict.command),
            status: verdict.status,
            layer: verdict.layer,
            score: verdict.score,
            rule_id: verdict.matched_rule.clone(),
            reason: verdict.reason.clone(),
            credits_used: verdict.credits_used,
            elapsed_ms: verdict.elapsed_ms,
        }
    }
}

/// Destination for verdict records
///
/// Failures are reported to the caller, which logs them; they never change a
/// verdict.
pub trait AuditSink: Send + Sync {
    fn record(&self, verdict: &Verdict) -> io::Result<()>;
}

enum AuditMessage {
    Record(Box<Verdict>),
    Flush(oneshot::Sender<()>),
}

/// Feeds a sink from a dedicated thread
///
/// `submit` only queues, so a slow sink never holds back a verdict or an
/// async worker. Records reach the sink in submission order.
pub struct AuditWriter {
    tx: mpsc::UnboundedSender<AuditMessage>,
}

impl AuditWriter {
    pub fn spawn(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("cmdgate-audit".to_string())
            .spawn(move || {
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        AuditMessage::Record(verdict) => {
                            if let Err(e) = sink.record(&verdict) {
                                tracing::warn!(error = %e, "failed to write audit record");
                            }
                        }
                        AuditMessage::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "audit writer thread unavailable");
        }
        Self { tx }
    }

    /// Queue a verdict for the sink
    pub fn submit(&self, verdict: &Verdict) {
        if self
            .tx
            .send(AuditMessage::Record(Box::new(verdict.clone())))
            .is_err()
        {
            tracing::warn!("audit writer stopped, record dropped");
        }
    }

    /// Wait until everything queued so far has been handed to the sink
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(AuditMessage::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

/// Appends one JSON line per verdict
pub struct JsonlAuditSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    /// Open (or create) the log, creating parent directories
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, verdict: &Verdict) -> io::Result<()> {
        let json = serde_json::to_string(&AuditEntry::from(verdict))?;
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(writer, "{}", json)?;
        writer.flush()
    }
}

/// Keeps verdicts in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    verdicts: Mutex<Vec<Verdict>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdicts(&self) -> Vec<Verdict> {
        match self.verdicts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.verdicts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, verdict: &Verdict) -> io::Result<()> {
        let mut verdicts = match self.verdicts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        verdicts.push(verdict.clone());
        Ok(())
    }
}

/// Discards everything (audit logging off)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _verdict: &Verdict) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_verdict() -> Verdict {
        let mut verdict = Verdict::unreadable("Blocked by rule rule_002");
        verdict.requester = "alice".to_string();
        verdict.command = format!("rm -rf /{}", "x".repeat(200));
        verdict.layer = DecisionLayer::PatternMatch;
        verdict.matched_rule = Some("rule_002".to_string());
        verdict
    }

    #[test]
    fn test_audit_entry_from_verdict() {
        let entry = AuditEntry::from(&test_verdict());
        assert_eq!(entry.rule_id.as_deref(), Some("rule_002"));
        assert!(matches!(entry.status, VerdictStatus::Blocked));
        assert_eq!(entry.input_summary.chars().count(), 103);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/audit.jsonl");

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.record(&test_verdict()).unwrap();
        sink.record(&test_verdict()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["status"], "BLOCKED");
        assert_eq!(parsed["rule_id"], "rule_002");
        assert_eq!(parsed["layer"], "pattern_match");
    }

    #[tokio::test]
    async fn test_writer_preserves_order_and_flushes() {
        let memory = Arc::new(MemoryAuditSink::new());
        let writer = AuditWriter::spawn(memory.clone());

        for requester in ["alice", "bob", "carol"] {
            let mut verdict = test_verdict();
            verdict.requester = requester.to_string();
            writer.submit(&verdict);
        }
        writer.flush().await;

        let requesters: Vec<_> = memory.verdicts().into_iter().map(|v| v.requester).collect();
        assert_eq!(requesters, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_memory_and_null_sinks() {
        let memory = MemoryAuditSink::new();
        assert!(memory.is_empty());
        memory.record(&test_verdict()).unwrap();
        assert_eq!(memory.len(), 1);

        NullAuditSink.record(&test_verdict()).unwrap();
    }
}
