//! Shared fixtures: stub judges and a wired-up engine

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cmdgate::engine::credits::InMemoryLedger;
use cmdgate::{
    ContextualJudge, JudgeDecision, JudgeError, JudgeRequest, MemoryAuditSink, Orchestrator,
    RuleAction, RuleDraft, RuleStore,
};

/// Returns a fixed decision and remembers what it was asked
pub struct StubJudge {
    decision: JudgeDecision,
    calls: AtomicUsize,
    requests: Mutex<Vec<JudgeRequest>>,
}

impl StubJudge {
    pub fn executing() -> Arc<Self> {
        Arc::new(Self::new(JudgeDecision::execute("looks fine")))
    }

    pub fn blocking() -> Arc<Self> {
        Arc::new(Self::new(JudgeDecision::block("too dangerous")))
    }

    fn new(decision: JudgeDecision) -> Self {
        Self {
            decision,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<JudgeRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ContextualJudge for StubJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeDecision, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.decision.clone())
    }
}

/// Approves, but only after `delay`
pub struct SlowJudge {
    pub delay: Duration,
}

#[async_trait]
impl ContextualJudge for SlowJudge {
    async fn judge(&self, _request: &JudgeRequest) -> Result<JudgeDecision, JudgeError> {
        tokio::time::sleep(self.delay).await;
        Ok(JudgeDecision::execute("approved late"))
    }
}

/// Always errors
pub struct BrokenJudge;

#[async_trait]
impl ContextualJudge for BrokenJudge {
    async fn judge(&self, _request: &JudgeRequest) -> Result<JudgeDecision, JudgeError> {
        Err(JudgeError::Unavailable("connection refused".to_string()))
    }
}

pub struct Harness {
    pub engine: Orchestrator,
    pub store: Arc<RuleStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub audit: Arc<MemoryAuditSink>,
}

/// Engine over `rules` with `credits` per requester
pub fn harness(
    rules: &[(&str, RuleAction)],
    credits: u64,
    judge: Arc<dyn ContextualJudge>,
) -> Harness {
    let store = Arc::new(RuleStore::default());
    for (pattern, action) in rules {
        store.create(RuleDraft::new(*pattern, *action)).unwrap();
    }
    let ledger = Arc::new(InMemoryLedger::new(credits));
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = Orchestrator::new(store.clone(), ledger.clone(), audit.clone(), judge);
    Harness {
        engine,
        store,
        ledger,
        audit,
    }
}
