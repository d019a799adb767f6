//! Admission pipeline for cmdgate
//!
//! Drives one command through credits, Layer 1 (rules), Layer 2 (risk score)
//! and, when needed, Layer 3 (judge), then settles credits and records the
//! verdict.

pub mod credits;
pub mod history;
pub mod judge;
pub mod matcher;
pub mod scorer;

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{AuditSink, AuditWriter};
use crate::config::Config;
use crate::errors::JudgeError;
use crate::input::CommandRequest;
use crate::output::{DecisionLayer, Verdict, VerdictStatus};
use crate::rules::RuleSource;

use credits::{CreditLedger, CreditReservation, InMemoryLedger};
use history::{CommandHistory, HistoryEntry};
use judge::{ContextualJudge, FailClosedJudge, JudgeDecision, JudgeRequest, ProcessJudge};
use matcher::{Layer1Outcome, PatternMatcher};
use scorer::{RiskAssessment, RiskBand, RiskScorer};

pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_HISTORY_SIZE: usize = 20;

/// Pipeline position of one request
enum Stage {
    Received,
    Layer1Done(Layer1Outcome),
    Layer2Done(Layer1Outcome, RiskAssessment),
    /// The bool marks a Layer-1 accept overruled by a high score
    Escalate(Layer1Outcome, RiskAssessment, bool),
    Terminal(Outcome),
}

/// Verdict fields decided by the pipeline
struct Outcome {
    status: VerdictStatus,
    layer: DecisionLayer,
    matched_rule: Option<String>,
    score: Option<u32>,
    reason: String,
}

impl Outcome {
    fn new(status: VerdictStatus, layer: DecisionLayer, reason: impl Into<String>) -> Self {
        Self {
            status,
            layer,
            matched_rule: None,
            score: None,
            reason: reason.into(),
        }
    }

    fn scored(
        status: VerdictStatus,
        layer: DecisionLayer,
        layer1: &Layer1Outcome,
        assessment: &RiskAssessment,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status,
            layer,
            matched_rule: layer1.rule_id().map(String::from),
            score: Some(assessment.score),
            reason: reason.into(),
        }
    }
}

/// The admission engine
pub struct Orchestrator {
    rules: Arc<dyn RuleSource>,
    ledger: Arc<dyn CreditLedger>,
    audit: AuditWriter,
    judge: Arc<dyn ContextualJudge>,
    scorer: RiskScorer,
    judge_timeout: Duration,
    history: CommandHistory,
}

impl Orchestrator {
    pub fn new(
        rules: Arc<dyn RuleSource>,
        ledger: Arc<dyn CreditLedger>,
        audit: Arc<dyn AuditSink>,
        judge: Arc<dyn ContextualJudge>,
    ) -> Self {
        Self {
            rules,
            ledger,
            audit: AuditWriter::spawn(audit),
            judge,
            scorer: RiskScorer::default(),
            judge_timeout: DEFAULT_JUDGE_TIMEOUT,
            history: CommandHistory::new(DEFAULT_HISTORY_SIZE),
        }
    }

    /// Wire collaborators from configuration
    pub fn from_config(
        config: &Config,
        rules: Arc<dyn RuleSource>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, JudgeError> {
        let ledger = Arc::new(InMemoryLedger::with_balances(
            config.credits.default_balance,
            &config.credits.balances,
        ));
        let judge: Arc<dyn ContextualJudge> = match &config.judge.command {
            Some(argv) => Arc::new(ProcessJudge::new(argv.clone())?),
            None => Arc::new(FailClosedJudge),
        };

        Ok(Self::new(rules, ledger, audit, judge)
            .with_scorer(RiskScorer::new(config.scoring.clone()))
            .with_judge_timeout(Duration::from_millis(config.judge.timeout_ms))
            .with_history_size(config.general.history_size))
    }

    pub fn with_scorer(mut self, scorer: RiskScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history = CommandHistory::new(size);
        self
    }

    pub fn ledger(&self) -> &Arc<dyn CreditLedger> {
        &self.ledger
    }

    /// Queue a verdict produced outside the pipeline for auditing
    pub fn audit(&self, verdict: &Verdict) {
        self.audit.submit(verdict);
    }

    /// Wait for queued audit records to reach the sink
    pub async fn flush_audit(&self) {
        self.audit.flush().await;
    }

    /// Recent verdicts for `requester`, newest first
    pub fn history(&self, requester: &str) -> Vec<HistoryEntry> {
        self.history.recent(requester)
    }

    /// Run one request to a verdict
    ///
    /// Never fails: every path ends in a Verdict, which is recorded in the
    /// history and queued for the audit sink before it is returned.
    pub async fn evaluate(&self, request: CommandRequest) -> Verdict {
        let started = Instant::now();
        let mut reservation = None;
        let mut stage = Stage::Received;

        let outcome = loop {
            stage = match stage {
                Stage::Received => {
                    match CreditReservation::acquire(Arc::clone(&self.ledger), &request.requester) {
                        None => Stage::Terminal(Outcome::new(
                            VerdictStatus::InsufficientCredits,
                            DecisionLayer::Credits,
                            "insufficient credits",
                        )),
                        Some(credit) => {
                            reservation = Some(credit);
                            let snapshot = self.rules.current_rules();
                            Stage::Layer1Done(PatternMatcher::evaluate(&snapshot, &request.command))
                        }
                    }
                }
                Stage::Layer1Done(Layer1Outcome::AutoReject(rule)) => {
                    let mut outcome = Outcome::new(
                        VerdictStatus::Blocked,
                        DecisionLayer::PatternMatch,
                        format!("Blocked by rule {}: {}", rule.id, rule.description),
                    );
                    outcome.matched_rule = Some(rule.id.clone());
                    Stage::Terminal(outcome)
                }
                Stage::Layer1Done(layer1) => {
                    let assessment = self.scorer.score(&request.command);
                    tracing::info!(score = assessment.score, band = ?assessment.band, "layer 2 done");
                    Stage::Layer2Done(layer1, assessment)
                }
                Stage::Layer2Done(layer1, assessment) => self.after_scoring(layer1, assessment),
                Stage::Escalate(layer1, assessment, runtime_conflict) => Stage::Terminal(
                    self.escalate(&request, layer1, assessment, runtime_conflict)
                        .await,
                ),
                Stage::Terminal(outcome) => break outcome,
            };
        };

        let executed = outcome.status.is_executed();
        if let Some(credit) = reservation {
            if executed {
                credit.commit();
            } else {
                credit.release();
            }
        }

        let decided_at = Utc::now();
        let verdict = Verdict {
            status: outcome.status,
            requester: request.requester,
            command: request.command,
            layer: outcome.layer,
            matched_rule: outcome.matched_rule,
            score: outcome.score,
            reason: outcome.reason,
            credits_used: u32::from(executed),
            received_at: request.received_at,
            decided_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            requester = %verdict.requester,
            status = ?verdict.status,
            layer = ?verdict.layer,
            "verdict"
        );
        self.history.record(&verdict);
        self.audit.submit(&verdict);
        verdict
    }

    fn after_scoring(&self, layer1: Layer1Outcome, assessment: RiskAssessment) -> Stage {
        match (assessment.band, &layer1) {
            (RiskBand::Safe, _) => {
                let reason = match layer1.rule_id() {
                    Some(id) => format!("Allowed by rule {}; no risk indicators", id),
                    None => "no risk indicators".to_string(),
                };
                Stage::Terminal(Outcome::scored(
                    VerdictStatus::Executed,
                    DecisionLayer::RiskScore,
                    &layer1,
                    &assessment,
                    reason,
                ))
            }
            (RiskBand::HighRisk, Layer1Outcome::NoMatch) => Stage::Terminal(Outcome::scored(
                VerdictStatus::NoMatchBlocked,
                DecisionLayer::RiskScore,
                &layer1,
                &assessment,
                format!("No matching rule and high risk: {}", assessment.reason()),
            )),
            (RiskBand::HighRisk, _) => {
                tracing::warn!(
                    rule_id = layer1.rule_id().unwrap_or_default(),
                    score = assessment.score,
                    "runtime conflict: accepting rule matched a high-risk command"
                );
                Stage::Escalate(layer1, assessment, true)
            }
            (RiskBand::Ambiguous, _) => Stage::Escalate(layer1, assessment, false),
        }
    }

    async fn escalate(
        &self,
        request: &CommandRequest,
        layer1: Layer1Outcome,
        assessment: RiskAssessment,
        runtime_conflict: bool,
    ) -> Outcome {
        let judge_request = JudgeRequest {
            requester: request.requester.clone(),
            command: request.command.clone(),
            layer1: layer1.kind(),
            matched_rule: layer1.rule_id().map(String::from),
            assessment,
            history: self.history.recent(&request.requester),
            runtime_conflict,
        };

        let decision = match tokio::time::timeout(self.judge_timeout, self.judge.judge(&judge_request)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "judge failed, blocking");
                JudgeDecision::block(format!("Judge failed: {}", e))
            }
            Err(_) => {
                let e = JudgeError::Timeout {
                    after_ms: self.judge_timeout.as_millis() as u64,
                };
                tracing::warn!(error = %e, "judge timed out, blocking");
                JudgeDecision::block(e.to_string())
            }
        };

        let status = if decision.is_execute() {
            VerdictStatus::EscalatedThenExecuted
        } else {
            VerdictStatus::EscalatedThenBlocked
        };
        tracing::info!(?status, runtime_conflict, "layer 3 done");
        Outcome::scored(
            status,
            DecisionLayer::Judge,
            &layer1,
            &judge_request.assessment,
            decision.reason,
        )
    }
}
