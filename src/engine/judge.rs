//! Layer 3: contextual judgment
//!
//! Only the contract lives here. The orchestrator bounds every call with a
//! timeout and turns any failure into a block.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::engine::history::HistoryEntry;
use crate::engine::matcher::Layer1Kind;
use crate::engine::scorer::RiskAssessment;
use crate::errors::JudgeError;

/// Everything the judge is told about a command
#[derive(Debug, Clone, Serialize)]
pub struct JudgeRequest {
    pub requester: String,
    pub command: String,
    pub layer1: Layer1Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    pub assessment: RiskAssessment,
    /// Requester's recent verdicts, newest first
    pub history: Vec<HistoryEntry>,
    /// An accepting rule matched a high-risk command
    pub runtime_conflict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeVerdict {
    #[serde(rename = "EXECUTED")]
    Execute,
    #[serde(rename = "BLOCKED")]
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeDecision {
    #[serde(rename = "status")]
    pub verdict: JudgeVerdict,
    #[serde(default)]
    pub reason: String,
}

impl JudgeDecision {
    pub fn execute(reason: impl Into<String>) -> Self {
        Self {
            verdict: JudgeVerdict::Execute,
            reason: reason.into(),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            verdict: JudgeVerdict::Block,
            reason: reason.into(),
        }
    }

    pub fn is_execute(&self) -> bool {
        self.verdict == JudgeVerdict::Execute
    }
}

#[async_trait]
pub trait ContextualJudge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeDecision, JudgeError>;
}

/// Blocks everything; used when no judge is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct FailClosedJudge;

#[async_trait]
impl ContextualJudge for FailClosedJudge {
    async fn judge(&self, _request: &JudgeRequest) -> Result<JudgeDecision, JudgeError> {
        Ok(JudgeDecision::block("no judge configured"))
    }
}

/// Runs an external program per judgment
///
/// The request goes to the program's stdin as JSON; stdout must carry
/// `{"status": "EXECUTED"|"BLOCKED", "reason": "..."}`, optionally inside a
/// fenced json block.
#[derive(Debug, Clone)]
pub struct ProcessJudge {
    argv: Vec<String>,
}

impl ProcessJudge {
    pub fn new(argv: Vec<String>) -> Result<Self, JudgeError> {
        if argv.is_empty() {
            return Err(JudgeError::Unavailable("empty judge command".to_string()));
        }
        Ok(Self { argv })
    }
}

#[async_trait]
impl ContextualJudge for ProcessJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeDecision, JudgeError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| JudgeError::InvalidResponse(format!("unserializable request: {e}")))?;

        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JudgeError::Unavailable(format!("{}: {e}", self.argv[0])))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JudgeError::Unavailable(format!(
                "judge exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_judge_response(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse a judge reply, tolerating a ```json fence around it
pub fn parse_judge_response(text: &str) -> Result<JudgeDecision, JudgeError> {
    let body = unfence(text.trim());
    serde_json::from_str(body).map_err(|e| JudgeError::InvalidResponse(e.to_string()))
}

fn unfence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
