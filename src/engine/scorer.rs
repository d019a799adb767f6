//! Layer 2: heuristic risk scoring
//!
//! Splits a command line into simple commands, unwraps `sudo`-style wrappers
//! and sums weighted findings from the scoring table. Pure: the same command
//! and table always give the same assessment.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::config::ScoringConfig;
use crate::parser::shell::{
    base_name, expand_flags, has_device_redirect, has_fetch_substitution, raw_device_target,
    split_command_line, tokenize,
};
use crate::parser::wrapper::unwrap_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    /// Score 0
    Safe,
    /// Between 0 and the high-risk threshold
    Ambiguous,
    HighRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Binary,
    RiskyFlag,
    DestructiveCombo,
    SystemPath,
    RootTarget,
    RawDeviceWrite,
    PrivilegeEscalation,
    PipeToShell,
    RemoteFetchExec,
    Redirection,
    Unparseable,
}

impl RiskCategory {
    fn label(self) -> &'static str {
        match self {
            RiskCategory::Binary => "Binary",
            RiskCategory::RiskyFlag => "Risky flag",
            RiskCategory::DestructiveCombo => "Forced recursive",
            RiskCategory::SystemPath => "System path",
            RiskCategory::RootTarget => "Root target",
            RiskCategory::RawDeviceWrite => "Raw device write",
            RiskCategory::PrivilegeEscalation => "Privilege escalation",
            RiskCategory::PipeToShell => "Pipe to shell",
            RiskCategory::RemoteFetchExec => "Remote fetch and execute",
            RiskCategory::Redirection => "Redirection",
            RiskCategory::Unparseable => "Unparseable",
        }
    }
}

/// One scored indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub category: RiskCategory,
    /// Token or construct that triggered the finding
    pub subject: String,
    pub weight: u32,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' risk (+{})", self.category.label(), self.subject, self.weight)
    }
}

/// Layer 2 outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub band: RiskBand,
    pub findings: Vec<Finding>,
}

impl RiskAssessment {
    /// Findings joined for humans: "Binary 'rm' risk (+40); ..."
    pub fn reason(&self) -> String {
        if self.findings.is_empty() {
            return "no risk indicators".to_string();
        }
        self.findings
            .iter()
            .map(Finding::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Table-driven scorer
#[derive(Debug, Clone)]
pub struct RiskScorer {
    config: ScoringConfig,
    wrappers: HashSet<String>,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        let wrappers = config.wrappers.iter().cloned().collect();
        Self { config, wrappers }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Band for a raw score
    pub fn band(&self, score: u32) -> RiskBand {
        if score == 0 {
            RiskBand::Safe
        } else if score >= self.config.high_risk_threshold {
            RiskBand::HighRisk
        } else {
            RiskBand::Ambiguous
        }
    }

    pub fn score(&self, command: &str) -> RiskAssessment {
        let mut findings = Vec::new();
        if !command.trim().is_empty() {
            self.collect(command, &mut findings);
        }

        let score = findings
            .iter()
            .fold(0u32, |acc, f: &Finding| acc.saturating_add(f.weight));
        let band = self.band(score);
        tracing::debug!(score, ?band, findings = findings.len(), "layer 2: scored");

        RiskAssessment {
            score,
            band,
            findings,
        }
    }

    fn collect(&self, command: &str, findings: &mut Vec<Finding>) {
        let weights = &self.config.weights;
        let Some(line) = split_command_line(command) else {
            push(findings, RiskCategory::Unparseable, "syntax", weights.unparseable);
            return;
        };

        if line.has_pipe {
            push(findings, RiskCategory::Redirection, "|", weights.redirection);
        } else if line.has_redirect {
            push(findings, RiskCategory::Redirection, ">", weights.redirection);
        }
        if has_device_redirect(command) {
            push(findings, RiskCategory::RawDeviceWrite, "> /dev", weights.raw_device_write);
        }
        if has_fetch_substitution(command, &self.config.fetch_binaries) {
            push(findings, RiskCategory::RemoteFetchExec, "substitution", weights.remote_fetch_exec);
        }

        let mut fetched = false;
        for segment in &line.segments {
            let Some(tokens) = tokenize(&segment.text) else {
                push(findings, RiskCategory::Unparseable, &segment.text, weights.unparseable);
                continue;
            };
            let start = tokens.iter().take_while(|t| is_assignment(t)).count();
            let unwrapped = unwrap_tokens(&tokens[start..], &self.wrappers);

            for wrapper in &unwrapped.wrappers {
                if contains(&self.config.privilege_binaries, wrapper) {
                    push(findings, RiskCategory::PrivilegeEscalation, wrapper, weights.privilege_escalation);
                }
            }

            let Some((first, args)) = unwrapped.command.split_first() else {
                continue;
            };
            let binary = base_name(first);

            if contains(&self.config.privilege_binaries, binary) {
                push(findings, RiskCategory::PrivilegeEscalation, binary, weights.privilege_escalation);
            }
            let weight = self.binary_weight(binary);
            if weight > 0 {
                push(findings, RiskCategory::Binary, binary, weight);
            }
            if segment.piped && contains(&self.config.shell_binaries, binary) {
                push(findings, RiskCategory::PipeToShell, binary, weights.pipe_to_shell);
                if fetched {
                    push(findings, RiskCategory::RemoteFetchExec, binary, weights.remote_fetch_exec);
                }
            }
            if contains(&self.config.fetch_binaries, binary) {
                fetched = true;
            }

            self.score_args(binary, args, findings);
        }
    }

    fn score_args(&self, binary: &str, args: &[String], findings: &mut Vec<Finding>) {
        let weights = &self.config.weights;
        let mut flags: Vec<String> = Vec::new();

        for arg in args {
            for flag in expand_flags(arg) {
                if !flags.contains(&flag) {
                    flags.push(flag);
                }
            }
            if let Some(device) = raw_device_target(arg) {
                push(findings, RiskCategory::RawDeviceWrite, device, weights.raw_device_write);
            }
            if arg == "/" || arg == "/*" {
                push(findings, RiskCategory::RootTarget, arg, weights.root_target);
            } else if self.is_system_path(arg) {
                push(findings, RiskCategory::SystemPath, arg, weights.system_path);
            }
        }

        for flag in &flags {
            if contains(&self.config.risky_flags, flag) {
                push(findings, RiskCategory::RiskyFlag, flag, weights.risky_flag);
            }
        }

        let forced = flags.iter().any(|f| f == "-f" || f == "--force");
        let recursive = flags.iter().any(|f| f == "-r" || f == "-R" || f == "--recursive");
        if forced && recursive && contains(&self.config.destructive_binaries, binary) {
            push(findings, RiskCategory::DestructiveCombo, binary, weights.destructive_combo);
        }
    }

    /// Base weight; `mkfs.ext4` falls back to `mkfs`
    fn binary_weight(&self, binary: &str) -> u32 {
        let table = &self.config.binaries;
        if let Some(weight) = table.get(binary) {
            return *weight;
        }
        binary
            .split_once('.')
            .and_then(|(stem, _)| table.get(stem))
            .copied()
            .unwrap_or(self.config.default_binary_weight)
    }

    fn is_system_path(&self, arg: &str) -> bool {
        self.config.system_paths.iter().any(|p| {
            arg == p
                || arg
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn push(findings: &mut Vec<Finding>, category: RiskCategory, subject: &str, weight: u32) {
    if weight == 0 {
        return;
    }
    findings.push(Finding {
        category,
        subject: subject.to_string(),
        weight,
    });
}

fn contains(list: &[String], item: &str) -> bool {
    list.iter().any(|s| s == item)
}

/// `NAME=value` prefix
fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}
