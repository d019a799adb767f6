//! Configuration loading for cmdgate
//!
//! Supports TOML configuration with embedded defaults.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::rules::conflict::DEFAULT_MAX_PRODUCT_STATES;
use crate::rules::defaults::default_drafts;
use crate::rules::{ConflictDetector, RuleDraft};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// General configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable audit logging
    pub audit_log: bool,

    /// Path to audit log file
    pub audit_path: Option<String>,

    /// Recent verdicts kept per requester and handed to the judge
    pub history_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            audit_path: Some("~/.local/share/cmdgate/audit.jsonl".to_string()),
            history_size: 20,
        }
    }
}

/// In-memory credit ledger seed
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    /// Balance for requesters without an explicit entry
    pub default_balance: u64,

    /// Per-requester balances
    pub balances: HashMap<String, u64>,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            default_balance: 100,
            balances: HashMap::new(),
        }
    }
}

/// Layer 3 configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Deadline for one judgment; expiry blocks the command
    pub timeout_ms: u64,

    /// argv of an external judge; without one every escalation is blocked
    pub command: Option<Vec<String>>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            command: None,
        }
    }
}

/// Weight added per finding category
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    /// Each `-f`, `-r`, `--force`, ... flag
    pub risky_flag: u32,
    /// Destructive binary with both force and recursive flags
    pub destructive_combo: u32,
    /// Argument under a system directory
    pub system_path: u32,
    /// Argument is `/` or `/*`
    pub root_target: u32,
    /// `of=/dev/sdX` or `> /dev/sdX`
    pub raw_device_write: u32,
    /// sudo, su, doas
    pub privilege_escalation: u32,
    /// Shell or interpreter reading from a pipe
    pub pipe_to_shell: u32,
    /// Downloaded content reaching a shell
    pub remote_fetch_exec: u32,
    /// Any pipe or output redirection
    pub redirection: u32,
    /// Quoting the tokenizer cannot parse
    pub unparseable: u32,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            risky_flag: 20,
            destructive_combo: 50,
            system_path: 40,
            root_target: 50,
            raw_device_write: 150,
            privilege_escalation: 40,
            pipe_to_shell: 60,
            remote_fetch_exec: 40,
            redirection: 10,
            unparseable: 100,
        }
    }
}

/// Layer 2 scoring table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scores at or above this are HIGH_RISK
    pub high_risk_threshold: u32,

    /// Weight of a binary missing from `binaries`
    pub default_binary_weight: u32,

    /// Per-binary base weight
    pub binaries: HashMap<String, u32>,

    pub weights: CategoryWeights,

    pub risky_flags: Vec<String>,

    /// Binaries that destroy data when forced and recursive
    pub destructive_binaries: Vec<String>,

    pub system_paths: Vec<String>,

    pub privilege_binaries: Vec<String>,

    /// Shells and interpreters that execute their stdin
    pub shell_binaries: Vec<String>,

    pub fetch_binaries: Vec<String>,

    /// Commands that wrap other commands (scored recursively)
    pub wrappers: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let binaries = [
            ("rm", 40),
            ("dd", 30),
            ("mkfs", 100),
            ("shred", 100),
            ("wipefs", 100),
            ("fdisk", 80),
            ("curl", 40),
            ("wget", 40),
            ("nc", 50),
            ("netcat", 50),
            ("mv", 20),
            ("chmod", 30),
            ("chown", 30),
            ("ssh", 30),
            ("scp", 30),
            ("ftp", 30),
            ("python", 50),
            ("python3", 50),
            ("perl", 50),
            ("ruby", 50),
            ("node", 50),
            ("bash", 50),
            ("sh", 50),
            ("zsh", 50),
            ("find", 10),
        ]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .chain(
            [
                "git", "ls", "pwd", "echo", "cat", "grep", "whoami", "id", "head", "tail", "wc",
                "date", "sudo", "su", "doas",
            ]
            .into_iter()
            .map(|name| (name.to_string(), 0)),
        )
        .collect();

        Self {
            high_risk_threshold: 100,
            default_binary_weight: 20,
            binaries,
            weights: CategoryWeights::default(),
            risky_flags: strings(&["-f", "-r", "-R", "--force", "--recursive", "--no-preserve-root"]),
            destructive_binaries: strings(&["rm", "shred", "chmod", "chown"]),
            system_paths: strings(&["/etc", "/usr", "/bin", "/sbin", "/boot", "/lib", "/var", "/sys", "/proc", "/dev"]),
            privilege_binaries: strings(&["sudo", "su", "doas", "pkexec"]),
            shell_binaries: strings(&["sh", "bash", "zsh", "dash", "ksh", "fish", "python", "python3", "perl", "ruby", "node"]),
            fetch_binaries: strings(&["curl", "wget"]),
            wrappers: strings(crate::parser::wrapper::DEFAULT_WRAPPERS),
        }
    }
}

/// Rule set configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Reject writes that overlap a same-action rule
    pub block_soft_conflicts: bool,

    /// Product-state budget for one pairwise overlap check
    pub max_product_states: usize,

    /// Initial rule set; empty installs the built-in defaults
    pub seed: Vec<RuleDraft>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            block_soft_conflicts: false,
            max_product_states: DEFAULT_MAX_PRODUCT_STATES,
            seed: Vec::new(),
        }
    }
}

impl RulesConfig {
    pub fn detector(&self) -> ConflictDetector {
        ConflictDetector::new(self.max_product_states)
    }

    /// Configured seed rules, or the built-in set
    pub fn seed_drafts(&self) -> Vec<RuleDraft> {
        if self.seed.is_empty() {
            default_drafts()
        } else {
            self.seed.clone()
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub credits: CreditsConfig,
    pub judge: JudgeConfig,
    pub scoring: ScoringConfig,
    pub rules: RulesConfig,
}

impl Config {
    /// Load configuration from the standard locations or use defaults
    pub fn load() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("cmdgate/config.toml")),
            Some(PathBuf::from("/etc/cmdgate/config.toml")),
        ];

        for path in config_paths.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match Self::load_from(&path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "loaded config");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring config");
                }
            }
        }

        Config::default()
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Expand ~ in path strings
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get the audit log path (expanded), if auditing is on
    pub fn audit_path(&self) -> Option<PathBuf> {
        if !self.general.audit_log {
            return None;
        }
        self.general.audit_path.as_deref().map(Self::expand_path)
    }
}

/// Embedded default configuration
pub const DEFAULT_CONFIG_TOML: &str = r#"
[general]
audit_log = true
audit_path = "~/.local/share/cmdgate/audit.jsonl"
history_size = 20

[credits]
default_balance = 100

[credits.balances]
# alice = 50

[judge]
timeout_ms = 5000
# command = ["cmdgate-judge", "--model", "default"]

[scoring]
high_risk_threshold = 100
default_binary_weight = 20

# Replaces the built-in binary table when present
# [scoring.binaries]
# rm = 40
# git = 0

[scoring.weights]
risky_flag = 20
destructive_combo = 50
system_path = 40
root_target = 50
raw_device_write = 150
privilege_escalation = 40
pipe_to_shell = 60
remote_fetch_exec = 40
redirection = 10
unparseable = 100

[rules]
block_soft_conflicts = false
max_product_states = 1000000

[[rules.seed]]
id = "rule_001"
pattern = "^git (pull|fetch|status)"
action = "AUTO_ACCEPT"
description = "Safe git read operations"
priority = 1

[[rules.seed]]
id = "rule_002"
pattern = "^rm -rf"
action = "AUTO_REJECT"
description = "Dangerous file deletion"
priority = 2

[[rules.seed]]
id = "rule_003"
pattern = "^sudo"
action = "AUTO_REJECT"
description = "Elevated privileges"
priority = 3

[[rules.seed]]
id = "rule_004"
pattern = "^ls|^pwd|^echo"
action = "AUTO_ACCEPT"
description = "Basic shell commands"
priority = 4
"#;
