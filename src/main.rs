//! cmdgate - three-layer admission control for shell commands
//!
//! Reads newline-delimited JSON requests from stdin and writes one verdict
//! per line to stdout.
//!
//! # Usage
//!
//! ```bash
//! echo '{"requester":"alice","command":"rm -rf /"}' | cmdgate
//!
//! # Check a rule against the configured rule set before adding it
//! cmdgate --check-rule '^sudo .*' --action reject
//! ```

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use cmdgate::{
    audit::{AuditSink, JsonlAuditSink, NullAuditSink},
    config::Config,
    engine::Orchestrator,
    input::CommandRequest,
    output::Verdict,
    rules::{RuleAction, RuleDraft, RuleStore, RuleView},
};

/// Print version information
fn print_version() {
    println!("cmdgate {}", env!("CARGO_PKG_VERSION"));
}

/// Print help message
fn print_help() {
    println!(
        r#"cmdgate - three-layer admission control for shell commands

USAGE:
    cmdgate [OPTIONS] < requests.jsonl

OPTIONS:
    -h, --help                  Print this help message
    -v, --version               Print version information
    -c, --config PATH           Path to config file
        --list-rules            Print the configured rule set and exit
        --check-rule PATTERN    Check a candidate rule for overlaps and exit
        --action ACTION         Action for --check-rule: accept or reject (default: reject)

INPUT:
    One JSON object per line: {{"requester": "alice", "command": "git status"}}

ENVIRONMENT:
    CMDGATE_LOG=debug       Log filter for stderr (default: warn)
"#
    );
}

/// Parse command line arguments
struct Args {
    help: bool,
    version: bool,
    config_path: Option<String>,
    list_rules: bool,
    check_rule: Option<String>,
    action: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut result = Args {
            help: false,
            version: false,
            config_path: None,
            list_rules: false,
            check_rule: None,
            action: None,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-h" | "--help" => result.help = true,
                "-v" | "--version" => result.version = true,
                "--list-rules" => result.list_rules = true,
                "-c" | "--config" => {
                    if i + 1 < args.len() {
                        i += 1;
                        result.config_path = Some(args[i].clone());
                    }
                }
                "--check-rule" => {
                    if i + 1 < args.len() {
                        i += 1;
                        result.check_rule = Some(args[i].clone());
                    }
                }
                "--action" => {
                    if i + 1 < args.len() {
                        i += 1;
                        result.action = Some(args[i].clone());
                    }
                }
                arg if arg.starts_with("--config=") => {
                    result.config_path = Some(arg.trim_start_matches("--config=").to_string());
                }
                arg if arg.starts_with("--action=") => {
                    result.action = Some(arg.trim_start_matches("--action=").to_string());
                }
                _ => {}
            }
            i += 1;
        }

        result
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CMDGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list_rules(store: &RuleStore) -> ExitCode {
    for rule in store.snapshot().rules() {
        match serde_json::to_string(&RuleView::from(rule.as_ref())) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize rule {}: {}", rule.id, e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn check_rule(store: &RuleStore, pattern: &str, action: Option<&str>) -> ExitCode {
    let action = match action.map(RuleAction::from_str) {
        None => RuleAction::AutoReject,
        Some(Some(action)) => action,
        Some(None) => {
            eprintln!("Error: --action must be 'accept' or 'reject'");
            return ExitCode::FAILURE;
        }
    };

    match store.check(&RuleDraft::new(pattern, action)) {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).unwrap_or_else(|_| report.to_string())
            );
            if report.has_hard() {
                eprintln!("Hard conflict: {}", report);
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn audit_sink(config: &Config) -> Arc<dyn AuditSink> {
    let Some(path) = config.audit_path() else {
        return Arc::new(NullAuditSink);
    };
    match JsonlAuditSink::open(&path) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "audit log unavailable");
            Arc::new(NullAuditSink)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Handle help and version
    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    init_tracing();

    // Load configuration
    let config = match args.config_path {
        Some(ref path) => match Config::load_from(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: failed to load config from {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::load(),
    };

    let store = match RuleStore::from_config(&config.rules) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error: invalid rule set: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.list_rules {
        return list_rules(&store);
    }

    if let Some(ref pattern) = args.check_rule {
        return check_rule(&store, pattern, args.action.as_deref());
    }

    let audit = audit_sink(&config);
    let engine = match Orchestrator::from_config(&config, store, audit) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let verdict = match CommandRequest::from_json(&line) {
            Ok(request) => engine.evaluate(request).await,
            Err(e) => {
                // Fail closed: an unreadable request is blocked, never dropped
                tracing::warn!(error = %e, "malformed request");
                let verdict = Verdict::unreadable(format!("Failed to parse request: {}", e));
                engine.audit(&verdict);
                verdict
            }
        };

        let mut json = verdict.to_json();
        json.push('\n');
        if stdout.write_all(json.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            break;
        }
    }

    engine.flush_audit().await;
    ExitCode::SUCCESS
}
