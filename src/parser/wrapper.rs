//! Wrapper command unwrapping
//!
//! `sudo`, `timeout`, `env` and friends run another command. The scorer
//! needs both: the wrapper (privilege escalation is scored on `sudo`) and the
//! wrapped binary (scored on its own weight).

use std::collections::HashSet;

/// Default wrapper commands
pub const DEFAULT_WRAPPERS: &[&str] = &[
    "sudo", "doas", "timeout", "xargs", "env", "nice", "nohup", "ionice", "strace", "time",
    "unbuffer", "watch", "exec", "command",
];

/// A command split into the wrappers in front of it and what they run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped<'a> {
    /// Wrapper binaries, outermost first
    pub wrappers: Vec<&'a str>,
    /// The wrapped command's tokens; empty when a wrapper had no command
    pub command: &'a [String],
}

/// Peel wrapper commands off `tokens`
///
/// Example: `sudo timeout 30 rm -rf /` -> wrappers `[sudo, timeout]`,
/// command `rm -rf /`
pub fn unwrap_tokens<'a>(tokens: &'a [String], wrappers: &HashSet<String>) -> Unwrapped<'a> {
    let mut seen = Vec::new();
    let mut rest = tokens;

    while let Some(first) = rest.first() {
        let name = super::shell::base_name(first);
        if !wrappers.contains(name) {
            break;
        }
        seen.push(name);
        let skip = match name {
            "sudo" | "doas" => skip_options(rest, &["-u", "--user", "-g", "--group", "-C", "--close-from", "-h", "--host"]),
            "timeout" => skip_options(rest, &["-s", "--signal", "-k", "--kill-after"]).map(|i| i + 1),
            "env" => skip_env(rest),
            "xargs" => skip_options(rest, &["-n", "-L", "-I", "-E", "-s", "-P", "-d", "-a"]),
            "watch" => skip_options(rest, &["-n", "-d", "--interval", "--differences"]),
            _ => skip_options(rest, &["-n", "-c", "-p", "-o"]),
        };
        rest = match skip {
            Some(idx) if idx < rest.len() => &rest[idx..],
            _ => &rest[rest.len()..],
        };
    }

    Unwrapped {
        wrappers: seen,
        command: rest,
    }
}

/// Index of the first non-option token after the wrapper name
fn skip_options(tokens: &[String], takes_arg: &[&str]) -> Option<usize> {
    let mut idx = 1;
    while idx < tokens.len() {
        let token = tokens[idx].as_str();
        if token == "--" {
            return Some(idx + 1);
        }
        if !token.starts_with('-') {
            return Some(idx);
        }
        idx += if takes_arg.contains(&token) { 2 } else { 1 };
    }
    None
}

/// `env [-i] [-u NAME] [VAR=val...] command`
fn skip_env(tokens: &[String]) -> Option<usize> {
    let mut idx = 1;
    while idx < tokens.len() {
        let token = tokens[idx].as_str();
        if token.starts_with('-') {
            idx += if matches!(token, "-u" | "--unset") { 2 } else { 1 };
        } else if token.contains('=') {
            idx += 1;
        } else {
            return Some(idx);
        }
    }
    None
}
