//! Shell tokenization and analysis
//!
//! Enough of the shell grammar for scoring: quote-aware splitting of compound
//! commands, word splitting via shlex, and a few textual probes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::iter::Peekable;
use std::str::Chars;

/// One simple command inside a compound command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Reads its stdin from the previous segment (`a | b`)
    pub piped: bool,
}

/// A command line split on `;`, `&&`, `||`, `|`, `&` and newlines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub segments: Vec<Segment>,
    /// A `|` appeared outside quotes
    pub has_pipe: bool,
    /// A `>` appeared outside quotes
    pub has_redirect: bool,
}

/// Split a command line into simple commands
///
/// Operators inside quotes are ignored. Subshells `( )`, command
/// substitutions `$( )` and backticks, and process substitutions `<( )`
/// contribute their inner commands as segments of their own; in the
/// enclosing word a substitution leaves an empty `$()` behind. Returns
/// `None` when quoting or grouping is unbalanced.
pub fn split_command_line(command: &str) -> Option<CommandLine> {
    let mut line = CommandLine::default();
    Splitter::new(&mut line, false).run(command, 0)?;
    Some(line)
}

const MAX_NESTING: usize = 32;

struct Splitter<'a> {
    line: &'a mut CommandLine,
    current: String,
    piped: bool,
    /// Text after a closing `)` belongs to the group (redirections)
    group_tail: bool,
}

impl<'a> Splitter<'a> {
    fn new(line: &'a mut CommandLine, piped: bool) -> Self {
        Self {
            line,
            current: String::new(),
            piped,
            group_tail: false,
        }
    }

    fn run(mut self, command: &str, nesting: usize) -> Option<()> {
        if nesting > MAX_NESTING {
            return None;
        }
        let mut in_single = false;
        let mut in_double = false;
        let mut escaped = false;

        let mut chars = command.chars().peekable();
        while let Some(c) = chars.next() {
            if escaped {
                escaped = false;
                self.current.push(c);
                continue;
            }
            if in_single {
                if c == '\'' {
                    in_single = false;
                }
                self.current.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    self.current.push(c);
                    continue;
                }
                '"' => {
                    in_double = !in_double;
                    self.current.push(c);
                    continue;
                }
                '\'' if !in_double => {
                    in_single = true;
                    self.current.push(c);
                    continue;
                }
                '$' | '<' | '>' if chars.peek() == Some(&'(') && (c == '$' || !in_double) => {
                    chars.next();
                    // $(( )) is arithmetic, nothing runs
                    let arithmetic = c == '$' && chars.peek() == Some(&'(');
                    let body = take_group(&mut chars)?;
                    if !arithmetic {
                        Splitter::new(&mut *self.line, false).run(&body, nesting + 1)?;
                    }
                    self.current.push(c);
                    self.current.push_str("()");
                    continue;
                }
                '`' => {
                    let body = take_backticks(&mut chars)?;
                    Splitter::new(&mut *self.line, false).run(&body, nesting + 1)?;
                    self.current.push_str("$()");
                    continue;
                }
                _ => {}
            }
            if in_double {
                self.current.push(c);
                continue;
            }

            match c {
                '(' => {
                    let piped = self.piped;
                    self.end_segment(false);
                    let body = take_group(&mut chars)?;
                    Splitter::new(&mut *self.line, piped).run(&body, nesting + 1)?;
                    self.group_tail = true;
                }
                ')' => return None,
                '>' => {
                    self.line.has_redirect = true;
                    self.current.push(c);
                    // 2>&1, >|
                    if let Some(&next) = chars.peek() {
                        if next == '&' || next == '|' || next == '>' {
                            self.current.push(next);
                            chars.next();
                        }
                    }
                }
                '|' => {
                    if chars.peek() == Some(&'|') {
                        chars.next();
                        self.end_segment(false);
                    } else {
                        if chars.peek() == Some(&'&') {
                            chars.next();
                        }
                        self.line.has_pipe = true;
                        self.end_segment(true);
                    }
                }
                '&' => match chars.peek() {
                    Some('&') => {
                        chars.next();
                        self.end_segment(false);
                    }
                    Some('>') => self.current.push(c),
                    _ => self.end_segment(false),
                },
                ';' | '\n' => self.end_segment(false),
                _ => self.current.push(c),
            }
        }

        if in_single || in_double || escaped {
            return None;
        }
        self.end_segment(false);
        Some(())
    }

    fn end_segment(&mut self, next_piped: bool) {
        let text = self.current.trim();
        if !text.is_empty() && !self.group_tail {
            self.line.segments.push(Segment {
                text: text.to_string(),
                piped: self.piped,
            });
        }
        self.current.clear();
        self.piped = next_piped;
        self.group_tail = false;
    }
}

/// Body of a `( )` group, the opening paren already consumed
fn take_group(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut body = String::new();
    let mut depth = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for c in chars.by_ref() {
        if escaped {
            escaped = false;
        } else if in_single {
            in_single = c != '\'';
        } else {
            match c {
                '\\' => escaped = true,
                '"' => in_double = !in_double,
                '\'' if !in_double => in_single = true,
                '(' if !in_double => depth += 1,
                ')' if !in_double => {
                    if depth == 0 {
                        return Some(body);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        body.push(c);
    }
    None
}

/// Body of a backtick substitution, the opening backtick already consumed
fn take_backticks(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut body = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                body.push(c);
                body.push(chars.next()?);
            }
            '`' => return Some(body),
            _ => body.push(c),
        }
    }
    None
}

/// Tokenize a shell command into words
/// Uses shlex for proper shell quoting handling
pub fn tokenize(command: &str) -> Option<Vec<String>> {
    shlex::split(command)
}

/// Final path component of a command word: `/usr/bin/rm` -> `rm`
pub fn base_name(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

/// Expand a flag word into the flags it sets
///
/// `-rf` -> `["-r", "-f"]`, `--force` -> `["--force"]`, `--opt=x` -> `["--opt"]`.
/// Non-flags yield nothing.
pub fn expand_flags(word: &str) -> Vec<String> {
    if let Some(long) = word.strip_prefix("--") {
        if long.is_empty() {
            return Vec::new();
        }
        let name = long.split('=').next().unwrap_or(long);
        return vec![format!("--{}", name)];
    }
    match word.strip_prefix('-') {
        Some(short) if !short.is_empty() && short.chars().all(|c| c.is_ascii_alphabetic()) => {
            short.chars().map(|c| format!("-{}", c)).collect()
        }
        _ => Vec::new(),
    }
}

/// `$(curl ...)`, `<(wget ...)` and the backtick form
pub fn has_fetch_substitution(command: &str, fetchers: &[String]) -> bool {
    static SUBSTITUTION: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:\$\(|<\(|`)\s*([\w./-]+)").unwrap());

    SUBSTITUTION
        .captures_iter(command)
        .filter_map(|caps| caps.get(1))
        .any(|m| fetchers.iter().any(|f| f == base_name(m.as_str())))
}

/// Output redirected onto a block device: `> /dev/sda`
pub fn has_device_redirect(command: &str) -> bool {
    static DEVICE_REDIRECT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r">\s*/dev/(?:sd[a-z]|nvme\d|hd[a-z]|vd[a-z]|xvd[a-z]|mmcblk\d|disk\d)").unwrap()
    });
    DEVICE_REDIRECT.is_match(command)
}

/// `of=/dev/X` targeting a real device
pub fn raw_device_target(word: &str) -> Option<&str> {
    let device = word.strip_prefix("of=/dev/")?;
    const HARMLESS: &[&str] = &["null", "zero", "stdout", "stderr", "tty", "random", "urandom"];
    if device.is_empty() || HARMLESS.contains(&device) {
        None
    } else {
        Some(device)
    }
}
