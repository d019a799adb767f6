//! Parser for the rule pattern language
//!
//! Accepts the regex subset rules are written in: literals, escapes, `.`,
//! bracket classes, anchors, alternation, groups and the usual quantifiers.
//! Anything outside it (inline flags, look-around, word boundaries, Unicode
//! classes, backreferences) is rejected so that overlap checks never reason
//! about a language they cannot represent.

use super::ByteClass;
use crate::errors::PatternError;

/// Upper bound for `{n,m}` counts
pub const MAX_REPEAT: u32 = 1000;

/// A set of characters: explicit ASCII members, optionally plus every
/// non-ASCII scalar value (used by `.` and negated classes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharClass {
    pub ascii: ByteClass,
    pub non_ascii: bool,
}

impl CharClass {
    fn ascii(ascii: ByteClass) -> Self {
        Self {
            ascii,
            non_ascii: false,
        }
    }

    fn negated(ascii: ByteClass) -> Self {
        Self {
            ascii: ascii.ascii_complement(),
            non_ascii: true,
        }
    }

    /// `.`: any character except newline
    pub fn dot() -> Self {
        let mut ascii = ByteClass::range(0x00, 0x7F);
        ascii.remove(b'\n');
        Self {
            ascii,
            non_ascii: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ast {
    Empty,
    Literal(char),
    Class(CharClass),
    StartOfText,
    EndOfText,
    Concat(Vec<Ast>),
    Alternate(Vec<Ast>),
    Repeat {
        inner: Box<Ast>,
        min: u32,
        max: Option<u32>,
    },
}

/// Parse a pattern into an [`Ast`]
pub fn parse(pattern: &str) -> Result<Ast, PatternError> {
    let mut parser = Parser {
        pattern,
        chars: pattern.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let ast = parser.parse_alternation()?;
    if parser.pos < parser.chars.len() {
        return Err(parser.syntax("unmatched ')'"));
    }
    Ok(ast)
}

struct Parser<'a> {
    pattern: &'a str,
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn syntax(&self, message: impl Into<String>) -> PatternError {
        PatternError::Syntax {
            pattern: self.pattern.to_string(),
            offset: self.pos,
            message: message.into(),
        }
    }

    fn unsupported(&self, feature: impl Into<String>) -> PatternError {
        PatternError::Unsupported {
            pattern: self.pattern.to_string(),
            feature: feature.into(),
        }
    }

    fn parse_alternation(&mut self) -> Result<Ast, PatternError> {
        let mut branches = vec![self.parse_concat()?];
        while self.eat('|') {
            branches.push(self.parse_concat()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Ast::Alternate(branches)
        })
    }

    fn parse_concat(&mut self) -> Result<Ast, PatternError> {
        let mut items = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || (c == ')' && self.depth > 0) {
                break;
            }
            if c == ')' {
                return Err(self.syntax("unmatched ')'"));
            }
            let atom = self.parse_atom()?;
            items.push(self.parse_quantifiers(atom)?);
        }
        Ok(match items.len() {
            0 => Ast::Empty,
            1 => items.remove(0),
            _ => Ast::Concat(items),
        })
    }

    fn parse_quantifiers(&mut self, mut atom: Ast) -> Result<Ast, PatternError> {
        loop {
            let (min, max) = match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    (0, None)
                }
                Some('+') => {
                    self.pos += 1;
                    (1, None)
                }
                Some('?') => {
                    self.pos += 1;
                    (0, Some(1))
                }
                Some('{') => self.parse_counted()?,
                _ => return Ok(atom),
            };
            // Laziness changes which match is reported, not whether one exists
            self.eat('?');
            atom = Ast::Repeat {
                inner: Box::new(atom),
                min,
                max,
            };
        }
    }

    fn parse_counted(&mut self) -> Result<(u32, Option<u32>), PatternError> {
        self.pos += 1; // '{'
        let min = self
            .parse_number()?
            .ok_or_else(|| self.syntax("counted repetition needs a lower bound"))?;
        let max = if self.eat(',') {
            self.parse_number()?
        } else {
            Some(min)
        };
        if !self.eat('}') {
            return Err(self.syntax("unclosed counted repetition"));
        }
        if let Some(max) = max {
            if max < min {
                return Err(self.syntax("counted repetition has max below min"));
            }
        }
        if min > MAX_REPEAT || max.is_some_and(|m| m > MAX_REPEAT) {
            return Err(PatternError::TooComplex {
                pattern: self.pattern.to_string(),
                reason: format!("repetition count exceeds {}", MAX_REPEAT),
            });
        }
        Ok((min, max))
    }

    fn parse_number(&mut self) -> Result<Option<u32>, PatternError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse::<u32>()
            .map(Some)
            .map_err(|_| self.syntax("repetition count out of range"))
    }

    fn parse_atom(&mut self) -> Result<Ast, PatternError> {
        let c = match self.bump() {
            Some(c) => c,
            None => return Ok(Ast::Empty),
        };
        match c {
            '(' => self.parse_group(),
            '[' => Ok(Ast::Class(self.parse_class()?)),
            '.' => Ok(Ast::Class(CharClass::dot())),
            '^' => Ok(Ast::StartOfText),
            '$' => Ok(Ast::EndOfText),
            '\\' => self.parse_escape(),
            '*' | '+' | '?' | '{' => {
                self.pos -= 1;
                Err(self.syntax("repetition operator missing expression"))
            }
            other => Ok(Ast::Literal(other)),
        }
    }

    fn parse_group(&mut self) -> Result<Ast, PatternError> {
        if self.eat('?') {
            match (self.peek(), self.peek_at(1)) {
                (Some(':'), _) => {
                    self.pos += 1;
                }
                (Some('P'), Some('<')) => {
                    self.pos += 2;
                    self.skip_group_name()?;
                }
                (Some('<'), Some(c)) if c != '=' && c != '!' => {
                    self.pos += 1;
                    self.skip_group_name()?;
                }
                (Some('=' | '!'), _) | (Some('<'), _) => {
                    return Err(self.unsupported("look-around assertion"))
                }
                _ => return Err(self.unsupported("inline flags")),
            }
        }

        self.depth += 1;
        let inner = self.parse_alternation()?;
        self.depth -= 1;

        if !self.eat(')') {
            return Err(self.syntax("unclosed group"));
        }
        Ok(inner)
    }

    fn skip_group_name(&mut self) -> Result<(), PatternError> {
        while let Some(c) = self.bump() {
            if c == '>' {
                return Ok(());
            }
        }
        Err(self.syntax("unclosed group name"))
    }

    fn parse_escape(&mut self) -> Result<Ast, PatternError> {
        let c = self
            .bump()
            .ok_or_else(|| self.syntax("incomplete escape sequence"))?;
        if let Some(class) = perl_class(c) {
            return Ok(Ast::Class(class));
        }
        match c {
            'A' => Ok(Ast::StartOfText),
            'z' => Ok(Ast::EndOfText),
            'b' | 'B' | '<' | '>' => Err(self.unsupported("word boundary assertion")),
            'p' | 'P' => Err(self.unsupported("Unicode character class")),
            'x' | 'u' | 'U' => Err(self.unsupported("hexadecimal escape")),
            '0'..='9' => Err(self.unsupported("backreference or octal escape")),
            other => control_escape(other)
                .or_else(|| is_meta_escape(other).then_some(other))
                .map(Ast::Literal)
                .ok_or_else(|| self.unsupported(format!("escape sequence '\\{}'", other))),
        }
    }

    fn parse_class(&mut self) -> Result<CharClass, PatternError> {
        let negated = self.eat('^');
        let mut set = ByteClass::empty();
        let mut first = true;

        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.syntax("unclosed character class"))?;
            match c {
                ']' if !first => break,
                '[' => return Err(self.unsupported("nested or POSIX character class")),
                '&' | '~' | '-' if self.peek() == Some(c) && !first => {
                    return Err(self.unsupported("character class set operation"))
                }
                _ => {}
            }
            first = false;

            let lo = if c == '\\' {
                let e = self
                    .bump()
                    .ok_or_else(|| self.syntax("incomplete escape sequence"))?;
                if let Some(class) = perl_class(e) {
                    if class.non_ascii {
                        return Err(self.unsupported("negated shorthand inside a class"));
                    }
                    set = set.union(&class.ascii);
                    continue;
                }
                control_escape(e)
                    .or_else(|| (e.is_ascii_punctuation()).then_some(e))
                    .ok_or_else(|| self.unsupported(format!("escape sequence '\\{}' in class", e)))?
            } else {
                c
            };

            let hi = if self.peek() == Some('-') && self.peek_at(1).is_some_and(|n| n != ']') {
                self.pos += 1;
                let h = self.bump().ok_or_else(|| self.syntax("unclosed character class"))?;
                if h == '\\' {
                    let e = self
                        .bump()
                        .ok_or_else(|| self.syntax("incomplete escape sequence"))?;
                    control_escape(e)
                        .or_else(|| (e.is_ascii_punctuation()).then_some(e))
                        .ok_or_else(|| self.syntax("invalid range end"))?
                } else {
                    h
                }
            } else {
                lo
            };

            if !lo.is_ascii() || !hi.is_ascii() {
                return Err(self.unsupported("non-ASCII character class member"));
            }
            if hi < lo {
                return Err(self.syntax("invalid character class range"));
            }
            set.insert_range(lo as u8, hi as u8);
        }

        Ok(if negated {
            CharClass::negated(set)
        } else {
            CharClass::ascii(set)
        })
    }
}

/// `\d \D \w \W \s \S`, ASCII definitions
fn perl_class(c: char) -> Option<CharClass> {
    let digits = ByteClass::range(b'0', b'9');
    let word = digits
        .union(&ByteClass::range(b'a', b'z'))
        .union(&ByteClass::range(b'A', b'Z'))
        .union(&ByteClass::single(b'_'));
    let mut space = ByteClass::range(b'\t', b'\r');
    space.insert(b' ');

    match c {
        'd' => Some(CharClass::ascii(digits)),
        'D' => Some(CharClass::negated(digits)),
        'w' => Some(CharClass::ascii(word)),
        'W' => Some(CharClass::negated(word)),
        's' => Some(CharClass::ascii(space)),
        'S' => Some(CharClass::negated(space)),
        _ => None,
    }
}

fn control_escape(c: char) -> Option<char> {
    match c {
        't' => Some('\t'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        'f' => Some('\x0C'),
        'v' => Some('\x0B'),
        'a' => Some('\x07'),
        _ => None,
    }
}

fn is_meta_escape(c: char) -> bool {
    c.is_ascii_punctuation() || c == ' '
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Vec<Ast> {
        s.chars().map(Ast::Literal).collect()
    }

    #[test]
    fn test_parse_anchored_literal() {
        let ast = parse("^ls$").unwrap();
        let mut expected = vec![Ast::StartOfText];
        expected.extend(lit("ls"));
        expected.push(Ast::EndOfText);
        assert_eq!(ast, Ast::Concat(expected));
    }

    #[test]
    fn test_parse_alternation_and_group() {
        let ast = parse("^git (pull|fetch)").unwrap();
        match ast {
            Ast::Concat(items) => {
                assert!(matches!(items.last(), Some(Ast::Alternate(b)) if b.len() == 2));
            }
            other => panic!("unexpected ast: {:?}", other),
        }
    }

    #[test]
    fn test_parse_counted_repetition() {
        let ast = parse("a{2,5}").unwrap();
        assert_eq!(
            ast,
            Ast::Repeat {
                inner: Box::new(Ast::Literal('a')),
                min: 2,
                max: Some(5)
            }
        );
        assert!(matches!(
            parse("a{3,}").unwrap(),
            Ast::Repeat { min: 3, max: None, .. }
        ));
    }

    #[test]
    fn test_lazy_quantifier_same_as_greedy() {
        assert_eq!(parse("a*?").unwrap(), parse("a*").unwrap());
    }

    #[test]
    fn test_parse_class_range_and_negation() {
        match parse("[a-c_]").unwrap() {
            Ast::Class(class) => {
                assert!(class.ascii.contains(b'b'));
                assert!(class.ascii.contains(b'_'));
                assert!(!class.ascii.contains(b'd'));
                assert!(!class.non_ascii);
            }
            other => panic!("unexpected ast: {:?}", other),
        }
        match parse("[^/]").unwrap() {
            Ast::Class(class) => {
                assert!(!class.ascii.contains(b'/'));
                assert!(class.non_ascii);
            }
            other => panic!("unexpected ast: {:?}", other),
        }
    }

    #[test]
    fn test_class_leading_bracket_and_dash() {
        match parse("[]a-]").unwrap() {
            Ast::Class(class) => {
                assert!(class.ascii.contains(b']'));
                assert!(class.ascii.contains(b'-'));
                assert!(class.ascii.contains(b'a'));
            }
            other => panic!("unexpected ast: {:?}", other),
        }
    }

    #[test]
    fn test_named_and_non_capturing_groups() {
        assert_eq!(parse("(?:ab)").unwrap(), parse("(ab)").unwrap());
        assert_eq!(parse("(?P<verb>ab)").unwrap(), parse("(ab)").unwrap());
        assert_eq!(parse("(?<verb>ab)").unwrap(), parse("(ab)").unwrap());
    }

    #[test]
    fn test_unsupported_constructs() {
        for pattern in [r"(?i)git", r"\bgit\b", r"\p{L}", r"(?=x)", r"[[:alpha:]]", r"\x41"] {
            assert!(
                matches!(parse(pattern), Err(PatternError::Unsupported { .. })),
                "expected {} to be unsupported",
                pattern
            );
        }
    }

    #[test]
    fn test_syntax_errors_carry_offset() {
        match parse("ab(c") {
            Err(PatternError::Syntax { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(parse("a)"), Err(PatternError::Syntax { .. })));
        assert!(matches!(parse("*a"), Err(PatternError::Syntax { .. })));
    }

    #[test]
    fn test_repeat_limit() {
        assert!(matches!(
            parse("a{1001}"),
            Err(PatternError::TooComplex { .. })
        ));
    }
}
