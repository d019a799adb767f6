//! Thompson construction from [`Ast`] to [`Nfa`]

use super::parser::{parse, Ast, CharClass};
use super::{ByteClass, Label, Nfa, State, StateId, Transition};
use crate::errors::PatternError;

/// Largest automaton a single pattern may compile into
pub const MAX_STATES: usize = 50_000;

/// Compile a pattern into the NFA of its search language
///
/// The pattern body is wrapped in `Σ*` loops on both sides, so the automaton
/// accepts exactly the strings in which an unanchored search would find a
/// match. Anchors inside the body still only pass at the true ends.
pub fn compile(pattern: &str) -> Result<Nfa, PatternError> {
    let ast = parse(pattern)?;
    let mut builder = Builder {
        pattern,
        states: Vec::new(),
    };

    let start = builder.add_state()?;
    builder.edge(start, Label::Bytes(ByteClass::full()), start);

    let (body_start, body_end) = builder.build(&ast)?;
    builder.edge(start, Label::Epsilon, body_start);

    let accept = builder.add_state()?;
    builder.edge(body_end, Label::Epsilon, accept);
    builder.edge(accept, Label::Bytes(ByteClass::full()), accept);

    Ok(Nfa {
        states: builder.states,
        start,
        accept,
    })
}

struct Builder<'a> {
    pattern: &'a str,
    states: Vec<State>,
}

impl<'a> Builder<'a> {
    fn add_state(&mut self) -> Result<StateId, PatternError> {
        if self.states.len() >= MAX_STATES {
            return Err(PatternError::TooComplex {
                pattern: self.pattern.to_string(),
                reason: format!("automaton exceeds {} states", MAX_STATES),
            });
        }
        self.states.push(State::default());
        Ok(self.states.len() - 1)
    }

    fn edge(&mut self, from: StateId, label: Label, to: StateId) {
        self.states[from].transitions.push(Transition { label, to });
    }

    /// Emit a fragment for `ast`, returning its entry and exit states
    fn build(&mut self, ast: &Ast) -> Result<(StateId, StateId), PatternError> {
        match ast {
            Ast::Empty => {
                let s = self.add_state()?;
                Ok((s, s))
            }
            Ast::Literal(c) => {
                let mut buf = [0u8; 4];
                let bytes = c.encode_utf8(&mut buf).as_bytes();
                let entry = self.add_state()?;
                let mut cur = entry;
                for byte in bytes {
                    let next = self.add_state()?;
                    self.edge(cur, Label::Bytes(ByteClass::single(*byte)), next);
                    cur = next;
                }
                Ok((entry, cur))
            }
            Ast::Class(class) => self.build_class(class),
            Ast::StartOfText | Ast::EndOfText => {
                let label = if matches!(ast, Ast::StartOfText) {
                    Label::StartOfText
                } else {
                    Label::EndOfText
                };
                let entry = self.add_state()?;
                let exit = self.add_state()?;
                self.edge(entry, label, exit);
                Ok((entry, exit))
            }
            Ast::Concat(items) => {
                let entry = self.add_state()?;
                let mut cur = entry;
                for item in items {
                    let (s, e) = self.build(item)?;
                    self.edge(cur, Label::Epsilon, s);
                    cur = e;
                }
                Ok((entry, cur))
            }
            Ast::Alternate(branches) => {
                let entry = self.add_state()?;
                let exit = self.add_state()?;
                for branch in branches {
                    let (s, e) = self.build(branch)?;
                    self.edge(entry, Label::Epsilon, s);
                    self.edge(e, Label::Epsilon, exit);
                }
                Ok((entry, exit))
            }
            Ast::Repeat { inner, min, max } => self.build_repeat(inner, *min, *max),
        }
    }

    fn build_repeat(
        &mut self,
        inner: &Ast,
        min: u32,
        max: Option<u32>,
    ) -> Result<(StateId, StateId), PatternError> {
        let entry = self.add_state()?;
        let mut cur = entry;

        for _ in 0..min {
            let (s, e) = self.build(inner)?;
            self.edge(cur, Label::Epsilon, s);
            cur = e;
        }

        match max {
            None => {
                let hub = self.add_state()?;
                self.edge(cur, Label::Epsilon, hub);
                let (s, e) = self.build(inner)?;
                self.edge(hub, Label::Epsilon, s);
                self.edge(e, Label::Epsilon, hub);
                Ok((entry, hub))
            }
            Some(max) => {
                let exit = self.add_state()?;
                self.edge(cur, Label::Epsilon, exit);
                for _ in min..max {
                    let (s, e) = self.build(inner)?;
                    self.edge(cur, Label::Epsilon, s);
                    self.edge(e, Label::Epsilon, exit);
                    cur = e;
                }
                Ok((entry, exit))
            }
        }
    }

    /// ASCII members in one edge; non-ASCII scalars as UTF-8 byte sequences
    fn build_class(&mut self, class: &CharClass) -> Result<(StateId, StateId), PatternError> {
        let entry = self.add_state()?;
        let exit = self.add_state()?;

        if !class.ascii.is_empty() {
            self.edge(entry, Label::Bytes(class.ascii), exit);
        }

        if class.non_ascii {
            let cont = ByteClass::range(0x80, 0xBF);
            let leads = [
                (ByteClass::range(0xC2, 0xDF), 1),
                (ByteClass::range(0xE0, 0xEF), 2),
                (ByteClass::range(0xF0, 0xF4), 3),
            ];
            for (lead, continuation) in leads {
                let mut cur = self.add_state()?;
                self.edge(entry, Label::Bytes(lead), cur);
                for i in 0..continuation {
                    let next = if i + 1 == continuation {
                        exit
                    } else {
                        self.add_state()?
                    };
                    self.edge(cur, Label::Bytes(cont), next);
                    cur = next;
                }
            }
        }

        Ok((entry, exit))
    }
}
