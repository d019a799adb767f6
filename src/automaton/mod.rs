//! Finite automata over the command alphabet
//!
//! Rule patterns are compiled into plain-data Thompson NFAs so that overlap
//! between two rules can be decided exactly, independent of any regex engine.
//! The alphabet is UTF-8 bytes; transitions carry a byte class rather than a
//! single symbol.
//!
//! The language of a compiled pattern is its *search* language: every string
//! in which the pattern finds a match somewhere, with `^`/`$` still pinned to
//! the ends of the whole string. That is the same question Layer 1 asks of the
//! regex engine, so two rules overlap exactly when some command would be
//! matched by both.

pub mod compile;
pub mod parser;
pub mod product;

pub use compile::{compile, MAX_STATES};
pub use parser::{parse, Ast, CharClass, MAX_REPEAT};
pub use product::{intersect, Intersection};

use std::collections::HashSet;
use std::fmt;

/// Index of a state inside an [`Nfa`]
pub type StateId = usize;

/// A set of bytes, stored as a 256-bit bitmap
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteClass([u64; 4]);

impl ByteClass {
    pub const fn empty() -> Self {
        Self([0; 4])
    }

    pub const fn full() -> Self {
        Self([u64::MAX; 4])
    }

    pub fn single(byte: u8) -> Self {
        let mut class = Self::empty();
        class.insert(byte);
        class
    }

    pub fn range(lo: u8, hi: u8) -> Self {
        let mut class = Self::empty();
        class.insert_range(lo, hi);
        class
    }

    pub fn insert(&mut self, byte: u8) {
        self.0[(byte >> 6) as usize] |= 1u64 << (byte & 63);
    }

    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        if lo > hi {
            return;
        }
        for byte in lo..=hi {
            self.insert(byte);
        }
    }

    pub fn remove(&mut self, byte: u8) {
        self.0[(byte >> 6) as usize] &= !(1u64 << (byte & 63));
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.0[(byte >> 6) as usize] & (1u64 << (byte & 63)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, rhs) in out.0.iter_mut().zip(other.0.iter()) {
            *word |= rhs;
        }
        out
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, rhs) in out.0.iter_mut().zip(other.0.iter()) {
            *word &= rhs;
        }
        out
    }

    /// Complement within the ASCII range (0x00..=0x7F)
    pub fn ascii_complement(&self) -> Self {
        let mut out = Self::empty();
        for byte in 0u8..=0x7F {
            if !self.contains(byte) {
                out.insert(byte);
            }
        }
        out
    }

    /// Pick a representative byte, preferring ones that read well in a witness
    pub fn representative(&self) -> Option<u8> {
        const PREFERENCE: [(u8, u8); 5] = [
            (b'a', b'z'),
            (b'0', b'9'),
            (b'A', b'Z'),
            (b' ', b'~'),
            (0x00, 0xFF),
        ];
        PREFERENCE
            .iter()
            .find_map(|&(lo, hi)| (lo..=hi).find(|b| self.contains(*b)))
    }
}

impl fmt::Debug for ByteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ranges = Vec::new();
        let mut byte = 0u16;
        while byte <= 0xFF {
            if self.contains(byte as u8) {
                let lo = byte;
                while byte < 0xFF && self.contains((byte + 1) as u8) {
                    byte += 1;
                }
                ranges.push(if lo == byte {
                    format!("{:02x}", lo)
                } else {
                    format!("{:02x}-{:02x}", lo, byte)
                });
            }
            byte += 1;
        }
        write!(f, "[{}]", ranges.join(","))
    }
}

/// What a transition consumes or asserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Free move
    Epsilon,
    /// Consume one byte from the class
    Bytes(ByteClass),
    /// Zero-width: only at offset 0
    StartOfText,
    /// Zero-width: only at the end of the input
    EndOfText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub label: Label,
    pub to: StateId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub transitions: Vec<Transition>,
}

/// A nondeterministic automaton with a single start and a single accepting state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nfa {
    pub(crate) states: Vec<State>,
    pub(crate) start: StateId,
    pub(crate) accept: StateId,
}

impl Nfa {
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn accept(&self) -> StateId {
        self.accept
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Run the automaton over `input` by state-set simulation
    pub fn is_match(&self, input: &str) -> bool {
        let bytes = input.as_bytes();
        let len = bytes.len();

        let mut current = HashSet::new();
        current.insert(self.start);
        let mut current = self.closure(current, 0, len);

        for (pos, byte) in bytes.iter().enumerate() {
            let mut next = HashSet::new();
            for &state in &current {
                for t in &self.states[state].transitions {
                    if let Label::Bytes(class) = t.label {
                        if class.contains(*byte) {
                            next.insert(t.to);
                        }
                    }
                }
            }
            if next.is_empty() {
                return false;
            }
            current = self.closure(next, pos + 1, len);
        }

        current.contains(&self.accept)
    }

    /// Epsilon closure, following assertions that hold at `pos`
    fn closure(&self, seed: HashSet<StateId>, pos: usize, len: usize) -> HashSet<StateId> {
        let mut stack: Vec<StateId> = seed.iter().copied().collect();
        let mut seen = seed;

        while let Some(state) = stack.pop() {
            for t in &self.states[state].transitions {
                let passable = match t.label {
                    Label::Epsilon => true,
                    Label::StartOfText => pos == 0,
                    Label::EndOfText => pos == len,
                    Label::Bytes(_) => false,
                };
                if passable && seen.insert(t.to) {
                    stack.push(t.to);
                }
            }
        }

        seen
    }
}
