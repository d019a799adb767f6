//! Product construction and emptiness for two NFAs
//!
//! A product node pairs one state of each automaton with two flags shared by
//! both sides: whether any byte has been consumed (so `^` can no longer
//! pass) and whether `$` has been asserted (so no further byte may be
//! consumed). The languages intersect iff a node where both sides accept is
//! reachable from the paired start states.
//!
//! The search is a 0-1 BFS (free moves cost 0, byte moves cost 1), so the
//! first accepting node popped yields a shortest common string.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{Label, Nfa, StateId};

/// Outcome of an intersection test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intersection {
    /// No string is accepted by both automata
    Empty,
    /// Both accept `witness`
    NonEmpty { witness: String },
    /// The product grew past the node budget before a verdict was reached
    BudgetExceeded { explored: usize },
}

impl Intersection {
    pub fn is_empty(&self) -> bool {
        matches!(self, Intersection::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Node {
    a: StateId,
    b: StateId,
    consumed: bool,
    ended: bool,
}

#[derive(Debug, Clone, Copy)]
struct Visit {
    dist: usize,
    parent: Option<(Node, Option<u8>)>,
}

/// Decide whether `a` and `b` accept a common string, exploring at most
/// `budget` product nodes
pub fn intersect(a: &Nfa, b: &Nfa, budget: usize) -> Intersection {
    let start = Node {
        a: a.start,
        b: b.start,
        consumed: false,
        ended: false,
    };

    let mut visits: HashMap<Node, Visit> = HashMap::new();
    visits.insert(
        start,
        Visit {
            dist: 0,
            parent: None,
        },
    );
    let mut queue = VecDeque::from([start]);
    let mut settled = HashSet::new();

    while let Some(node) = queue.pop_front() {
        if !settled.insert(node) {
            continue;
        }
        if node.a == a.accept && node.b == b.accept {
            return Intersection::NonEmpty {
                witness: reconstruct(&visits, node),
            };
        }
        if visits.len() > budget {
            return Intersection::BudgetExceeded {
                explored: visits.len(),
            };
        }

        let dist = visits[&node].dist;

        for (next, byte) in successors(a, b, node) {
            let cost = usize::from(byte.is_some());
            let candidate = dist + cost;
            let better = visits.get(&next).map_or(true, |v| candidate < v.dist);
            if better {
                visits.insert(
                    next,
                    Visit {
                        dist: candidate,
                        parent: Some((node, byte)),
                    },
                );
                if cost == 0 {
                    queue.push_front(next);
                } else {
                    queue.push_back(next);
                }
            }
        }
    }

    Intersection::Empty
}

/// Every move out of `node`, tagged with the byte consumed (if any)
fn successors(a: &Nfa, b: &Nfa, node: Node) -> Vec<(Node, Option<u8>)> {
    let mut out = Vec::new();

    // free moves on either side
    for t in &a.states[node.a].transitions {
        if let Some(ended) = free_move(t.label, node) {
            out.push((Node { a: t.to, ended, ..node }, None));
        }
    }
    for t in &b.states[node.b].transitions {
        if let Some(ended) = free_move(t.label, node) {
            out.push((Node { b: t.to, ended, ..node }, None));
        }
    }

    // joint byte moves
    if !node.ended {
        for ta in &a.states[node.a].transitions {
            let Label::Bytes(ca) = ta.label else { continue };
            for tb in &b.states[node.b].transitions {
                let Label::Bytes(cb) = tb.label else { continue };
                if let Some(byte) = ca.intersection(&cb).representative() {
                    out.push((
                        Node {
                            a: ta.to,
                            b: tb.to,
                            consumed: true,
                            ended: false,
                        },
                        Some(byte),
                    ));
                }
            }
        }
    }

    out
}

/// Whether a zero-width label can be taken from `node`; returns the new
/// `ended` flag
fn free_move(label: Label, node: Node) -> Option<bool> {
    match label {
        Label::Epsilon => Some(node.ended),
        Label::StartOfText if !node.consumed => Some(node.ended),
        Label::EndOfText => Some(true),
        _ => None,
    }
}

fn reconstruct(visits: &HashMap<Node, Visit>, end: Node) -> String {
    let mut bytes = Vec::new();
    let mut cur = end;
    while let Some((parent, byte)) = visits.get(&cur).and_then(|v| v.parent) {
        if let Some(byte) = byte {
            bytes.push(byte);
        }
        cur = parent;
    }
    bytes.reverse();
    String::from_utf8_lossy(&bytes).into_owned()
}
