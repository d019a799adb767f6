//! Shell parsing utilities for cmdgate
//!
//! Tokenization, compound-command splitting and wrapper unwrapping for the
//! Layer 2 scorer.

pub mod shell;
pub mod wrapper;
