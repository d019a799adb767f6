//! Integration tests for cmdgate

mod automaton_tests;
mod concurrency_tests;
mod pipeline_tests;
mod rule_admin_tests;
mod support;
