//! Credits under concurrent load

use std::sync::Arc;

use cmdgate::engine::credits::CreditLedger;
use cmdgate::{CommandRequest, FailClosedJudge, RuleAction, VerdictStatus};

use crate::support::{harness, StubJudge};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_k_credits_allow_exactly_k_executions() {
    const N: usize = 64;
    const K: u64 = 10;

    let h = Arc::new(harness(&[("^ls", RuleAction::AutoAccept)], K, Arc::new(FailClosedJudge)));

    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.engine.evaluate(CommandRequest::new("alice", "ls")).await })
        })
        .collect();

    let mut executed = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap().status {
            VerdictStatus::Executed => executed += 1,
            VerdictStatus::InsufficientCredits => refused += 1,
            other => panic!("unexpected status {:?}", other),
        }
    }

    assert_eq!(executed, K as usize);
    assert_eq!(refused, N - K as usize);
    assert_eq!(h.ledger.balance("alice"), 0);
    h.engine.flush_audit().await;
    assert_eq!(h.audit.len(), N);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_commands_do_not_consume_credits_under_load() {
    let h = Arc::new(harness(&[("^sudo", RuleAction::AutoReject)], 5, StubJudge::blocking()));

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let h = Arc::clone(&h);
            let command = if i % 2 == 0 { "sudo reboot" } else { "python job.py" };
            tokio::spawn(async move { h.engine.evaluate(CommandRequest::new("bob", command)).await })
        })
        .collect();

    for task in tasks {
        let verdict = task.await.unwrap();
        assert!(!verdict.is_executed());
    }
    assert_eq!(h.ledger.balance("bob"), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requesters_are_independent() {
    let h = Arc::new(harness(&[], 3, Arc::new(FailClosedJudge)));

    let tasks: Vec<_> = ["alice", "bob", "carol"]
        .into_iter()
        .flat_map(|who| (0..5).map(move |_| who))
        .map(|who| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.engine.evaluate(CommandRequest::new(who, "pwd")).await })
        })
        .collect();

    let mut executed = 0;
    for task in tasks {
        if task.await.unwrap().is_executed() {
            executed += 1;
        }
    }
    assert_eq!(executed, 9);
    for who in ["alice", "bob", "carol"] {
        assert_eq!(h.ledger.balance(who), 0);
    }
}
