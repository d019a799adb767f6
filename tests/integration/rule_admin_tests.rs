//! Rule-authoring path: validation, overlap detection, versioning

use cmdgate::rules::ConflictKind;
use cmdgate::{ConflictDetector, PatternError, RuleAction, RuleAdminError, RuleDraft, RuleStore};

fn draft(pattern: &str, action: RuleAction) -> RuleDraft {
    RuleDraft::new(pattern, action)
}

#[test]
fn test_subset_rule_hard_conflict_with_witness() {
    let store = RuleStore::default();
    store
        .create(draft("^sudo apt update$", RuleAction::AutoAccept))
        .unwrap();

    let err = store
        .create(draft("^sudo .*", RuleAction::AutoReject))
        .unwrap_err();

    match err {
        RuleAdminError::HardConflict(report) => {
            let hard = report.first_hard().unwrap();
            assert_eq!(hard.rule_id, "rule_001");
            assert_eq!(hard.witness, "sudo apt update");
        }
        other => panic!("expected hard conflict, got {:?}", other),
    }
    assert_eq!(store.snapshot().len(), 1);
}

#[test]
fn test_hard_conflict_regardless_of_order() {
    let pairs = [
        ("^curl .*\\| *sh", "^curl "),
        ("^rm -rf", "^rm( -[a-z]+)* /tmp"),
        ("^git push", "push"),
    ];
    for (a, b) in pairs {
        let forward = RuleStore::default();
        forward.create(draft(a, RuleAction::AutoAccept)).unwrap();
        assert!(
            matches!(
                forward.create(draft(b, RuleAction::AutoReject)),
                Err(RuleAdminError::HardConflict(_))
            ),
            "{} then {}",
            a,
            b
        );

        let backward = RuleStore::default();
        backward.create(draft(b, RuleAction::AutoReject)).unwrap();
        assert!(
            matches!(
                backward.create(draft(a, RuleAction::AutoAccept)),
                Err(RuleAdminError::HardConflict(_))
            ),
            "{} then {}",
            b,
            a
        );
    }
}

#[test]
fn test_disjoint_anchored_rules_coexist() {
    let store = RuleStore::default();
    store.create(draft("^git (pull|fetch|status)", RuleAction::AutoAccept)).unwrap();
    store.create(draft("^rm -rf", RuleAction::AutoReject)).unwrap();
    store.create(draft("^sudo", RuleAction::AutoReject)).unwrap();
    let write = store.create(draft("^ls|^pwd|^echo", RuleAction::AutoAccept)).unwrap();
    assert!(write.report.is_clear());
    assert_eq!(store.snapshot().len(), 4);
}

#[test]
fn test_end_anchor_separates_languages() {
    let store = RuleStore::default();
    store.create(draft("^ls$", RuleAction::AutoAccept)).unwrap();
    let write = store.create(draft("^ls -la /root$", RuleAction::AutoReject));
    assert!(write.is_ok());
}

#[test]
fn test_soft_overlap_reported() {
    let store = RuleStore::default();
    store.create(draft("^git ", RuleAction::AutoAccept)).unwrap();
    let write = store.create(draft("^git (pull|fetch)", RuleAction::AutoAccept)).unwrap();
    let soft: Vec<_> = write.report.soft().collect();
    assert_eq!(soft.len(), 1);
    assert_eq!(soft[0].kind, ConflictKind::Soft);
    assert!(soft[0].witness.starts_with("git "));
}

#[test]
fn test_soft_overlap_blocked_by_policy() {
    let store = RuleStore::new(ConflictDetector::default(), true);
    store.create(draft("^git ", RuleAction::AutoAccept)).unwrap();
    assert!(matches!(
        store.create(draft("^git pull", RuleAction::AutoAccept)),
        Err(RuleAdminError::SoftConflict(_))
    ));
}

#[test]
fn test_invalid_pattern_names_offender() {
    let store = RuleStore::default();
    let err = store.create(draft("^git (pull", RuleAction::AutoAccept)).unwrap_err();
    match err {
        RuleAdminError::Validation(e) => assert_eq!(e.pattern(), "^git (pull"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_out_of_subset_patterns_rejected() {
    let store = RuleStore::default();
    for pattern in [r"(?i)^git", r"^git(?=\s)", r"\bgit\b", r"(a)\1", r"\p{L}+"] {
        let err = store.create(draft(pattern, RuleAction::AutoAccept)).unwrap_err();
        assert!(
            matches!(err, RuleAdminError::Validation(_)),
            "{} should be rejected",
            pattern
        );
    }
    assert!(store.snapshot().is_empty());
}

#[test]
fn test_budget_exhaustion_fails_closed() {
    let store = RuleStore::new(ConflictDetector::new(16), false);
    store.create(draft("^(a|b)*c(a|b){20}$", RuleAction::AutoAccept)).unwrap();
    let err = store
        .create(draft("^(a|b)*d(a|b){20}$", RuleAction::AutoReject))
        .unwrap_err();
    assert!(matches!(
        err,
        RuleAdminError::Validation(PatternError::TooComplex { .. })
    ));
}

#[test]
fn test_check_is_idempotent_and_side_effect_free() {
    let store = RuleStore::default();
    store.create(draft("^sudo apt update$", RuleAction::AutoAccept)).unwrap();
    let version = store.version();

    let candidate = draft("^sudo .*", RuleAction::AutoReject);
    let first = store.check(&candidate).unwrap();
    let second = store.check(&candidate).unwrap();

    assert_eq!(first, second);
    assert!(first.has_hard());
    assert_eq!(store.version(), version);
}

#[test]
fn test_edit_into_conflict_rejected() {
    let store = RuleStore::default();
    store.create(draft("^make$", RuleAction::AutoAccept)).unwrap();
    let other = store.create(draft("^cargo build", RuleAction::AutoReject)).unwrap();

    let err = store
        .update(&other.rule.id, draft("^make", RuleAction::AutoReject))
        .unwrap_err();
    assert!(matches!(err, RuleAdminError::HardConflict(_)));
    assert_eq!(
        store.snapshot().get(&other.rule.id).unwrap().pattern.as_str(),
        "^cargo build"
    );
}

#[test]
fn test_reactivation_rechecks() {
    let store = RuleStore::default();
    let parked = store
        .create(draft("^sudo", RuleAction::AutoReject).inactive())
        .unwrap();
    store.create(draft("^sudo apt update$", RuleAction::AutoAccept)).unwrap();

    assert!(matches!(
        store.set_active(&parked.rule.id, true),
        Err(RuleAdminError::HardConflict(_))
    ));
    assert!(!store.snapshot().get(&parked.rule.id).unwrap().active);
}

#[test]
fn test_concurrent_writers_cannot_both_pass() {
    use std::sync::Arc;

    let store = Arc::new(RuleStore::default());
    let accept = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || store.create(draft("^deploy prod$", RuleAction::AutoAccept)))
    };
    let reject = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || store.create(draft("^deploy ", RuleAction::AutoReject)))
    };

    let results = [accept.join().unwrap(), reject.join().unwrap()];
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1);
    assert_eq!(store.snapshot().len(), 1);
}

#[test]
fn test_compare_and_swap_create() {
    let store = RuleStore::default();
    let version = store.version();
    store.create(draft("^ls", RuleAction::AutoAccept)).unwrap();

    let err = store
        .create_if_version(version, draft("^pwd", RuleAction::AutoAccept))
        .unwrap_err();
    assert!(matches!(err, RuleAdminError::StaleVersion { .. }));

    assert!(store
        .create_if_version(store.version(), draft("^pwd", RuleAction::AutoAccept))
        .is_ok());
}
