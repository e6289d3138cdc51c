use statute::core::config::{Config, DEFAULT_LEASE_TIMEOUT_SECS};
use statute::core::decoration::{AmendmentState, LawState};
use statute::core::error::{Precondition, StatuteError};
use statute::core::gatekeeper::{Gate, GateRequest};
use statute::core::grants;
use statute::core::hash_chain;
use statute::core::lease::{self, EVALUATION_LEASE, LeaseOutcome};
use statute::core::lifecycle::{
    AMENDMENTS_HASH, APPLY_OK_AT, DriftOutcome, Engine, LAST_RECONCILED, STALE_ARTICLE_PATH,
    STALE_REASON, SuitabilityVerdict,
};
use statute::core::record::Record;
use statute::core::store::Store;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tempfile::tempdir;

fn init_engine(root: &Path) -> Engine {
    let engine = Engine::open(Store::new(root)).unwrap();
    engine.init().unwrap();
    engine
}

fn write_review(engine: &Engine, ts: &str, body: &str) -> PathBuf {
    let path = engine.store().amendments_dir().join(format!("🔍 {ts}"));
    fs::write(&path, format!("---\nstatus: review\n---\n{body}\n")).unwrap();
    path
}

/// Review record with a matching APPLY_OK verdict, ready to promote.
fn ratified(engine: &Engine, ts: &str, body: &str) -> PathBuf {
    let path = write_review(engine, ts, body);
    engine
        .apply_suitability(&path, &SuitabilityVerdict::ApplyOk)
        .unwrap()
}

fn law_record(engine: &Engine) -> (PathBuf, LawState, Record) {
    let (path, state) = engine.store().discover_law().unwrap();
    let rec = Record::read(&path).unwrap();
    (path, state, rec)
}

#[test]
fn init_creates_active_law_over_empty_chain() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());

    let (path, state, rec) = law_record(&engine);
    assert_eq!(state, LawState::Active);
    assert!(path.ends_with("📜 LAW"));
    let empty: [(&str, &str); 0] = [];
    assert_eq!(
        rec.header.get(AMENDMENTS_HASH),
        Some(hash_chain::digest(&empty).as_str())
    );

    // Second init leaves the law alone.
    let report = engine.init().unwrap();
    assert!(!report.created);
}

#[test]
fn promotion_then_reconcile_restores_active_law() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = ratified(&engine, "20260209101538", "Agents must cite sources.");

    let promotion = engine.promote(&review).unwrap();
    assert_eq!(promotion.accepted, ".constitution/amendments/✅ 20260209101538");
    assert!(promotion.law_marked_resolving);
    assert!(!review.exists());

    let accepted = Record::read(&engine.store().resolve(&promotion.accepted)).unwrap();
    assert!(!accepted.header.contains("status"));
    assert!(accepted.header.contains(APPLY_OK_AT));

    let (_, state, law) = law_record(&engine);
    assert_eq!(state, LawState::Resolving);
    assert_eq!(law.header.get(STALE_REASON), Some("record_accepted"));
    assert_eq!(
        law.header.get(STALE_ARTICLE_PATH),
        Some(promotion.accepted.as_str())
    );

    let rec = engine.reconcile().unwrap();
    assert_eq!(rec.previous_state, LawState::Resolving);
    assert_eq!(rec.last_reconciled_amendment.as_deref(), Some("20260209101538"));

    let expected = hash_chain::digest(&[(
        ".constitution/amendments/✅ 20260209101538",
        "Agents must cite sources.",
    )]);
    let (_, state, law) = law_record(&engine);
    assert_eq!(state, LawState::Active);
    assert_eq!(law.header.get(AMENDMENTS_HASH), Some(expected.as_str()));
    assert_eq!(law.header.get(LAST_RECONCILED), Some("20260209101538"));
    assert!(!law.header.contains(STALE_REASON));

    assert_eq!(
        engine.check_drift().unwrap(),
        DriftOutcome::Clean {
            amendments_hash: expected
        }
    );
}

#[test]
fn promote_refuses_body_edited_after_verdict() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = ratified(&engine, "20260209101538", "original text");

    let text = fs::read_to_string(&review).unwrap();
    fs::write(&review, text.replace("original text", "edited text")).unwrap();

    let err = engine.promote(&review).unwrap_err();
    assert!(matches!(
        err,
        StatuteError::Precondition(Precondition::ApplyOkMismatch { .. })
    ));
    assert_eq!(err.code(), "APPLY_OK_MISMATCH");
    assert!(review.is_file());
    assert_eq!(engine.store().discover_law().unwrap().1, LawState::Active);
}

#[test]
fn promote_requires_review_status() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let draft = engine.store().amendments_dir().join("📝 20260209101538");
    fs::write(&draft, "---\nstatus: draft\n---\nbody\n").unwrap();

    assert!(matches!(
        engine.promote(&draft),
        Err(StatuteError::Precondition(Precondition::StatusNotReview { .. }))
    ));
}

#[test]
fn interrupted_promotion_is_finished_on_retry() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = ratified(&engine, "20260209101538", "body");

    // Crash after the accepted copy landed but before cleanup.
    let accepted = engine.store().amendments_dir().join("✅ 20260209101538");
    fs::copy(&review, &accepted).unwrap();

    let promotion = engine.promote(&review).unwrap();
    assert!(promotion.already_accepted);
    assert!(!review.exists());
    // The retry's drift check notices the accepted set moved.
    assert_eq!(engine.store().discover_law().unwrap().1, LawState::Resolving);
}

#[test]
fn drift_from_unmanaged_acceptance_marks_law_resolving() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    fs::write(
        engine.store().amendments_dir().join("✅ 20260101000000"),
        "smuggled in\n",
    )
    .unwrap();

    let outcome = engine.check_drift().unwrap();
    assert!(matches!(outcome, DriftOutcome::Drifted { .. }));
    let (_, state, law) = law_record(&engine);
    assert_eq!(state, LawState::Resolving);
    assert_eq!(law.header.get(STALE_REASON), Some("amendments_drift_detected"));

    assert_eq!(
        engine.check_drift().unwrap(),
        DriftOutcome::NotActive {
            state: LawState::Resolving
        }
    );
}

#[test]
fn malformed_law_is_corrupted_and_refuses_reconcile() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let (path, _, _) = law_record(&engine);
    fs::write(&path, "---\namendments_hash: abc\nno closing fence\n").unwrap();

    assert!(matches!(
        engine.check_drift().unwrap(),
        DriftOutcome::Corrupted { .. }
    ));
    assert_eq!(engine.store().discover_law().unwrap().1, LawState::Corrupted);
    assert!(matches!(
        engine.reconcile(),
        Err(StatuteError::LawCorrupted(_))
    ));
}

#[test]
fn promotion_over_malformed_law_corrupts_it_instead_of_resolving() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let (path, _, _) = law_record(&engine);
    fs::write(&path, "garbage without any header").unwrap();
    let review = ratified(&engine, "20260209101538", "body");

    let promotion = engine.promote(&review).unwrap();
    assert!(!promotion.law_marked_resolving);
    assert_eq!(engine.store().discover_law().unwrap().1, LawState::Corrupted);
    assert!(matches!(
        engine.reconcile(),
        Err(StatuteError::LawCorrupted(_))
    ));
    let events = engine.journal().events().unwrap();
    assert!(events.iter().any(|e| e.op == "law.corrupted"));
    assert!(!events.iter().any(|e| e.op == "law.resolving"));
}

#[test]
fn reconcile_without_law_is_an_error() {
    let tmp = tempdir().unwrap();
    let engine = Engine::open(Store::new(tmp.path())).unwrap();
    assert!(matches!(engine.reconcile(), Err(StatuteError::LawNotFound)));
}

#[test]
fn needs_input_verdict_returns_record_to_draft() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = write_review(&engine, "20260209101538", "vague rule");

    let verdict = SuitabilityVerdict::NeedsInput {
        reason_code: "AMBIGUOUS".into(),
        request: "Which directories does this cover?".into(),
    };
    let moved = engine.apply_suitability(&review, &verdict).unwrap();
    assert!(moved.ends_with("📝 20260209101538"));
    let rec = Record::read(&moved).unwrap();
    assert_eq!(rec.status(), "needs_input");
    assert_eq!(rec.header.get(APPLY_OK_AT), Some("❌"));

    let empty = SuitabilityVerdict::NeedsInput {
        reason_code: " ".into(),
        request: "x".into(),
    };
    assert!(matches!(
        engine.apply_suitability(&moved, &empty),
        Err(StatuteError::Precondition(
            Precondition::MissingNeedsInputDetail
        ))
    ));
}

#[test]
fn pending_founding_is_evaluated_before_amendments() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    write_review(&engine, "20260209101538", "amendment");
    fs::write(
        engine.store().founding_path(AmendmentState::Review),
        "---\nstatus: review\n---\nWe the agents.\n",
    )
    .unwrap();

    let pending = engine.records_needing_evaluation().unwrap();
    assert_eq!(pending, vec![engine.store().founding_path(AmendmentState::Review)]);
}

#[test]
fn concurrent_lease_claims_admit_one_worker() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let target = Arc::new(write_review(&engine, "20260209101538", "contested"));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let target = Arc::clone(&target);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                lease::try_acquire(&target, EVALUATION_LEASE, Duration::from_secs(300)).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<LeaseOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| o.may_proceed()).count(), 1);
    assert!(lease::holder_since(&target, EVALUATION_LEASE).unwrap().is_some());
}

#[test]
fn gate_protects_accepted_records_and_admits_new_drafts() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = ratified(&engine, "20260209101538", "body");
    let promotion = engine.promote(&review).unwrap();
    engine.reconcile().unwrap();
    let gate = Gate::new(&engine);

    let edit_accepted = GateRequest::Write {
        paths: vec![PathBuf::from(&promotion.accepted)],
        content: "tampered".into(),
    };
    assert!(!gate.decide(&edit_accepted, None).unwrap().is_allowed());

    let new_draft = GateRequest::Write {
        paths: vec![PathBuf::from(".constitution/amendments/📝 20260301000000")],
        content: "---\nstatus: draft\n---\nNew rule.\n".into(),
    };
    assert!(gate.decide(&new_draft, None).unwrap().is_allowed());

    let new_review = GateRequest::Write {
        paths: vec![PathBuf::from(".constitution/amendments/🔍 20260301000000")],
        content: "---\nstatus: review\n---\nNew rule.\n".into(),
    };
    assert!(!gate.decide(&new_review, None).unwrap().is_allowed());

    let rm = GateRequest::Shell {
        command: format!("rm \"{}\"", promotion.accepted),
    };
    let decision = gate.decide(&rm, None).unwrap();
    assert!(!decision.is_allowed());
    assert_eq!(decision.rule, "mutating_command");

    let promote = GateRequest::Shell {
        command: "statute promote --article \".constitution/amendments/🔍 20260301000000\"".into(),
    };
    assert!(gate.decide(&promote, None).unwrap().is_allowed());

    let chained = GateRequest::Shell {
        command: "statute verify; rm -rf .constitution/amendments".into(),
    };
    assert!(!gate.decide(&chained, None).unwrap().is_allowed());

    let events = engine.journal().events().unwrap();
    assert!(events.iter().any(|e| e.op == "gate.shell" && e.status == "deny"));
}

#[test]
fn resolving_law_is_writable_only_by_granted_invocation() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = ratified(&engine, "20260209101538", "body");
    engine.promote(&review).unwrap();
    let gate = Gate::new(&engine);

    let (law, state) = engine.store().discover_law().unwrap();
    assert_eq!(state, LawState::Resolving);
    let write = GateRequest::Write {
        paths: vec![law],
        content: "# LAW\n\nCite sources.\n".into(),
    };

    assert!(!gate.decide(&write, Some("codifier-1")).unwrap().is_allowed());
    grants::mint(engine.store(), "reconcile").unwrap();
    assert!(gate.decide(&write, Some("codifier-1")).unwrap().is_allowed());
    assert!(gate.decide(&write, Some("codifier-1")).unwrap().is_allowed());
    assert!(!gate.decide(&write, Some("intruder")).unwrap().is_allowed());
    assert!(!gate.decide(&write, None).unwrap().is_allowed());

    engine.reconcile().unwrap();
    let (active_law, _) = engine.store().discover_law().unwrap();
    let write_active = GateRequest::Write {
        paths: vec![active_law],
        content: "x".into(),
    };
    assert!(!gate.decide(&write_active, Some("codifier-1")).unwrap().is_allowed());
}

#[test]
fn agent_cannot_mint_its_own_grant_for_resolving_law() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = ratified(&engine, "20260209101538", "body");
    engine.promote(&review).unwrap();
    let gate = Gate::new(&engine);

    for command in [
        "statute grant mint",
        "cargo run -- grant mint --purpose reconcile",
        "statute grant revoke --invocation codifier-1",
    ] {
        let mint = GateRequest::Shell {
            command: command.into(),
        };
        let decision = gate.decide(&mint, Some("rogue")).unwrap();
        assert!(!decision.is_allowed(), "{command}");
        assert_eq!(decision.rule, "unsanctioned_procedure");
    }

    let forge = GateRequest::Write {
        paths: vec![engine.store().grants_path()],
        content: r#"{"pending":[{"token":"t","minted_at":"0Z","purpose":"reconcile"}]}"#.into(),
    };
    assert!(!gate.decide(&forge, Some("rogue")).unwrap().is_allowed());

    let (law, _) = engine.store().discover_law().unwrap();
    let edit = GateRequest::Write {
        paths: vec![law],
        content: "# LAW\n\nWhatever I like.\n".into(),
    };
    assert!(!gate.decide(&edit, Some("rogue")).unwrap().is_allowed());
    assert!(grants::ledger(engine.store()).unwrap().pending.is_empty());
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    assert_eq!(
        Engine::open(store.clone()).unwrap().config().lease_timeout_secs,
        DEFAULT_LEASE_TIMEOUT_SECS
    );

    fs::create_dir_all(store.constitution_dir()).unwrap();
    fs::write(store.config_path(), "lease_timeout_secs = 45\n").unwrap();
    let config = Config::load(&store).unwrap();
    assert_eq!(config.lease_timeout_secs, 45);
}

#[test]
fn journal_lines_stay_parseable_under_concurrent_writers() {
    let tmp = tempdir().unwrap();
    let engine = Arc::new(init_engine(tmp.path()));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    engine
                        .journal()
                        .record("concurrent_append", Some(&format!("worker-{i}")), "success", None)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let raw = fs::read_to_string(engine.store().journal_path()).unwrap();
    let appended = raw
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .filter(|v| v["op"] == "concurrent_append")
        .count();
    assert_eq!(appended, 120);
}
