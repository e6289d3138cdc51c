use statute::core::decoration::LawState;
use statute::core::lifecycle::{AMENDMENTS_HASH, Engine, SuitabilityVerdict};
use statute::core::record::Record;
use statute::core::store::{Store, write_atomic};
use statute::plugins::verify::verify;
use std::fs;
use tempfile::tempdir;

fn init_engine(root: &std::path::Path) -> Engine {
    let engine = Engine::open(Store::new(root)).unwrap();
    engine.init().unwrap();
    engine
}

#[test]
fn test_missing_law_fails() {
    let tmp = tempdir().unwrap();
    let engine = Engine::open(Store::new(tmp.path())).unwrap();
    let report = verify(&engine).unwrap();
    assert!(!report.passed);
    assert_eq!(report.diagnostics[0]["code"], "LAW_NOT_FOUND");
    assert_eq!(report.lines().last().unwrap(), "RESULT=FAIL");
}

#[test]
fn test_fresh_law_passes() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let report = verify(&engine).unwrap();
    assert!(report.passed);
    assert!(report.summary.starts_with("OK    .constitution/📜 LAW"));
    assert!(report.diagnostics.is_empty());
}

#[test]
fn test_resolving_law_is_stale() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = engine
        .store()
        .amendments_dir()
        .join("🔍 20260209101538");
    fs::write(&review, "---\nstatus: review\n---\nbody\n").unwrap();
    let review = engine
        .apply_suitability(&review, &SuitabilityVerdict::ApplyOk)
        .unwrap();
    engine.promote(&review).unwrap();

    let report = verify(&engine).unwrap();
    assert!(!report.passed);
    assert_eq!(report.law_state, Some(LawState::Resolving));
    assert_eq!(report.diagnostics[0]["code"], "LAW_STALE");
}

#[test]
fn test_hash_mismatch_reported_without_transition() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let (path, _) = engine.store().discover_law().unwrap();
    let mut law = Record::read(&path).unwrap();
    law.header.set(AMENDMENTS_HASH, "deadbeef");
    write_atomic(&path, &law.to_text()).unwrap();

    let report = verify(&engine).unwrap();
    assert!(!report.passed);
    assert_eq!(report.diagnostics[0]["code"], "HASH_MISMATCH");
    assert_eq!(report.diagnostics[0]["amendments_hash_in_law"], "deadbeef");
    assert_eq!(engine.store().discover_law().unwrap().1, LawState::Active);
}

#[test]
fn test_malformed_active_law_is_corrupted() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let (path, _) = engine.store().discover_law().unwrap();
    fs::write(&path, "# LAW without a header\n").unwrap();

    let report = verify(&engine).unwrap();
    assert!(!report.passed);
    assert_eq!(report.diagnostics[0]["reason"], "malformed_header");
    assert_eq!(engine.store().discover_law().unwrap().1, LawState::Corrupted);

    let again = verify(&engine).unwrap();
    assert_eq!(again.diagnostics[0]["code"], "LAW_CORRUPTED");
}
