use serde_json::{Value, json};
use statute::core::decoration::LawState;
use statute::core::delegation;
use statute::core::grants;
use statute::core::lease::{self, EVALUATION_LEASE, RESOLUTION_LEASE};
use statute::core::lifecycle::{APPLY_OK_AT, Engine, SuitabilityVerdict};
use statute::core::record::Record;
use statute::core::store::Store;
use statute::plugins::hooks::{HookKind, HookPayload, respond};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn init_engine(root: &Path) -> Engine {
    let engine = Engine::open(Store::new(root)).unwrap();
    engine.init().unwrap();
    engine
}

fn payload(root: &Path, extra: Value) -> HookPayload {
    let mut value = json!({ "workspace_roots": [root] });
    if let (Some(base), Some(more)) = (value.as_object_mut(), extra.as_object()) {
        base.extend(more.clone());
    }
    HookPayload::parse(&value.to_string())
}

fn promote_one(engine: &Engine) {
    let review = engine.store().amendments_dir().join("🔍 20260209101538");
    fs::write(&review, "---\nstatus: review\n---\nCite sources.\n").unwrap();
    let review = engine
        .apply_suitability(&review, &SuitabilityVerdict::ApplyOk)
        .unwrap();
    engine.promote(&review).unwrap();
}

#[test]
fn test_no_constitution_allows_everything() {
    let tmp = tempdir().unwrap();
    let p = payload(tmp.path(), json!({ "command": "rm -rf .constitution/amendments" }));
    assert_eq!(respond(HookKind::BeforeShell, &p), json!({ "permission": "allow" }));
    assert_eq!(respond(HookKind::PreToolUse, &p), json!({ "decision": "allow" }));
    assert_eq!(respond(HookKind::Stop, &p), json!({}));
}

#[test]
fn test_pre_tool_use_denies_accepted_edit() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    promote_one(&engine);

    let p = payload(
        tmp.path(),
        json!({
            "tool_name": "Write",
            "tool_input": {
                "file_path": ".constitution/amendments/✅ 20260209101538",
                "content": "rewritten"
            }
        }),
    );
    let answer = respond(HookKind::PreToolUse, &p);
    assert_eq!(answer["decision"], "deny");
    assert!(answer["reason"].as_str().unwrap().contains("immutable"));

    let read = payload(
        tmp.path(),
        json!({
            "tool_name": "Read",
            "tool_input": { "file_path": ".constitution/amendments/✅ 20260209101538" }
        }),
    );
    assert_eq!(respond(HookKind::PreToolUse, &read)["decision"], "allow");
}

#[test]
fn test_before_shell_answers_with_messages() {
    let tmp = tempdir().unwrap();
    init_engine(tmp.path());
    let p = payload(
        tmp.path(),
        json!({ "command": "sed -i 's/a/b/' \".constitution/📜 LAW\"" }),
    );
    let answer = respond(HookKind::BeforeShell, &p);
    assert_eq!(answer["permission"], "deny");
    assert!(answer["user_message"].is_string());
    assert!(answer["agent_message"].is_string());

    let ls = payload(tmp.path(), json!({ "command": "ls .constitution/amendments" }));
    assert_eq!(respond(HookKind::BeforeShell, &ls), json!({ "permission": "allow" }));
}

#[test]
fn test_after_edit_marks_pending_and_syncs_decoration() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let draft = engine.store().amendments_dir().join("📝 20260209101538");
    fs::write(&draft, "---\nstatus: review\n---\nready\n").unwrap();

    let p = payload(
        tmp.path(),
        json!({ "file_path": ".constitution/amendments/📝 20260209101538" }),
    );
    assert_eq!(respond(HookKind::AfterEdit, &p), json!({}));

    let review = engine.store().amendments_dir().join("🔍 20260209101538");
    assert!(!draft.exists());
    let rec = Record::read(&review).unwrap();
    assert_eq!(rec.header.get(APPLY_OK_AT), Some("⏳"));
}

#[test]
fn test_stop_delegates_ratifier_once() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let review = engine.store().amendments_dir().join("🔍 20260209101538");
    fs::write(&review, "---\nstatus: review\napply_ok_at: \"⏳\"\n---\nbody\n").unwrap();

    let p = payload(tmp.path(), json!({}));
    let first = respond(HookKind::Stop, &p);
    let message = first["followup_message"].as_str().unwrap();
    assert!(message.contains("subagent_type=\"ratifier\""));
    assert!(lease::holder_since(&review, EVALUATION_LEASE).unwrap().is_some());

    // Lease is live, so a second stop backs off.
    assert_eq!(respond(HookKind::Stop, &p), json!({}));

    let done = payload(tmp.path(), json!({ "subagent_type": "ratifier" }));
    respond(HookKind::WorkerStop, &done);
    assert!(lease::holder_since(&review, EVALUATION_LEASE).unwrap().is_none());
}

#[test]
fn test_stop_delegates_codifier_with_grant() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    promote_one(&engine);

    let p = payload(tmp.path(), json!({}));
    let answer = respond(HookKind::Stop, &p);
    assert!(
        answer["followup_message"]
            .as_str()
            .unwrap()
            .contains("subagent_type=\"codifier\"")
    );
    assert_eq!(grants::ledger(engine.store()).unwrap().pending.len(), 1);

    let (law, state) = engine.store().discover_law().unwrap();
    assert_eq!(state, LawState::Resolving);
    assert!(lease::holder_since(&law, RESOLUTION_LEASE).unwrap().is_some());

    let stop = payload(tmp.path(), json!({ "subagent_type": "codifier" }));
    respond(HookKind::WorkerStop, &stop);
    assert!(lease::holder_since(&law, RESOLUTION_LEASE).unwrap().is_none());
}

#[test]
fn test_stop_is_quiet_when_law_is_current() {
    let tmp = tempdir().unwrap();
    init_engine(tmp.path());
    assert_eq!(respond(HookKind::Stop, &payload(tmp.path(), json!({}))), json!({}));
}

#[test]
fn test_session_start_injects_law_body() {
    let tmp = tempdir().unwrap();
    init_engine(tmp.path());
    let answer = respond(HookKind::SessionStart, &payload(tmp.path(), json!({})));
    let context = answer["additional_context"].as_str().unwrap();
    assert!(context.starts_with("<constitutional_law status=\"active\">"));
    assert!(context.contains("# LAW"));
}

#[test]
fn test_worker_stop_releases_only_the_delegated_record() {
    let tmp = tempdir().unwrap();
    let engine = init_engine(tmp.path());
    let dir = engine.store().amendments_dir();

    // Leased by a worker from another session, not up for evaluation here.
    let foreign = dir.join("📝 20260101000000");
    fs::write(&foreign, "---\nstatus: draft\n---\nelsewhere\n").unwrap();
    let timeout = std::time::Duration::from_secs(300);
    assert!(
        lease::try_acquire(&foreign, EVALUATION_LEASE, timeout)
            .unwrap()
            .may_proceed()
    );

    let review = dir.join("🔍 20260209101538");
    fs::write(&review, "---\nstatus: review\napply_ok_at: \"⏳\"\n---\nbody\n").unwrap();

    let p = payload(tmp.path(), json!({ "session_id": "s-main" }));
    let answer = respond(HookKind::Stop, &p);
    assert!(answer["followup_message"].is_string());
    let active = delegation::ledger(engine.store()).unwrap().active;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].base, "20260209101538");
    assert_eq!(active[0].session.as_deref(), Some("s-main"));

    let done = payload(
        tmp.path(),
        json!({ "subagent_type": "ratifier", "session_id": "s-main" }),
    );
    respond(HookKind::WorkerStop, &done);
    assert!(lease::holder_since(&review, EVALUATION_LEASE).unwrap().is_none());
    assert!(lease::holder_since(&foreign, EVALUATION_LEASE).unwrap().is_some());
    assert!(delegation::ledger(engine.store()).unwrap().active.is_empty());

    // A second stop notification has no entry left and touches nothing.
    respond(HookKind::WorkerStop, &done);
    assert!(lease::holder_since(&foreign, EVALUATION_LEASE).unwrap().is_some());
}
