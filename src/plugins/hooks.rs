//! Host hooks: one JSON payload on stdin, one JSON object on stdout.
//!
//! Gate hooks fail closed: if the tree's state cannot be read the answer is
//! deny. The other hooks are advisory and answer `{}` on error.

use crate::core::decoration::{LawState, RecordKind};
use crate::core::delegation;
use crate::core::error::StatuteError;
use crate::core::gatekeeper::{Decision, Gate, GateRequest};
use crate::core::grants;
use crate::core::lease::{self, EVALUATION_LEASE, LeaseUpdate, RESOLUTION_LEASE};
use crate::core::lifecycle::Engine;
use crate::core::record::Record;
use crate::core::store::{CONSTITUTION_DIR, Store};
use crate::plugins::verify;
use clap::{Parser, Subcommand};
use colored::Colorize;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

const PATH_KEYS: &[&str] = &["path", "file_path", "target_file", "target_notebook"];
const CONTENT_KEYS: &[&str] = &["content", "contents", "new_string", "file_text", "text"];
const READ_TOOLS: &[&str] = &["Read", "Grep", "Glob", "LS", "read_file", "list_dir"];

static RECORD_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.constitution/amendments/(?:(?:📝|🔍|✅) )?(?:\d{14}|\.founding)")
        .expect("static regex")
});

#[derive(Parser, Debug)]
#[clap(name = "hook", about = "Host integration hooks (JSON on stdin/stdout)")]
pub struct HookCli {
    #[clap(subcommand)]
    pub kind: HookKind,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Gate a file tool call before it runs.
    PreToolUse,
    /// Gate a shell command before it runs.
    BeforeShell,
    /// Stamp evaluation pending and sync the decoration after an edit.
    AfterEdit,
    /// Delegate pending evaluation or reconciliation at turn end.
    Stop,
    /// Inject the current law into a new session.
    SessionStart,
    /// Refresh the lease held for a starting worker.
    WorkerStart,
    /// Clear the lease held for a finished worker.
    WorkerStop,
}

#[derive(Debug, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub workspace_roots: Vec<PathBuf>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default, alias = "generation_id")]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub subagent_type: Option<String>,
    #[serde(default, alias = "conversation_id")]
    pub session_id: Option<String>,
}

impl HookPayload {
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    fn root(&self) -> PathBuf {
        self.workspace_roots
            .first()
            .cloned()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Store for the workspace; `None` when there is no constitution.
    fn store(&self) -> Option<Store> {
        let root = self.root();
        if root.join(CONSTITUTION_DIR).is_dir() {
            return Some(Store::new(root));
        }
        Store::discover(&root).ok()
    }
}

/// Worker roles the stop hook delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    Framer,
    Ratifier,
    Codifier,
}

impl Worker {
    pub fn name(self) -> &'static str {
        match self {
            Self::Framer => "framer",
            Self::Ratifier => "ratifier",
            Self::Codifier => "codifier",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "framer" => Some(Self::Framer),
            "ratifier" => Some(Self::Ratifier),
            "codifier" => Some(Self::Codifier),
            _ => None,
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Self::Framer => {
                "Evaluate the founding record for acceptance as the constitutional grundnorm."
            }
            Self::Ratifier => {
                "Evaluate amendments in review for suitability and ratify them."
            }
            Self::Codifier => {
                "LAW is resolving. Reconcile it with the current accepted amendments, then run `statute reconcile`."
            }
        }
    }

    fn lease_field(self) -> &'static str {
        match self {
            Self::Codifier => RESOLUTION_LEASE,
            Self::Framer | Self::Ratifier => EVALUATION_LEASE,
        }
    }
}

pub fn delegation_message(worker: Worker) -> String {
    format!(
        "<subagent_delegation_context>\n\
         The user has indicated they want you to delegate work to the following subagent(s): {name}\n\
         \n\
         To delegate, call the Task tool with the subagent_type parameter. Example:\n\
         Task(subagent_type=\"{name}\", prompt=\"{prompt}\")\n\
         </subagent_delegation_context>",
        name = worker.name(),
        prompt = worker.prompt()
    )
}

/// Runs one hook and returns its JSON answer. Never fails.
pub fn respond(kind: HookKind, payload: &HookPayload) -> Value {
    let Some(store) = payload.store() else {
        return match kind {
            HookKind::PreToolUse => json!({ "decision": "allow" }),
            HookKind::BeforeShell => json!({ "permission": "allow" }),
            HookKind::WorkerStart => json!({ "decision": "allow" }),
            _ => json!({}),
        };
    };
    match dispatch(kind, payload, store) {
        Ok(answer) => answer,
        Err(err) => match kind {
            HookKind::PreToolUse => json!({
                "decision": "deny",
                "reason": format!("Constitutional state could not be established: {}", err),
            }),
            HookKind::BeforeShell => json!({
                "permission": "deny",
                "user_message": format!("Constitutional state could not be established: {}", err),
                "agent_message": "Retry after the constitution is readable; do not bypass the gate.",
            }),
            _ => {
                eprintln!("{} {}", "statute hook:".yellow(), err);
                json!({})
            }
        },
    }
}

fn dispatch(kind: HookKind, payload: &HookPayload, store: Store) -> Result<Value, StatuteError> {
    let engine = Engine::open(store)?;
    match kind {
        HookKind::PreToolUse => pre_tool_use(&engine, payload),
        HookKind::BeforeShell => before_shell(&engine, payload),
        HookKind::AfterEdit => after_edit(&engine, payload),
        HookKind::Stop => stop(&engine, payload),
        HookKind::SessionStart => session_start(&engine),
        HookKind::WorkerStart => worker_start(&engine, payload),
        HookKind::WorkerStop => worker_stop(&engine, payload),
    }
}

fn pre_tool_use(engine: &Engine, payload: &HookPayload) -> Result<Value, StatuteError> {
    let paths = tool_paths(&payload.tool_input);
    let is_read = payload
        .tool_name
        .as_deref()
        .is_some_and(|t| READ_TOOLS.contains(&t));
    let request = if is_read {
        GateRequest::Read { paths }
    } else {
        GateRequest::Write {
            paths,
            content: tool_content(&payload.tool_input),
        }
    };
    let decision = Gate::new(engine).decide(&request, payload.invocation_id.as_deref())?;
    Ok(pre_tool_use_answer(&decision))
}

fn pre_tool_use_answer(decision: &Decision) -> Value {
    if decision.is_allowed() {
        return json!({ "decision": "allow" });
    }
    json!({
        "decision": "deny",
        "reason": decision.reason().unwrap_or("Denied by the constitutional gate."),
    })
}

fn before_shell(engine: &Engine, payload: &HookPayload) -> Result<Value, StatuteError> {
    let command = payload.command.clone().unwrap_or_default();
    let decision = Gate::new(engine).decide(
        &GateRequest::Shell { command },
        payload.invocation_id.as_deref(),
    )?;
    Ok(serde_json::to_value(&decision)?)
}

fn after_edit(engine: &Engine, payload: &HookPayload) -> Result<Value, StatuteError> {
    if let Some(file_path) = payload.file_path.as_deref().filter(|p| !p.is_empty()) {
        let path = engine.store().resolve(resolve_against(&payload.root(), file_path));
        engine.after_edit(&path)?;
    }
    Ok(json!({}))
}

fn stop(engine: &Engine, payload: &HookPayload) -> Result<Value, StatuteError> {
    let timeout = Duration::from_secs(engine.config().lease_timeout_secs);
    let store = engine.store();
    let session = payload.session_id.as_deref();

    if let Some(first) = engine.records_needing_evaluation()?.into_iter().next() {
        let worker = match store.classify(&first) {
            Some((RecordKind::Founding, _)) => Worker::Framer,
            _ => Worker::Ratifier,
        };
        return delegate(engine, &first, worker, session, timeout);
    }

    engine.check_drift()?;
    if verify::verify(engine)?.passed {
        return Ok(json!({}));
    }
    match store.discover_law() {
        Some((law, LawState::Resolving)) => {
            delegate(engine, &law, Worker::Codifier, session, timeout)
        }
        // Missing or corrupted law needs a human.
        _ => Ok(json!({})),
    }
}

fn delegate(
    engine: &Engine,
    target: &Path,
    worker: Worker,
    session: Option<&str>,
    timeout: Duration,
) -> Result<Value, StatuteError> {
    let outcome = lease::try_acquire(target, worker.lease_field(), timeout)?;
    let rel = engine.store().relative(target)?;
    engine.journal().record(
        "delegate",
        Some(&rel),
        if outcome.may_proceed() { "delegated" } else { "backed_off" },
        Some(json!({ "worker": worker.name(), "lease": outcome })),
    )?;
    if !outcome.may_proceed() {
        return Ok(json!({}));
    }
    delegation::record(engine.store(), worker.name(), target, session)?;
    if worker == Worker::Codifier {
        grants::mint(engine.store(), "reconcile")?;
    }
    Ok(json!({ "followup_message": delegation_message(worker) }))
}

fn session_start(engine: &Engine) -> Result<Value, StatuteError> {
    let Some((path, state)) = engine.store().discover_law() else {
        return Ok(json!({}));
    };
    if state == LawState::Corrupted {
        return Ok(json!({}));
    }
    let law = Record::read(&path)?;
    let body = law.trimmed_body();
    if body.is_empty() {
        return Ok(json!({}));
    }
    Ok(json!({
        "additional_context": format!(
            "<constitutional_law status=\"{}\">\n{}\n</constitutional_law>",
            state, body
        )
    }))
}

fn worker_start(engine: &Engine, payload: &HookPayload) -> Result<Value, StatuteError> {
    if let Some(worker) = payload.subagent_type.as_deref().and_then(Worker::from_name)
        && let Some(entry) =
            delegation::find(engine.store(), worker.name(), payload.session_id.as_deref())?
        && let Some(target) = entry.locate(engine.store())
    {
        let timeout = Duration::from_secs(engine.config().lease_timeout_secs);
        lease::refresh(&target, worker.lease_field(), timeout)?;
    }
    Ok(json!({ "decision": "allow" }))
}

/// Clears only the lease the stop hook took for this worker. Without a
/// ledger entry nothing is touched and the lease runs out on its own.
fn worker_stop(engine: &Engine, payload: &HookPayload) -> Result<Value, StatuteError> {
    let Some(worker) = payload.subagent_type.as_deref().and_then(Worker::from_name) else {
        return Ok(json!({}));
    };
    let store = engine.store();
    let Some(entry) = delegation::take(store, worker.name(), payload.session_id.as_deref())?
    else {
        return Ok(json!({}));
    };
    if let Some(target) = entry.locate(store) {
        let timeout = Duration::from_secs(engine.config().lease_timeout_secs);
        let update = lease::release(&target, worker.lease_field(), timeout)?;
        engine.journal().record(
            "worker_stop",
            Some(&store.relative(&target)?),
            if update == LeaseUpdate::Busy { "busy" } else { "released" },
            Some(json!({ "worker": worker.name(), "update": update })),
        )?;
    }
    Ok(json!({}))
}

fn resolve_against(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Explicit path arguments plus any record path mentioned in the input text.
pub fn tool_paths(tool_input: &Value) -> Vec<PathBuf> {
    let mut out = Vec::new();
    collect_paths(tool_input, &mut out);
    let text = tool_input.to_string();
    for m in RECORD_MENTION.find_iter(&text) {
        let p = PathBuf::from(m.as_str());
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

fn collect_paths(value: &Value, out: &mut Vec<PathBuf>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(s) if PATH_KEYS.contains(&key.as_str()) => {
                        out.push(PathBuf::from(s))
                    }
                    _ => collect_paths(child, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_paths(v, out)),
        _ => {}
    }
}

/// Text a tool call would write, or the whole input when no content field
/// is recognized.
pub fn tool_content(tool_input: &Value) -> String {
    let mut parts = Vec::new();
    collect_content(tool_input, &mut parts);
    if parts.is_empty() {
        tool_input.to_string()
    } else {
        parts.join("\n")
    }
}

fn collect_content(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(s) if CONTENT_KEYS.contains(&key.as_str()) => {
                        out.push(s.clone())
                    }
                    _ => collect_content(child, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_content(v, out)),
        _ => {}
    }
}

/// Reads the payload from stdin and prints the hook's answer.
pub fn run_hook_cli(cli: &HookCli) -> Result<(), StatuteError> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    let payload = HookPayload::parse(&raw);
    println!("{}", respond(cli.kind, &payload));
    Ok(())
}
