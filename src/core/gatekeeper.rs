//! Access gate for constitutional records.
//!
//! Decides whether a proposed read, file write or shell command may touch the
//! record tree given its current state. Runs a drift check before every
//! decision so a stale law is already `resolving` when write rules apply.
//!
//! Rules, first match wins:
//! - reads allow
//! - any `statute` invocation of a kernel subcommand outside the sanctioned
//!   procedures (grants, leases, hooks, init) denies, wherever it appears in
//!   the command line
//! - shell commands outside the tree allow; read-only inspection commands
//!   allow
//! - sanctioned `statute` procedures allow
//! - `mv <ts> "📝 <ts>"` inside the amendments directory allows
//! - any other shell command touching the tree denies
//! - writes to accepted records, an active or corrupted law, or a law that
//!   does not exist yet deny
//! - writes to an existing draft/review record allow unless they set
//!   `status: accepted`
//! - writes to a resolving law allow only with a grant
//! - new amendment/founding records need a draft decoration and a
//!   `status: draft` header
//! - any other write inside `.constitution/` (kernel state, config) denies

use crate::core::decoration::{self, AmendmentState, Decoration, LawState, RecordKind};
use crate::core::error::StatuteError;
use crate::core::grants;
use crate::core::lifecycle::{self, Engine};
use crate::core::record;
use crate::core::store::CONSTITUTION_DIR;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const READ_ONLY_BINARIES: &[&str] = &["ls", "rg", "grep", "cat", "head", "tail", "wc", "stat"];
const SANCTIONED_SUBCOMMANDS: &[&str] =
    &["promote", "stamp", "suitability", "reconcile", "verify", "sync"];
const KERNEL_SUBCOMMANDS: &[&str] = &[
    "init",
    "promote",
    "stamp",
    "suitability",
    "sync",
    "reconcile",
    "verify",
    "check-drift",
    "lease",
    "grant",
    "hook",
];
const BINARY_NAME: &str = "statute";

static MUTATING_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(rm|mv|cp|touch|sed|perl|tee|truncate|dd|ln|chmod|chown|git)\b")
        .expect("static regex")
});

static SETS_ACCEPTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)status\s*:\s*["']?accepted\b"#).expect("static regex")
});

const IMMUTABLE_USER: &str = "Constitutional law: accepted amendments and ✅ .founding are immutable. LAW is managed by statute procedures. You may append new draft amendments (📝). Promotion to ✅ is reserved for `statute promote`.";
const IMMUTABLE_AGENT: &str = "Append new amendments as drafts, treat ✅ records as immutable, and change LAW or .founding only through statute procedures.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRequest {
    Read { paths: Vec<PathBuf> },
    Write { paths: Vec<PathBuf>, content: String },
    Shell { command: String },
}

impl GateRequest {
    fn op(&self) -> &'static str {
        match self {
            Self::Read { .. } => "gate.read",
            Self::Write { .. } => "gate.write",
            Self::Shell { .. } => "gate.shell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub permission: Permission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_message: Option<String>,
    /// Which rule decided; journal only.
    #[serde(skip)]
    pub rule: &'static str,
}

impl Decision {
    pub fn allow(rule: &'static str) -> Self {
        Self {
            permission: Permission::Allow,
            user_message: None,
            agent_message: None,
            rule,
        }
    }

    pub fn deny(rule: &'static str, user: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            permission: Permission::Deny,
            user_message: Some(user.into()),
            agent_message: Some(agent.into()),
            rule,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.permission == Permission::Allow
    }

    /// One-line reason for hosts that take a single message.
    pub fn reason(&self) -> Option<&str> {
        self.user_message.as_deref()
    }
}

pub struct Gate<'a> {
    engine: &'a Engine,
}

impl<'a> Gate<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    pub fn decide(
        &self,
        request: &GateRequest,
        invocation_id: Option<&str>,
    ) -> Result<Decision, StatuteError> {
        self.engine.check_drift()?;
        let decision = match request {
            GateRequest::Read { .. } => Decision::allow("read"),
            GateRequest::Shell { command } => self.decide_shell(command),
            GateRequest::Write { paths, content } => {
                self.decide_write(paths, content, invocation_id)?
            }
        };
        if decision.rule != "read" && decision.rule != "outside_tree" {
            self.engine.journal().record(
                request.op(),
                None,
                if decision.is_allowed() { "allow" } else { "deny" },
                Some(json!({ "rule": decision.rule, "invocation_id": invocation_id })),
            )?;
        }
        Ok(decision)
    }

    fn decide_shell(&self, command: &str) -> Decision {
        if let Some(subcommand) = unsanctioned_invocation(command) {
            return Decision::deny(
                "unsanctioned_procedure",
                format!(
                    "Constitutional law: `{} {}` is reserved for the kernel and its hooks.",
                    BINARY_NAME, subcommand
                ),
                "Only `statute promote|stamp|suitability|reconcile|verify|sync` may be run by agents; grants and leases are issued by the hooks.",
            );
        }
        if !self.mentions_tree(command) {
            return Decision::allow("outside_tree");
        }
        let words = split_words(command);
        let chained = has_control_operator(command);

        if let Some(words) = &words {
            if !chained && self.is_read_only(words) {
                return Decision::allow("read_only_command");
            }
            if !chained && is_sanctioned(words) {
                return Decision::allow("sanctioned_procedure");
            }
            if !chained && self.is_draft_rename(words) {
                return Decision::allow("draft_rename");
            }
        }

        let rule = if MUTATING_VERB.is_match(command) {
            "mutating_command"
        } else {
            "unrecognized_command"
        };
        Decision::deny(rule, IMMUTABLE_USER, IMMUTABLE_AGENT)
    }

    fn mentions_tree(&self, command: &str) -> bool {
        let absolute = self.engine.store().constitution_dir();
        command.contains(CONSTITUTION_DIR)
            || command.contains(absolute.to_string_lossy().as_ref())
            || command.contains(decoration::FOUNDING_BASE)
            || command.contains(decoration::LAW_BASE)
    }

    fn is_read_only(&self, words: &[String]) -> bool {
        let Some(program) = words.first() else {
            return true;
        };
        let program = program_name(program);
        READ_ONLY_BINARIES.contains(&program)
            || self
                .engine
                .config()
                .read_only_commands
                .iter()
                .any(|c| c == program)
    }

    /// `mv <ts> "📝 <ts>"` with both ends in the amendments directory.
    fn is_draft_rename(&self, words: &[String]) -> bool {
        let [program, src, dst] = words else {
            return false;
        };
        if program_name(program) != "mv" {
            return false;
        }
        let store = self.engine.store();
        let amendments = store.resolve(store.amendments_dir());
        let src = store.resolve(src);
        let dst = store.resolve(dst);
        if src.parent() != Some(amendments.as_path()) || dst.parent() != Some(amendments.as_path())
        {
            return false;
        }
        let (Some(src_name), Some(dst_name)) = (file_name(&src), file_name(&dst)) else {
            return false;
        };
        decoration::is_amendment_base(src_name)
            && dst_name
                == decoration::with_decoration(
                    src_name,
                    Decoration::Amendment(AmendmentState::Draft),
                )
    }

    fn decide_write(
        &self,
        paths: &[PathBuf],
        content: &str,
        invocation_id: Option<&str>,
    ) -> Result<Decision, StatuteError> {
        let mut decision = Decision::allow("outside_tree");
        for path in paths {
            let verdict = self.decide_write_one(path, content, invocation_id)?;
            if !verdict.is_allowed() {
                return Ok(verdict);
            }
            if verdict.rule != "outside_tree" {
                decision = verdict;
            }
        }
        Ok(decision)
    }

    fn decide_write_one(
        &self,
        path: &Path,
        content: &str,
        invocation_id: Option<&str>,
    ) -> Result<Decision, StatuteError> {
        let store = self.engine.store();
        let path = store.resolve(path);
        let Some((kind, decoration)) = store.classify(&path) else {
            if path.starts_with(store.resolve(store.constitution_dir())) {
                return Ok(Decision::deny(
                    "kernel_state",
                    "Constitutional law: files under .constitution/ other than records are kernel state (grants, leases, journal, config).",
                    IMMUTABLE_AGENT,
                ));
            }
            return Ok(Decision::allow("outside_tree"));
        };

        match (kind, decoration) {
            (RecordKind::Law, Decoration::Law(LawState::Resolving)) if path.is_file() => {
                let granted = invocation_id.is_some_and(|id| grants::authorize(store, id));
                if granted {
                    Ok(Decision::allow("resolving_law_granted"))
                } else {
                    Ok(Decision::deny(
                        "resolving_law_without_grant",
                        "Constitutional law: ⏳ LAW may only be edited by the reconciliation worker holding a grant.",
                        "LAW is resolving. Only the delegated codifier invocation may edit it; finish with `statute reconcile`.",
                    ))
                }
            }
            (RecordKind::Law, _) | (_, Decoration::Law(_)) => Ok(Decision::deny(
                "law_immutable",
                "Constitutional law: LAW is a derived record. Only ⏳ LAW (resolving) is writable, and only during reconciliation.",
                IMMUTABLE_AGENT,
            )),
            (_, Decoration::Amendment(AmendmentState::Accepted)) => Ok(Decision::deny(
                "accepted_immutable",
                "Constitutional law: accepted records (✅) are immutable commitments.",
                IMMUTABLE_AGENT,
            )),
            (_, Decoration::Amendment(_)) if path.is_file() => {
                if SETS_ACCEPTED.is_match(content) {
                    Ok(Decision::deny(
                        "sets_accepted",
                        "Constitutional law: drafts may advance to review, but acceptance (✅) is reserved for `statute promote`.",
                        "Set `status: review` and let the ratification procedure promote the record.",
                    ))
                } else {
                    Ok(Decision::allow("pending_record_edit"))
                }
            }
            (kind, Decoration::Amendment(state)) => {
                Ok(self.decide_creation(&path, kind, state, content))
            }
        }
    }

    fn decide_creation(
        &self,
        path: &Path,
        kind: RecordKind,
        state: AmendmentState,
        content: &str,
    ) -> Decision {
        if lifecycle::is_ghost(path)
            || (kind == RecordKind::Founding
                && matches!(
                    self.engine.store().discover_founding(),
                    Some((_, AmendmentState::Accepted))
                ))
        {
            return Decision::deny(
                "accepted_immutable",
                "Constitutional law: this record is already accepted (✅) and immutable.",
                IMMUTABLE_AGENT,
            );
        }
        let rec = record::parse(content);
        if state == AmendmentState::Draft && rec.header.is_delimited() && rec.status() == "draft" {
            return Decision::allow("new_draft");
        }
        Decision::deny(
            "new_record_not_draft",
            "Constitutional law: new amendments must be created as drafts (📝) with a header declaring `status: draft`.",
            "Create the record as `📝 <YYYYMMDDHHMMSS>` starting with `---\\nstatus: draft\\n---`.",
        )
    }
}

fn program_name(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// `statute <procedure> ...` or `cargo run ... -- <procedure> ...`.
fn is_sanctioned(words: &[String]) -> bool {
    let Some(program) = words.first() else {
        return false;
    };
    let subcommand = match program_name(program) {
        BINARY_NAME => words.get(1),
        "cargo" if words.get(1).is_some_and(|w| w == "run") => words
            .iter()
            .position(|w| w == "--")
            .and_then(|i| words.get(i + 1)),
        _ => None,
    };
    subcommand.is_some_and(|s| SANCTIONED_SUBCOMMANDS.contains(&s.as_str()))
}

/// First kernel subcommand invoked through `statute` (or `cargo run -- `)
/// anywhere in `command` that is not a sanctioned procedure. Wrappers such as
/// `env`, `xargs`, `sh -c '...'` and chained segments are all scanned.
fn unsanctioned_invocation(command: &str) -> Option<String> {
    let tokens = scan_tokens(command);
    for (i, token) in tokens.iter().enumerate() {
        let rest = match program_name(token) {
            BINARY_NAME => &tokens[i + 1..],
            "cargo" if tokens.get(i + 1).is_some_and(|t| t == "run") => {
                let Some(sep) = tokens[i + 1..].iter().position(|t| t == "--") else {
                    continue;
                };
                &tokens[i + 2 + sep..]
            }
            _ => continue,
        };
        let Some(sub) = rest.iter().find(|t| !t.starts_with('-')) else {
            continue;
        };
        if KERNEL_SUBCOMMANDS.contains(&sub.as_str())
            && !SANCTIONED_SUBCOMMANDS.contains(&sub.as_str())
        {
            return Some(sub.clone());
        }
    }
    None
}

/// Unquoted words broken again at whitespace and shell punctuation, so quoted
/// scripts and chained segments surface as plain tokens.
fn scan_tokens(command: &str) -> Vec<String> {
    let words =
        split_words(command).unwrap_or_else(|| vec![command.replace(['\'', '"'], " ")]);
    let breaks = |c: char| c.is_whitespace() || ";&|()`<>$\"'{}".contains(c);
    words
        .iter()
        .flat_map(|w| w.split(breaks))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Redirection, pipes, sequencing and substitution all make a command more
/// than its first word says.
fn has_control_operator(command: &str) -> bool {
    command.contains(['>', '<', '|', ';', '&', '`', '\n']) || command.contains("$(")
}

/// POSIX-style word splitting: whitespace separates words, single quotes are
/// literal, double quotes honor `\"` and `\\`, a bare backslash escapes the
/// next character. An unterminated quote yields `None`.
pub fn split_words(command: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        other => current.push(other),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            escaped @ ('"' | '\\' | '$' | '`') => current.push(escaped),
                            other => {
                                current.push('\\');
                                current.push(other);
                            }
                        },
                        other => current.push(other),
                    }
                }
            }
            '\\' => {
                in_word = true;
                current.push(chars.next()?);
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}
