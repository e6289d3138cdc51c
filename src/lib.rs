//! Statute: a lifecycle kernel for constitutional record sets.
//!
//! **Statute keeps an append-only set of policy records and the single law
//! derived from them consistent, using nothing but the filesystem.**
//!
//! Several agent workers may run at once with no server and no database.
//! Every mutation is a header rewrite (temp file + rename) followed by a
//! decoration rename, so any half-finished step is safe to observe and to
//! retry.
//!
//! # Records
//!
//! - **Amendments** (`.constitution/amendments/<marker> <YYYYMMDDHHMMSS>`):
//!   `📝 draft -> 🔍 review -> ✅ accepted`. Accepted records are immutable.
//! - **Founding** (`.constitution/amendments/<marker> .founding`): the first
//!   record, same lifecycle.
//! - **LAW** (`.constitution/<marker> LAW`): `📜 active`, `⏳ resolving`,
//!   `❌ corrupted`. Its `amendments_hash` must equal the hash chain over the
//!   accepted records, otherwise it is not trustworthy.
//!
//! # For Agents
//!
//! 1. Create amendments as `📝` drafts with `status: draft`.
//! 2. Set `status: review` when ready; the ratifier records a verdict with
//!    `statute suitability`.
//! 3. Promotion (`statute promote`) is the only way to `✅`.
//! 4. After promotion LAW is resolving; the codifier edits it under a grant
//!    and finishes with `statute reconcile`.
//!
//! ```bash
//! statute init
//! statute promote --article ".constitution/amendments/🔍 20260209101538"
//! statute reconcile
//! statute verify
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: record codec, decorations, hash chain, lifecycle engine,
//!   leases, grants and the access gate
//! - [`plugins`]: verification report and host hooks

pub mod core;
pub mod plugins;

mod cli;

use crate::cli::{Cli, Command, GrantCommand, LeaseCommand, SuitabilityResult};
use crate::core::error::StatuteError;
use crate::core::lifecycle::{Engine, SuitabilityVerdict};
use crate::core::store::Store;
use crate::core::lease::LeaseUpdate;
use crate::core::{grants, lease, time};
use crate::plugins::{hooks, verify};
use clap::Parser;
use colored::Colorize;
use serde_json::{Value, json};
use std::process::ExitCode;
use std::time::Duration;

/// Prints either a JSON envelope or the given text lines.
fn emit(json_mode: bool, cmd: &str, payload: Value, lines: &[String]) -> Result<(), StatuteError> {
    if json_mode {
        let envelope = time::command_envelope(cmd, "ok", payload);
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        for line in lines {
            println!("{}", line);
        }
    }
    Ok(())
}

fn open_engine() -> Result<Engine, StatuteError> {
    let current_dir = std::env::current_dir()?;
    Engine::open(Store::discover(&current_dir)?)
}

pub fn run() -> Result<ExitCode, StatuteError> {
    let cli = Cli::parse();
    let json_mode = cli.json;

    match cli.command {
        Command::Hook(hook_cli) => {
            hooks::run_hook_cli(&hook_cli)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Init => {
            let current_dir = std::env::current_dir()?;
            let engine = Engine::open(Store::new(current_dir))?;
            let report = engine.init()?;
            let headline = if report.created {
                format!("{} initialized {}", "✓".bright_green(), report.law)
            } else {
                format!("{} {} already exists", "▸".bright_yellow(), report.law)
            };
            emit(
                json_mode,
                "init",
                serde_json::to_value(&report)?,
                &[headline, format!("amendments_hash: {}", report.amendments_hash)],
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify => {
            let engine = open_engine()?;
            let passed = verify::run_verify_cli(&engine, &verify::VerifyCli { json: json_mode })?;
            Ok(if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        command => {
            let engine = open_engine()?;
            let name = command_name(&command);
            match run_lifecycle(&engine, command, json_mode) {
                Ok(code) => Ok(code),
                Err(err) => {
                    let _ = engine.journal().record(
                        name,
                        None,
                        "error",
                        Some(json!({ "code": err.code(), "message": err.to_string() })),
                    );
                    Err(err)
                }
            }
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Init => "init",
        Command::Promote { .. } => "promote",
        Command::Stamp { .. } => "stamp",
        Command::Suitability { .. } => "suitability",
        Command::Sync { .. } => "sync",
        Command::Reconcile => "reconcile",
        Command::Verify => "verify",
        Command::CheckDrift => "check-drift",
        Command::Lease(_) => "lease",
        Command::Grant(_) => "grant",
        Command::Hook(_) => "hook",
    }
}

fn run_lifecycle(
    engine: &Engine,
    command: Command,
    json_mode: bool,
) -> Result<ExitCode, StatuteError> {
    let store = engine.store();
    match command {
        Command::Promote { article } => {
            let promotion = engine.promote(&article)?;
            emit(
                json_mode,
                "promote",
                serde_json::to_value(&promotion)?,
                &[format!("promoted_amendment={}", promotion.accepted)],
            )?;
        }
        Command::Stamp { article, state } => {
            let value = engine.stamp_apply_ok(&article, state.into())?;
            emit(
                json_mode,
                "stamp",
                json!({ "apply_ok_at": value }),
                &[format!("apply_ok_at={}", value)],
            )?;
        }
        Command::Suitability {
            article,
            result,
            reason_code,
            request,
        } => {
            let (verdict, label) = match result {
                SuitabilityResult::ApplyOk => (SuitabilityVerdict::ApplyOk, "APPLY_OK"),
                SuitabilityResult::NeedsInput => (
                    SuitabilityVerdict::NeedsInput {
                        reason_code,
                        request,
                    },
                    "NEEDS_INPUT",
                ),
            };
            let path = engine.apply_suitability(&article, &verdict)?;
            let rel = store.relative(&path)?;
            emit(
                json_mode,
                "suitability",
                json!({ "result": label, "article": rel }),
                &[format!("suitability_applied={}", label)],
            )?;
        }
        Command::Sync { article } => {
            let path = engine.sync_decoration(&article)?;
            let rel = store.relative(&path)?;
            emit(
                json_mode,
                "sync",
                json!({ "article": rel }),
                &[format!("article={}", rel)],
            )?;
        }
        Command::Reconcile => {
            let rec = engine.reconcile()?;
            let mut lines = vec![
                format!("updated: {}", rec.law),
                format!("amendments_hash: {}", rec.amendments_hash),
            ];
            if let Some(last) = &rec.last_reconciled_amendment {
                lines.push(format!("last_reconciled_amendment: {}", last));
            }
            emit(json_mode, "reconcile", serde_json::to_value(&rec)?, &lines)?;
        }
        Command::CheckDrift => {
            let outcome = engine.check_drift()?;
            let value = serde_json::to_value(&outcome)?;
            let line = format!(
                "drift={}",
                value
                    .get("outcome")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
            );
            emit(json_mode, "check-drift", value, &[line])?;
        }
        Command::Lease(lease_cli) => match lease_cli.command {
            LeaseCommand::Acquire { article, field } => {
                let path = store.resolve(&article);
                let timeout = Duration::from_secs(engine.config().lease_timeout_secs);
                let outcome = lease::try_acquire(&path, field.header_key(), timeout)?;
                engine.journal().record(
                    "lease.acquire",
                    Some(&store.relative(&path)?),
                    if outcome.may_proceed() { "success" } else { "busy" },
                    Some(json!({ "field": field.header_key(), "outcome": outcome })),
                )?;
                let label = serde_json::to_value(outcome)?;
                emit(
                    json_mode,
                    "lease.acquire",
                    json!({ "outcome": label }),
                    &[format!("lease={}", label.as_str().unwrap_or_default())],
                )?;
                if !outcome.may_proceed() {
                    return Ok(ExitCode::from(2));
                }
            }
            LeaseCommand::Release { article, field } => {
                let path = store.resolve(&article);
                let timeout = Duration::from_secs(engine.config().lease_timeout_secs);
                let update = lease::release(&path, field.header_key(), timeout)?;
                let busy = update == LeaseUpdate::Busy;
                engine.journal().record(
                    "lease.release",
                    Some(&store.relative(&path)?),
                    if busy { "busy" } else { "success" },
                    Some(json!({ "field": field.header_key(), "update": update })),
                )?;
                let label = serde_json::to_value(update)?;
                emit(
                    json_mode,
                    "lease.release",
                    json!({ "field": field.header_key(), "update": label }),
                    &[format!(
                        "release={} field={}",
                        label.as_str().unwrap_or_default(),
                        field.header_key()
                    )],
                )?;
                if busy {
                    return Ok(ExitCode::from(2));
                }
            }
        },
        Command::Grant(grant_cli) => match grant_cli.command {
            GrantCommand::Mint { purpose } => {
                let token = grants::mint(store, &purpose)?;
                engine
                    .journal()
                    .record("grant.mint", None, "success", Some(json!({ "purpose": purpose })))?;
                emit(
                    json_mode,
                    "grant.mint",
                    json!({ "token": token }),
                    &[format!("grant={}", token)],
                )?;
            }
            GrantCommand::Revoke { invocation } => {
                let revoked = grants::revoke(store, &invocation)?;
                engine.journal().record(
                    "grant.revoke",
                    None,
                    if revoked { "success" } else { "noop" },
                    Some(json!({ "invocation_id": invocation })),
                )?;
                emit(
                    json_mode,
                    "grant.revoke",
                    json!({ "revoked": revoked }),
                    &[format!("revoked={}", revoked)],
                )?;
            }
        },
        Command::Init | Command::Verify | Command::Hook(_) => {}
    }
    Ok(ExitCode::SUCCESS)
}
