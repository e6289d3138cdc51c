//! One-shot grants authorizing an invocation to edit a resolving law.
//!
//! The ledger (`.constitution/.state/grants.json`) holds pending tokens minted
//! when reconciliation is delegated, and bindings of consumed tokens to the
//! invocation that used them. Every mutation happens under a `create_new`
//! guard file and lands through [`write_atomic`]. Anything that prevents the
//! ledger from being read or locked denies.

use crate::core::error::StatuteError;
use crate::core::lock::FileLock;
use crate::core::store::{Store, write_atomic};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ledger updates take milliseconds; a lock this old belongs to a dead worker.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);
const MUTATE_ATTEMPTS: u32 = 50;
const AUTHORIZE_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantLedger {
    #[serde(default)]
    pub pending: Vec<PendingGrant>,
    #[serde(default)]
    pub bound: Vec<BoundGrant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingGrant {
    pub token: String,
    pub minted_at: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundGrant {
    pub invocation_id: String,
    pub token: String,
    pub bound_at: String,
}

fn lock_path(ledger: &Path) -> PathBuf {
    ledger.with_extension("json.lock")
}

fn lock(ledger: &Path, attempts: u32) -> Result<FileLock, StatuteError> {
    FileLock::acquire(&lock_path(ledger), LOCK_STALE_AFTER, attempts)
}

fn load(path: &Path) -> Result<GrantLedger, StatuteError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(GrantLedger::default()),
        Err(err) => Err(err.into()),
    }
}

fn save(path: &Path, ledger: &GrantLedger) -> Result<(), StatuteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut body = serde_json::to_string_pretty(ledger)?;
    body.push('\n');
    write_atomic(path, &body)
}

/// Adds a pending token and returns it.
pub fn mint(store: &Store, purpose: &str) -> Result<String, StatuteError> {
    let path = store.grants_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let _lock = lock(&path, MUTATE_ATTEMPTS)?;
    let mut ledger = load(&path)?;
    let token = time::new_event_id();
    ledger.pending.push(PendingGrant {
        token: token.clone(),
        minted_at: time::now_epoch_z(),
        purpose: purpose.to_string(),
    });
    save(&path, &ledger)?;
    Ok(token)
}

/// True when `invocation_id` holds a grant, consuming the oldest pending
/// token on first use. Never errors: a missing or unreadable ledger, an
/// empty pool, or a lock that stays held all deny.
pub fn authorize(store: &Store, invocation_id: &str) -> bool {
    if invocation_id.trim().is_empty() {
        return false;
    }
    let path = store.grants_path();
    if !path.is_file() {
        return false;
    }
    let Ok(_lock) = lock(&path, AUTHORIZE_ATTEMPTS) else {
        return false;
    };
    let Ok(mut ledger) = load(&path) else {
        return false;
    };
    if ledger.bound.iter().any(|b| b.invocation_id == invocation_id) {
        return true;
    }
    if ledger.pending.is_empty() {
        return false;
    }
    let grant = ledger.pending.remove(0);
    ledger.bound.push(BoundGrant {
        invocation_id: invocation_id.to_string(),
        token: grant.token,
        bound_at: time::now_epoch_z(),
    });
    save(&path, &ledger).is_ok()
}

/// Drops the binding held by `invocation_id`. Returns whether one existed.
pub fn revoke(store: &Store, invocation_id: &str) -> Result<bool, StatuteError> {
    let path = store.grants_path();
    if !path.is_file() {
        return Ok(false);
    }
    let _lock = lock(&path, MUTATE_ATTEMPTS)?;
    let mut ledger = load(&path)?;
    let before = ledger.bound.len();
    ledger.bound.retain(|b| b.invocation_id != invocation_id);
    if ledger.bound.len() == before {
        return Ok(false);
    }
    save(&path, &ledger)?;
    Ok(true)
}

pub fn ledger(store: &Store) -> Result<GrantLedger, StatuteError> {
    load(&store.grants_path())
}
