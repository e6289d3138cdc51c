//! Ledger of leases taken on behalf of delegated workers.
//!
//! The stop hook records which record it leased for which worker
//! (`.constitution/.state/delegations.json`); the worker hooks look the entry
//! up again instead of guessing from the tree, so a finished worker only ever
//! clears the lease that was taken for it. Entries name the record by its
//! undecorated base, since the decoration may move while the worker runs.

use crate::core::decoration::{self, AmendmentState, Decoration, LAW_BASE};
use crate::core::error::StatuteError;
use crate::core::lock::FileLock;
use crate::core::store::{Store, write_atomic};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);
const LOCK_ATTEMPTS: u32 = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelegationLedger {
    #[serde(default)]
    pub active: Vec<Delegation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delegation {
    pub worker: String,
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub delegated_at: String,
}

impl Delegation {
    /// Where the record currently lives, whatever its decoration. `None` once
    /// it is gone or accepted.
    pub fn locate(&self, store: &Store) -> Option<PathBuf> {
        if self.base == LAW_BASE {
            return store.discover_law().map(|(p, _)| p);
        }
        decoration::kind_of_base(&self.base)?;
        [AmendmentState::Review, AmendmentState::Draft]
            .into_iter()
            .map(|s| {
                store.amendments_dir().join(decoration::with_decoration(
                    &self.base,
                    Decoration::Amendment(s),
                ))
            })
            .find(|p| p.is_file())
    }
}

fn lock(ledger: &Path) -> Result<FileLock, StatuteError> {
    FileLock::acquire(&ledger.with_extension("json.lock"), LOCK_STALE_AFTER, LOCK_ATTEMPTS)
}

fn load(path: &Path) -> Result<DelegationLedger, StatuteError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(DelegationLedger::default()),
        Err(err) => Err(err.into()),
    }
}

fn save(path: &Path, ledger: &DelegationLedger) -> Result<(), StatuteError> {
    let mut body = serde_json::to_string_pretty(ledger)?;
    body.push('\n');
    write_atomic(path, &body)
}

/// Records that `target` was leased for `worker`. A previous entry for the
/// same worker and record is replaced.
pub fn record(
    store: &Store,
    worker: &str,
    target: &Path,
    session: Option<&str>,
) -> Result<Delegation, StatuteError> {
    let base = target
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| decoration::strip(n).to_string())
        .filter(|b| decoration::kind_of_base(b).is_some())
        .ok_or_else(|| {
            StatuteError::ValidationError(format!(
                "{} is not a constitutional record",
                target.display()
            ))
        })?;
    let path = store.delegations_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let _lock = lock(&path)?;
    let mut ledger = load(&path)?;
    ledger
        .active
        .retain(|d| !(d.worker == worker && d.base == base));
    let entry = Delegation {
        worker: worker.to_string(),
        base,
        session: session.map(str::to_string),
        delegated_at: time::now_epoch_z(),
    };
    ledger.active.push(entry.clone());
    save(&path, &ledger)?;
    Ok(entry)
}

/// Entry for `worker`: the one from `session` when given and present,
/// otherwise the oldest.
fn pick(ledger: &DelegationLedger, worker: &str, session: Option<&str>) -> Option<usize> {
    let by_session = session.and_then(|s| {
        ledger
            .active
            .iter()
            .position(|d| d.worker == worker && d.session.as_deref() == Some(s))
    });
    by_session.or_else(|| ledger.active.iter().position(|d| d.worker == worker))
}

pub fn find(
    store: &Store,
    worker: &str,
    session: Option<&str>,
) -> Result<Option<Delegation>, StatuteError> {
    let ledger = load(&store.delegations_path())?;
    Ok(pick(&ledger, worker, session).map(|i| ledger.active[i].clone()))
}

/// Removes and returns the entry a finished worker was delegated for.
pub fn take(
    store: &Store,
    worker: &str,
    session: Option<&str>,
) -> Result<Option<Delegation>, StatuteError> {
    let path = store.delegations_path();
    if !path.is_file() {
        return Ok(None);
    }
    let _lock = lock(&path)?;
    let mut ledger = load(&path)?;
    let Some(index) = pick(&ledger, worker, session) else {
        return Ok(None);
    };
    let entry = ledger.active.remove(index);
    save(&path, &ledger)?;
    Ok(Some(entry))
}

pub fn ledger(store: &Store) -> Result<DelegationLedger, StatuteError> {
    load(&store.delegations_path())
}
