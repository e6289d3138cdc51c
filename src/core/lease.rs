//! Advisory, time-boxed leases stored as header timestamp fields.
//!
//! A lease is metadata on the record it protects: `evaluation_started_at` on a
//! draft under suitability evaluation, `resolution_started_at` on a resolving
//! law. Nothing expires a lease proactively; the next worker to look at it
//! compares its age with the timeout and reclaims it if abandoned.
//!
//! The read-check-write of [`try_acquire`] runs under a `create_new` sidecar
//! guard so two workers racing on a fresh record cannot both acquire it.
//! Acquisition never blocks: a held guard reads as `ForeignActive`.

use crate::core::error::{Precondition, StatuteError};
use crate::core::lock::FileLock;
use crate::core::record;
use crate::core::store::write_atomic;
use crate::core::time;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EVALUATION_LEASE: &str = "evaluation_started_at";
pub const RESOLUTION_LEASE: &str = "resolution_started_at";

const UPDATE_GUARD_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseOutcome {
    /// No lease was present; the caller now holds it.
    Acquired,
    /// Someone else holds a live lease. The caller must do nothing.
    ForeignActive,
    /// An abandoned lease was replaced; the caller now holds it.
    Reclaimed,
}

impl LeaseOutcome {
    pub fn may_proceed(self) -> bool {
        !matches!(self, Self::ForeignActive)
    }
}

/// Result of [`release`] / [`refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseUpdate {
    Applied,
    /// Record gone, headerless, or the field was already clear.
    Unchanged,
    /// The guard stayed held; nothing was written.
    Busy,
}

fn guard_path(record_path: &Path) -> PathBuf {
    let name = record_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    record_path.with_file_name(format!(".{}.lease-guard", name))
}

/// Single-winner guard. A guard older than `stale_after` was left by a crashed
/// worker; it is removed, but this caller still backs off for the turn.
fn try_guard(record_path: &Path, stale_after: Duration) -> Result<Option<FileLock>, StatuteError> {
    FileLock::try_acquire(&guard_path(record_path), stale_after)
}

pub fn try_acquire(
    path: &Path,
    field: &str,
    timeout: Duration,
) -> Result<LeaseOutcome, StatuteError> {
    try_acquire_at(path, field, timeout, time::now_secs())
}

/// [`try_acquire`] with an explicit clock (epoch seconds).
pub fn try_acquire_at(
    path: &Path,
    field: &str,
    timeout: Duration,
    now_secs: u64,
) -> Result<LeaseOutcome, StatuteError> {
    if !path.is_file() {
        return Err(StatuteError::NotFound(path.display().to_string()));
    }
    let Some(_guard) = try_guard(path, timeout)? else {
        return Ok(LeaseOutcome::ForeignActive);
    };

    let mut rec = record::Record::read(path)?;
    if !rec.header.is_delimited() {
        return Err(Precondition::MissingHeader(path.to_path_buf()).into());
    }

    let outcome = match rec.header.get(field).filter(|v| !v.trim().is_empty()) {
        None => LeaseOutcome::Acquired,
        Some(value) => match time::parse_epoch_z(value) {
            Some(started) if now_secs.saturating_sub(started) < timeout.as_secs() => {
                return Ok(LeaseOutcome::ForeignActive);
            }
            // Expired or unreadable: abandoned.
            _ => LeaseOutcome::Reclaimed,
        },
    };

    // Clearing and re-acquiring collapse into one atomic replace.
    rec.header.set(field, &time::epoch_z(now_secs));
    write_atomic(path, &rec.to_text())?;
    Ok(outcome)
}

/// Clears `field` unconditionally. Idempotent; a record that has already
/// transitioned away (file gone) or carries no lease is left alone.
pub fn release(path: &Path, field: &str, timeout: Duration) -> Result<LeaseUpdate, StatuteError> {
    set_field(path, field, None, timeout)
}

/// Overwrites the lease timestamp with the current time, whoever held it.
/// Used when the worker a lease was taken for confirms it has started.
pub fn refresh(path: &Path, field: &str, timeout: Duration) -> Result<LeaseUpdate, StatuteError> {
    set_field(path, field, Some(time::now_secs()), timeout)
}

/// Rewrites `field` under the same guard as [`try_acquire`]. The guard is
/// held only for a read and a rename, so this waits briefly for it; if it is
/// still held the update is skipped and `Busy` returned.
fn set_field(
    path: &Path,
    field: &str,
    value: Option<u64>,
    timeout: Duration,
) -> Result<LeaseUpdate, StatuteError> {
    if !path.is_file() {
        return Ok(LeaseUpdate::Unchanged);
    }
    let _guard = match FileLock::acquire(&guard_path(path), timeout, UPDATE_GUARD_ATTEMPTS) {
        Ok(guard) => guard,
        Err(StatuteError::ValidationError(_)) => return Ok(LeaseUpdate::Busy),
        Err(err) => return Err(err),
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LeaseUpdate::Unchanged),
        Err(err) => return Err(err.into()),
    };
    let mut rec = record::parse(&text);
    if !rec.header.is_delimited() {
        return Ok(LeaseUpdate::Unchanged);
    }
    match value {
        Some(secs) => rec.header.set(field, &time::epoch_z(secs)),
        None => {
            if !rec.header.remove(field) {
                return Ok(LeaseUpdate::Unchanged);
            }
        }
    }
    write_atomic(path, &rec.to_text())?;
    Ok(LeaseUpdate::Applied)
}

/// Lease timestamp currently recorded on `path`, if any.
pub fn holder_since(path: &Path, field: &str) -> Result<Option<u64>, StatuteError> {
    if !path.is_file() {
        return Ok(None);
    }
    let rec = record::Record::read(path)?;
    Ok(rec.header.get(field).and_then(time::parse_epoch_z))
}
