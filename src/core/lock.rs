//! Sidecar lock files with single-winner `create_new` semantics.
//!
//! A lock is an empty file next to the thing it protects, removed when the
//! holder drops it. A holder that crashed leaves the file behind; once its
//! mtime is older than the caller's `stale_after` it counts as abandoned and
//! is broken by the next caller.

use crate::core::error::StatuteError;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const RETRY_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl FileLock {
    /// One attempt, never blocks. An abandoned lock is removed but this call
    /// still returns `None`; the caller decides whether to come back.
    pub fn try_acquire(path: &Path, stale_after: Duration) -> Result<Option<Self>, StatuteError> {
        match OpenOptions::new().create_new(true).write(true).open(path) {
            Ok(file) => Ok(Some(Self {
                path: path.to_path_buf(),
                _file: file,
            })),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                if is_abandoned(path, stale_after) {
                    let _ = fs::remove_file(path);
                }
                Ok(None)
            }
            Err(err) => Err(StatuteError::IoError(err)),
        }
    }

    /// Up to `attempts` tries, 5ms apart. Fails with `ValidationError` when the
    /// lock stays held.
    pub fn acquire(
        path: &Path,
        stale_after: Duration,
        attempts: u32,
    ) -> Result<Self, StatuteError> {
        for attempt in 0..attempts {
            if let Some(lock) = Self::try_acquire(path, stale_after)? {
                return Ok(lock);
            }
            if attempt + 1 < attempts {
                std::thread::sleep(RETRY_DELAY);
            }
        }
        Err(StatuteError::ValidationError(format!(
            "{} is locked",
            path.display()
        )))
    }
}

/// True when `path` exists and was last modified at least `stale_after` ago.
pub fn is_abandoned(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .is_some_and(|age| age >= stale_after)
}

#[cfg(test)]
pub(crate) fn backdate(path: &Path, by: Duration) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}
