//! Append-only audit journal (`.constitution/.state/journal.jsonl`).
//!
//! Every lifecycle mutation and gate decision is recorded as one JSON line.
//! The journal is observational: it is never read back to make a decision.

use crate::core::error::StatuteError;
use crate::core::store::Store;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JournalEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub target: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    actor: String,
}

impl Journal {
    pub fn new(store: &Store, actor: &str) -> Self {
        Self {
            path: store.journal_path(),
            actor: actor.to_string(),
        }
    }

    pub fn record(
        &self,
        op: &str,
        target: Option<&str>,
        status: &str,
        detail: Option<serde_json::Value>,
    ) -> Result<(), StatuteError> {
        let ev = JournalEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: self.actor.clone(),
            op: op.to_string(),
            target: target.map(|s| s.to_string()),
            status: status.to_string(),
            detail,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(&ev)?;
        line.push('\n');
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // One write_all per line.
        f.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Events in append order. Lines that fail to parse are skipped.
    pub fn events(&self) -> Result<Vec<JournalEvent>, StatuteError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Ok(ev) = serde_json::from_str::<JournalEvent>(&line) {
                out.push(ev);
            }
        }
        Ok(out)
    }
}
