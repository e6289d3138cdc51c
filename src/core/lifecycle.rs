//! Lifecycle engine for amendment, founding and law records.
//!
//! Amendment-family records move `draft -> review -> accepted`; the law moves
//! between `active`, `resolving` and `corrupted`. Every transition rewrites
//! the header first (temp file + rename) and then renames the file onto its
//! new decoration; that rename is the commit point. A transition interrupted
//! between the two steps leaves a state a later call recognizes and finishes.
//!
//! Precondition failures leave the filesystem untouched and surface as
//! [`Precondition`] errors.

use crate::core::config::Config;
use crate::core::decoration::{AmendmentState, Decoration, LawState, RecordKind};
use crate::core::error::{Precondition, StatuteError};
use crate::core::hash_chain;
use crate::core::journal::Journal;
use crate::core::record::{self, Header, Record};
use crate::core::store::{self, Store, write_atomic};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const PENDING_SENTINEL: &str = "⏳";
pub const FAILED_SENTINEL: &str = "❌";

pub const STATUS: &str = "status";
pub const APPLY_OK_AT: &str = "apply_ok_at";
pub const AMENDMENTS_HASH: &str = "amendments_hash";
pub const LAST_RECONCILED: &str = "last_reconciled_amendment";
pub const NEEDS_INPUT_REASON: &str = "needs_input_reason_code";
pub const NEEDS_INPUT_REQUEST: &str = "needs_input_request";
pub const STALE_REASON: &str = "stale_reason";
pub const STALE_SINCE_HASH: &str = "stale_since_hash";
pub const STALE_ARTICLE_PATH: &str = "stale_article_path";

/// Transient fields dropped when a record is accepted.
const ACCEPTANCE_STRIP: &[&str] = &[
    STATUS,
    crate::core::lease::EVALUATION_LEASE,
    NEEDS_INPUT_REASON,
    NEEDS_INPUT_REQUEST,
];

/// Fields dropped from law on reconciliation, legacy spellings included.
const RECONCILE_STRIP: &[&str] = &[
    STALE_REASON,
    STALE_SINCE_HASH,
    STALE_ARTICLE_PATH,
    "stale_amendment_path",
    "pending_reason_code",
    "articles_hash",
    STATUS,
    crate::core::lease::RESOLUTION_LEASE,
];

const INITIAL_LAW_BODY: &str =
    "# LAW\n\nNo articles have been codified yet. Reconcile after the first amendment is accepted.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOkStamp {
    /// Evaluation pending (`⏳`).
    Pending,
    /// Current trimmed body hash.
    Ok,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuitabilityVerdict {
    ApplyOk,
    NeedsInput { reason_code: String, request: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleCause {
    RecordAccepted { article_path: String },
    AmendmentsDriftDetected,
}

impl StaleCause {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RecordAccepted { .. } => "record_accepted",
            Self::AmendmentsDriftDetected => "amendments_drift_detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DriftOutcome {
    NoLaw,
    /// Law is not active; drift is already being handled or needs recovery.
    NotActive { state: LawState },
    Clean { amendments_hash: String },
    Drifted { stored: String, current: String },
    Corrupted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Promotion {
    pub accepted: String,
    pub already_accepted: bool,
    pub law_marked_resolving: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub law: String,
    pub previous_state: LawState,
    pub amendments_hash: String,
    pub last_reconciled_amendment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub law: String,
    pub created: bool,
    pub amendments_hash: String,
}

pub struct Engine {
    store: Store,
    config: Config,
    journal: Journal,
}

impl Engine {
    pub fn open(store: Store) -> Result<Self, StatuteError> {
        let config = Config::load(&store)?;
        Ok(Self::with_config(store, config))
    }

    pub fn with_config(store: Store, config: Config) -> Self {
        let journal = Journal::new(&store, &config.actor);
        Self {
            store,
            config,
            journal,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Creates the directory layout and an active law matching the current
    /// accepted set. An existing law is left as it is.
    pub fn init(&self) -> Result<InitReport, StatuteError> {
        fs::create_dir_all(self.store.amendments_dir())?;
        fs::create_dir_all(self.store.state_dir())?;

        if let Some((path, _)) = self.store.discover_law() {
            return Ok(InitReport {
                law: self.store.relative(&path)?,
                created: false,
                amendments_hash: hash_chain::compute_amendments_hash(&self.store)?,
            });
        }

        let amendments_hash = hash_chain::compute_amendments_hash(&self.store)?;
        let mut header = Header::new();
        header.set(AMENDMENTS_HASH, &amendments_hash);
        if let Some(last) = self.store.latest_accepted_base()? {
            header.set(LAST_RECONCILED, &last);
        }
        let law = Record::new(header, INITIAL_LAW_BODY);
        let path = self.store.law_path(LawState::Active);
        write_atomic(&path, &law.to_text())?;

        let rel = self.store.relative(&path)?;
        self.journal.record(
            "init",
            Some(&rel),
            "success",
            Some(json!({ "amendments_hash": amendments_hash })),
        )?;
        Ok(InitReport {
            law: rel,
            created: true,
            amendments_hash,
        })
    }

    /// Sets `apply_ok_at` on a draft/review record.
    pub fn stamp_apply_ok(&self, path: &Path, stamp: ApplyOkStamp) -> Result<String, StatuteError> {
        let (path, _) = self.open_pending(path)?;
        let mut rec = read_with_header(&path)?;
        let value = match stamp {
            ApplyOkStamp::Pending => PENDING_SENTINEL.to_string(),
            ApplyOkStamp::Ok => hash_chain::body_hash(&rec.body),
        };
        rec.header.set(APPLY_OK_AT, &value);
        write_atomic(&path, &rec.to_text())?;

        self.journal.record(
            "stamp",
            Some(&self.store.relative(&path)?),
            "success",
            Some(json!({ APPLY_OK_AT: value })),
        )?;
        Ok(value)
    }

    /// Records the evaluator's verdict on a draft/review record. Returns the
    /// record's path afterwards (a `NeedsInput` verdict moves it to draft).
    pub fn apply_suitability(
        &self,
        path: &Path,
        verdict: &SuitabilityVerdict,
    ) -> Result<PathBuf, StatuteError> {
        if let SuitabilityVerdict::NeedsInput {
            reason_code,
            request,
        } = verdict
            && (reason_code.trim().is_empty() || request.trim().is_empty())
        {
            return Err(Precondition::MissingNeedsInputDetail.into());
        }

        let (path, _) = self.open_pending(path)?;
        let mut rec = read_with_header(&path)?;

        let result = match verdict {
            SuitabilityVerdict::ApplyOk => {
                if rec.status() == "needs_input" {
                    rec.header.set_plain(STATUS, "draft");
                }
                rec.header.set(APPLY_OK_AT, &hash_chain::body_hash(&rec.body));
                rec.header.remove_all(&[NEEDS_INPUT_REASON, NEEDS_INPUT_REQUEST]);
                "APPLY_OK"
            }
            SuitabilityVerdict::NeedsInput {
                reason_code,
                request,
            } => {
                rec.header.set_plain(STATUS, "needs_input");
                rec.header.set(APPLY_OK_AT, FAILED_SENTINEL);
                rec.header.set(NEEDS_INPUT_REASON, reason_code);
                rec.header.set(NEEDS_INPUT_REQUEST, request);
                "NEEDS_INPUT"
            }
        };

        write_atomic(&path, &rec.to_text())?;
        let target = match projected_state(&rec.status()) {
            Some(state) => rename_to(&path, Decoration::Amendment(state))?,
            None => path,
        };

        self.journal.record(
            "suitability",
            Some(&self.store.relative(&target)?),
            "success",
            Some(json!({ "result": result })),
        )?;
        Ok(target)
    }

    /// Renames a draft/review record so its decoration reflects the header
    /// `status`. Ghosts and accepted records are returned unchanged.
    pub fn sync_decoration(&self, path: &Path) -> Result<PathBuf, StatuteError> {
        let path = self.store.resolve(path);
        let Some((_, Decoration::Amendment(current))) = self.store.classify(&path) else {
            return Err(Precondition::NotConstitutional(path).into());
        };
        if current == AmendmentState::Accepted || is_ghost(&path) || !path.is_file() {
            return Ok(path);
        }
        let rec = Record::read(&path)?;
        let Some(wanted) = projected_state(&rec.status()) else {
            return Ok(path);
        };
        if wanted == current {
            return Ok(path);
        }
        let target = rename_to(&path, Decoration::Amendment(wanted))?;
        self.journal.record(
            "sync",
            Some(&self.store.relative(&target)?),
            "success",
            Some(json!({ "from": current, "to": wanted })),
        )?;
        Ok(target)
    }

    /// Post-edit bookkeeping: marks the evaluation pending and projects the
    /// status onto the decoration. Skips ghosts and non-records.
    pub fn after_edit(&self, path: &Path) -> Result<Option<PathBuf>, StatuteError> {
        let path = self.store.resolve(path);
        let Some((_, Decoration::Amendment(state))) = self.store.classify(&path) else {
            return Ok(None);
        };
        if state == AmendmentState::Accepted || !path.is_file() || is_ghost(&path) {
            return Ok(None);
        }
        let mut rec = Record::read(&path)?;
        if !rec.header.is_delimited() {
            return Ok(None);
        }
        if matches!(rec.status().as_str(), "draft" | "review") {
            rec.header.set(APPLY_OK_AT, PENDING_SENTINEL);
            write_atomic(&path, &rec.to_text())?;
        }
        self.sync_decoration(&path).map(Some)
    }

    /// Moves a reviewed record to accepted and marks the law resolving.
    pub fn promote(&self, path: &Path) -> Result<Promotion, StatuteError> {
        let path = self.store.resolve(path);
        let Some((_, decoration)) = self.store.classify(&path) else {
            return Err(Precondition::NotConstitutional(path).into());
        };
        let Decoration::Amendment(state) = decoration else {
            return Err(Precondition::WrongDecoration {
                path,
                expected: "📝 or 🔍",
                found: decoration.marker().to_string(),
            }
            .into());
        };

        let accepted = store::with_state(&path, Decoration::Amendment(AmendmentState::Accepted));
        if accepted.is_file() {
            // Already promoted; finish any interrupted cleanup.
            remove_pending_siblings(&accepted)?;
            self.check_drift()?;
            let rel = self.store.relative(&accepted)?;
            self.journal
                .record("promote", Some(&rel), "already_accepted", None)?;
            return Ok(Promotion {
                accepted: rel,
                already_accepted: true,
                law_marked_resolving: false,
            });
        }
        if state == AmendmentState::Accepted || !path.is_file() {
            return Err(StatuteError::NotFound(path.display().to_string()));
        }

        let mut rec = read_with_header(&path)?;
        let status = rec.status();
        if status != "review" {
            return Err(Precondition::StatusNotReview {
                path,
                found: status,
            }
            .into());
        }
        let expected = hash_chain::body_hash(&rec.body);
        let found = rec.header.get(APPLY_OK_AT).unwrap_or_default().to_string();
        if found != expected {
            return Err(Precondition::ApplyOkMismatch {
                path,
                expected,
                found,
            }
            .into());
        }

        rec.header.remove_all(ACCEPTANCE_STRIP);
        write_atomic(&accepted, &rec.to_text())?;
        remove_pending_siblings(&accepted)?;

        let rel = self.store.relative(&accepted)?;
        let law_marked_resolving = self
            .mark_law_resolving(&StaleCause::RecordAccepted {
                article_path: rel.clone(),
            })?
            .is_some();

        self.journal.record(
            "promote",
            Some(&rel),
            "success",
            Some(json!({ "law_marked_resolving": law_marked_resolving })),
        )?;
        Ok(Promotion {
            accepted: rel,
            already_accepted: false,
            law_marked_resolving,
        })
    }

    /// Moves an active law to resolving. Returns the new path, or `None` when
    /// the law is missing, not active, or turns out to be unparseable, in
    /// which case it is moved to corrupted instead.
    pub fn mark_law_resolving(&self, cause: &StaleCause) -> Result<Option<PathBuf>, StatuteError> {
        let Some((path, LawState::Active)) = self.store.discover_law() else {
            return Ok(None);
        };
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut rec = match record::parse_strict(&text) {
            Ok(rec) => rec,
            Err(err) => {
                self.mark_law_corrupted(&path, &err.to_string())?;
                return Ok(None);
            }
        };
        let since = rec
            .header
            .get(AMENDMENTS_HASH)
            .unwrap_or_default()
            .to_string();

        rec.header.set(STALE_REASON, cause.reason());
        rec.header.set(STALE_SINCE_HASH, &since);
        match cause {
            StaleCause::RecordAccepted { article_path } => {
                rec.header.set(STALE_ARTICLE_PATH, article_path)
            }
            StaleCause::AmendmentsDriftDetected => {
                rec.header.remove(STALE_ARTICLE_PATH);
            }
        }
        rec.header.remove(STATUS);

        write_atomic(&path, &rec.to_text())?;
        let target = rename_to(&path, Decoration::Law(LawState::Resolving))?;
        self.journal.record(
            "law.resolving",
            Some(&self.store.relative(&target)?),
            "success",
            Some(json!({ STALE_REASON: cause.reason(), STALE_SINCE_HASH: since })),
        )?;
        Ok(Some(target))
    }

    /// Compares an active law's stored fingerprint with the recomputed one.
    /// Mismatch moves it to resolving; an unparseable header to corrupted.
    pub fn check_drift(&self) -> Result<DriftOutcome, StatuteError> {
        let Some((path, state)) = self.store.discover_law() else {
            return Ok(DriftOutcome::NoLaw);
        };
        if state != LawState::Active {
            return Ok(DriftOutcome::NotActive { state });
        }

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            // Renamed by a concurrent worker.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DriftOutcome::NoLaw),
            Err(err) => return Err(err.into()),
        };
        let rec = match record::parse_strict(&text) {
            Ok(rec) => rec,
            Err(err) => {
                let reason = err.to_string();
                self.mark_law_corrupted(&path, &reason)?;
                return Ok(DriftOutcome::Corrupted { reason });
            }
        };

        let current = hash_chain::compute_amendments_hash(&self.store)?;
        let stored = rec.header.get(AMENDMENTS_HASH).unwrap_or_default().to_string();
        if stored == current {
            return Ok(DriftOutcome::Clean {
                amendments_hash: current,
            });
        }
        self.mark_law_resolving(&StaleCause::AmendmentsDriftDetected)?;
        Ok(DriftOutcome::Drifted { stored, current })
    }

    /// Renames the law at `path` to corrupted. Recovery is manual.
    pub fn mark_law_corrupted(&self, path: &Path, reason: &str) -> Result<PathBuf, StatuteError> {
        let target = rename_to(path, Decoration::Law(LawState::Corrupted))?;
        self.journal.record(
            "law.corrupted",
            Some(&self.store.relative(&target)?),
            "success",
            Some(json!({ "reason": reason })),
        )?;
        Ok(target)
    }

    /// Rewrites the law fingerprint to match the accepted set and makes the
    /// law active again.
    pub fn reconcile(&self) -> Result<Reconciliation, StatuteError> {
        let Some((path, previous_state)) = self.store.discover_law() else {
            return Err(StatuteError::LawNotFound);
        };
        if previous_state == LawState::Corrupted {
            return Err(StatuteError::LawCorrupted(self.store.relative(&path)?));
        }

        let text = fs::read_to_string(&path)?;
        let mut rec = record::parse_strict(&text)?;
        let amendments_hash = hash_chain::compute_amendments_hash(&self.store)?;
        let last = self.store.latest_accepted_base()?;

        rec.header.set(AMENDMENTS_HASH, &amendments_hash);
        if let Some(last) = &last {
            rec.header.set(LAST_RECONCILED, last);
        }
        rec.header.remove_all(RECONCILE_STRIP);

        write_atomic(&path, &rec.to_text())?;
        let target = rename_to(&path, Decoration::Law(LawState::Active))?;
        let rel = self.store.relative(&target)?;
        self.journal.record(
            "reconcile",
            Some(&rel),
            "success",
            Some(json!({ AMENDMENTS_HASH: amendments_hash, "from": previous_state })),
        )?;
        Ok(Reconciliation {
            law: rel,
            previous_state,
            amendments_hash,
            last_reconciled_amendment: last,
        })
    }

    /// Review-status records whose `apply_ok_at` does not certify the current
    /// body. A pending founding record is returned alone, ahead of amendments.
    pub fn records_needing_evaluation(&self) -> Result<Vec<PathBuf>, StatuteError> {
        if let Some((founding, state)) = self.store.discover_founding()
            && state != AmendmentState::Accepted
            && !is_ghost(&founding)
            && needs_evaluation(&founding)?
        {
            return Ok(vec![founding]);
        }
        let mut out = Vec::new();
        for (path, state) in self.store.list_amendments()? {
            if state == AmendmentState::Accepted || is_ghost(&path) {
                continue;
            }
            if needs_evaluation(&path)? {
                out.push(path);
            }
        }
        Ok(out)
    }

    /// Resolves `path` to an existing draft/review record.
    fn open_pending(&self, path: &Path) -> Result<(PathBuf, RecordKind), StatuteError> {
        let path = self.store.resolve(path);
        let Some((kind, decoration)) = self.store.classify(&path) else {
            return Err(Precondition::NotConstitutional(path).into());
        };
        match decoration {
            Decoration::Amendment(AmendmentState::Accepted) => {
                Err(Precondition::AlreadyAccepted(path).into())
            }
            Decoration::Amendment(_) if path.is_file() => Ok((path, kind)),
            Decoration::Amendment(_) => Err(StatuteError::NotFound(path.display().to_string())),
            Decoration::Law(_) => Err(Precondition::WrongDecoration {
                path,
                expected: "📝 or 🔍",
                found: decoration.marker().to_string(),
            }
            .into()),
        }
    }
}

/// Decoration a header `status` projects onto.
pub fn projected_state(status: &str) -> Option<AmendmentState> {
    match status {
        "review" => Some(AmendmentState::Review),
        "" | "draft" | "needs_input" => Some(AmendmentState::Draft),
        _ => None,
    }
}

/// A draft/review file whose accepted counterpart already exists.
pub fn is_ghost(path: &Path) -> bool {
    store::with_state(path, Decoration::Amendment(AmendmentState::Accepted)).is_file()
}

fn needs_evaluation(path: &Path) -> Result<bool, StatuteError> {
    let rec = Record::read(path)?;
    if rec.status() != "review" {
        return Ok(false);
    }
    Ok(match rec.header.get(APPLY_OK_AT) {
        None | Some("") | Some(PENDING_SENTINEL) => true,
        Some(value) => value != hash_chain::body_hash(&rec.body),
    })
}

fn read_with_header(path: &Path) -> Result<Record, StatuteError> {
    let rec = Record::read(path)?;
    if !rec.header.is_delimited() {
        return Err(Precondition::MissingHeader(path.to_path_buf()).into());
    }
    Ok(rec)
}

fn rename_to(path: &Path, decoration: Decoration) -> Result<PathBuf, StatuteError> {
    let target = store::with_state(path, decoration);
    if target != path {
        fs::rename(path, &target)?;
    }
    Ok(target)
}

fn remove_pending_siblings(accepted: &Path) -> Result<(), StatuteError> {
    for state in [AmendmentState::Draft, AmendmentState::Review] {
        let ghost = store::with_state(accepted, Decoration::Amendment(state));
        match fs::remove_file(&ghost) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
