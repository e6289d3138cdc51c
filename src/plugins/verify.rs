use crate::core::decoration::LawState;
use crate::core::error::StatuteError;
use crate::core::hash_chain;
use crate::core::lifecycle::{AMENDMENTS_HASH, Engine};
use crate::core::record;
use crate::core::time;
use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use std::fs;

#[derive(Parser, Debug, Default)]
#[clap(name = "verify", about = "Check that LAW matches the accepted amendments")]
pub struct VerifyCli {
    /// Output machine-readable JSON.
    #[clap(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub passed: bool,
    pub law: Option<String>,
    pub law_state: Option<LawState>,
    pub current_amendments_hash: Option<String>,
    /// Diagnostic objects; keys serialize in sorted order.
    pub diagnostics: Vec<Value>,
    pub summary: String,
}

impl VerifyReport {
    fn fail(
        law: Option<String>,
        law_state: Option<LawState>,
        current: Option<String>,
        diagnostic: Value,
        summary: String,
    ) -> Self {
        Self {
            passed: false,
            law,
            law_state,
            current_amendments_hash: current,
            diagnostics: vec![diagnostic],
            summary: format!("FAIL  {}", summary),
        }
    }

    /// Text lines in output order.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(hash) = &self.current_amendments_hash {
            out.push(format!("current_amendments_hash={}", hash));
        }
        for d in &self.diagnostics {
            out.push(format!("DIAGNOSTIC={}", d));
        }
        out.push(self.summary.clone());
        out.push(format!(
            "RESULT={}",
            if self.passed { "PASS" } else { "FAIL" }
        ));
        out
    }
}

/// Compares the law's stored fingerprint with the accepted set. An active law
/// whose header cannot be parsed is moved to corrupted on the way.
pub fn verify(engine: &Engine) -> Result<VerifyReport, StatuteError> {
    let store = engine.store();
    let Some((path, state)) = store.discover_law() else {
        return Ok(VerifyReport::fail(
            None,
            None,
            None,
            json!({ "code": "LAW_NOT_FOUND" }),
            "No LAW record found".to_string(),
        ));
    };

    let current = hash_chain::compute_amendments_hash(store)?;
    let rel = store.relative(&path)?;

    match state {
        LawState::Corrupted => {
            return Ok(VerifyReport::fail(
                Some(rel.clone()),
                Some(state),
                Some(current),
                json!({ "code": "LAW_CORRUPTED", "path": rel }),
                format!("{}  state=corrupted", rel),
            ));
        }
        LawState::Resolving => {
            return Ok(VerifyReport::fail(
                Some(rel.clone()),
                Some(state),
                Some(current.clone()),
                json!({
                    "code": "LAW_STALE",
                    "path": rel,
                    "current_amendments_hash": current,
                }),
                format!("{}  state=resolving", rel),
            ));
        }
        LawState::Active => {}
    }

    let text = fs::read_to_string(&path)?;
    let law = match record::parse_strict(&text) {
        Ok(law) => law,
        Err(err) => {
            let moved = engine.mark_law_corrupted(&path, &err.to_string())?;
            return Ok(VerifyReport::fail(
                Some(store.relative(&moved)?),
                Some(LawState::Corrupted),
                Some(current),
                json!({
                    "code": "LAW_CORRUPTED",
                    "path": rel,
                    "reason": "malformed_header",
                }),
                format!("{}  renamed to {} (malformed)", rel, LawState::Corrupted.marker()),
            ));
        }
    };

    let stored = law.header.get(AMENDMENTS_HASH).map(str::to_string);
    if stored.as_deref() == Some(current.as_str()) {
        return Ok(VerifyReport {
            passed: true,
            law: Some(rel.clone()),
            law_state: Some(state),
            current_amendments_hash: Some(current.clone()),
            diagnostics: Vec::new(),
            summary: format!("OK    {}  amendments_hash={}", rel, current),
        });
    }

    Ok(VerifyReport::fail(
        Some(rel.clone()),
        Some(state),
        Some(current.clone()),
        json!({
            "code": "HASH_MISMATCH",
            "path": rel,
            "amendments_hash_in_law": stored,
            "current_amendments_hash": current,
        }),
        format!(
            "{}  amendments_hash={}  expected={}",
            rel,
            stored.as_deref().unwrap_or("none"),
            current
        ),
    ))
}

/// Prints the report and returns whether it passed.
pub fn run_verify_cli(engine: &Engine, cli: &VerifyCli) -> Result<bool, StatuteError> {
    let report = verify(engine)?;
    engine.journal().record(
        "verify",
        report.law.as_deref(),
        if report.passed { "pass" } else { "fail" },
        None,
    )?;
    if cli.json {
        let status = if report.passed { "ok" } else { "error" };
        let envelope = time::command_envelope("verify", status, serde_json::to_value(&report)?);
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        for line in report.lines() {
            println!("{}", line);
        }
    }
    Ok(report.passed)
}
