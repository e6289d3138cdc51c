//! Hash chain over accepted records.
//!
//! For each record in path order the digest consumes
//! `"FILE:" + relative_path + "\n"`, the trimmed body (header removed) and a
//! `"\n\x1e\n"` separator. Header contents never influence the value. There
//! is no key: this detects drift, it does not authenticate.

use crate::core::decoration::AmendmentState;
use crate::core::error::StatuteError;
use crate::core::record;
use crate::core::store::Store;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

const SEPARATOR: &[u8] = b"\n\x1e\n";

/// Digest over `(relative_path, text)` pairs. Input order is irrelevant;
/// records are sorted by path before hashing. `text` may still carry its
/// header, which is stripped here.
pub fn digest<P, B>(records: &[(P, B)]) -> String
where
    P: AsRef<str>,
    B: AsRef<str>,
{
    let mut ordered: Vec<(&str, &str)> = records
        .iter()
        .map(|(p, b)| (p.as_ref(), b.as_ref()))
        .collect();
    ordered.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (path, text) in ordered {
        hasher.update(b"FILE:");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(record::trimmed_body(text).as_bytes());
        hasher.update(SEPARATOR);
    }
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a body after trimming; the value `apply_ok_at` must match.
pub fn body_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Records that make up the chain: the founding record if accepted, then
/// every accepted amendment.
pub fn chain_members(store: &Store) -> Result<Vec<PathBuf>, StatuteError> {
    let mut members = Vec::new();
    if let Some((path, AmendmentState::Accepted)) = store.discover_founding() {
        members.push(path);
    }
    members.extend(store.accepted_amendments()?);
    Ok(members)
}

/// Reads the chain members in parallel and folds them in path order.
pub fn compute_amendments_hash(store: &Store) -> Result<String, StatuteError> {
    let members = chain_members(store)?;
    let loaded: Vec<(String, String)> = members
        .par_iter()
        .map(|path| -> Result<(String, String), StatuteError> {
            let text = fs::read_to_string(path)?;
            Ok((store.relative(path)?, text))
        })
        .collect::<Result<_, _>>()?;
    Ok(digest(&loaded))
}
