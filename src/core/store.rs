//! Store abstraction for the constitutional record tree.
//!
//! All state lives under `<root>/.constitution/`:
//!
//! ```text
//! .constitution/
//!   <marker> LAW
//!   statute.toml
//!   .state/journal.jsonl
//!   .state/grants.json
//!   amendments/
//!     <marker> .founding
//!     <marker> <YYYYMMDDHHMMSS>
//! ```
//!
//! Any worker may read any record. Writes go through [`write_atomic`] so a
//! reader never observes a torn file.

use crate::core::decoration::{
    self, AmendmentState, Decoration, FOUNDING_BASE, LAW_BASE, LawState, RecordKind,
};
use crate::core::error::StatuteError;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use ulid::Ulid;

pub const CONSTITUTION_DIR: &str = ".constitution";
pub const AMENDMENTS_DIR: &str = "amendments";
pub const STATE_DIR: &str = ".state";

/// Handle on one constitutional tree.
#[derive(Debug, Clone)]
pub struct Store {
    /// Workspace root (parent of `.constitution/`)
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walks up from `start_dir` to the first directory holding `.constitution/`.
    pub fn discover(start_dir: &Path) -> Result<Self, StatuteError> {
        let mut current_dir = PathBuf::from(start_dir);
        loop {
            if current_dir.join(CONSTITUTION_DIR).is_dir() {
                return Ok(Self::new(current_dir));
            }
            if !current_dir.pop() {
                return Err(StatuteError::NotFound(
                    "'.constitution' directory not found in current or parent directories. Run `statute init` first.".to_string(),
                ));
            }
        }
    }

    pub fn constitution_dir(&self) -> PathBuf {
        self.root.join(CONSTITUTION_DIR)
    }

    pub fn amendments_dir(&self) -> PathBuf {
        self.constitution_dir().join(AMENDMENTS_DIR)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.constitution_dir().join(STATE_DIR)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.state_dir().join("journal.jsonl")
    }

    pub fn grants_path(&self) -> PathBuf {
        self.state_dir().join("grants.json")
    }

    pub fn delegations_path(&self) -> PathBuf {
        self.state_dir().join("delegations.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.constitution_dir().join("statute.toml")
    }

    pub fn law_path(&self, state: LawState) -> PathBuf {
        self.constitution_dir()
            .join(decoration::with_decoration(LAW_BASE, Decoration::Law(state)))
    }

    pub fn founding_path(&self, state: AmendmentState) -> PathBuf {
        self.amendments_dir().join(decoration::with_decoration(
            FOUNDING_BASE,
            Decoration::Amendment(state),
        ))
    }

    /// Resolves `path_like` against the root and normalizes `.`/`..` lexically,
    /// so paths that do not exist yet can still be classified.
    pub fn resolve(&self, path_like: impl AsRef<Path>) -> PathBuf {
        let path = path_like.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        normalize_lexically(&joined)
    }

    /// Forward-slash path relative to the root. Falls back to the canonical
    /// forms when the lexical prefix does not match (symlinked roots).
    pub fn relative(&self, path: &Path) -> Result<String, StatuteError> {
        let resolved = self.resolve(path);
        let root = normalize_lexically(&self.root);
        if let Ok(rel) = resolved.strip_prefix(&root) {
            return Ok(to_posix(rel));
        }
        let canon_root = fs::canonicalize(&self.root)?;
        let canon_path = match resolved.parent() {
            Some(parent) => match resolved.file_name() {
                Some(name) => fs::canonicalize(parent)?.join(name),
                None => fs::canonicalize(&resolved)?,
            },
            None => fs::canonicalize(&resolved)?,
        };
        canon_path
            .strip_prefix(&canon_root)
            .map(to_posix)
            .map_err(|_| {
                StatuteError::ValidationError(format!(
                    "{} is outside workspace root {}",
                    resolved.display(),
                    self.root.display()
                ))
            })
    }

    /// Where a resolved path sits in the tree, if it names a constitutional
    /// record (whether or not it exists).
    pub fn classify(&self, path: &Path) -> Option<(RecordKind, Decoration)> {
        let resolved = self.resolve(path);
        let name = resolved.file_name()?.to_str()?;
        let parent = resolved.parent()?;
        let (kind, decoration) = decoration::classify(name)?;
        let expected_parent = match kind {
            RecordKind::Law => self.resolve(self.constitution_dir()),
            RecordKind::Amendment | RecordKind::Founding => self.resolve(self.amendments_dir()),
        };
        (parent == expected_parent).then_some((kind, decoration))
    }

    /// Current law record and its state. When an interrupted transition left
    /// more than one, `active` wins over `resolving` over `corrupted`.
    pub fn discover_law(&self) -> Option<(PathBuf, LawState)> {
        LawState::ALL
            .into_iter()
            .map(|s| (self.law_path(s), s))
            .find(|(p, _)| p.is_file())
    }

    /// Current founding record; `accepted` wins over `review` over `draft`.
    pub fn discover_founding(&self) -> Option<(PathBuf, AmendmentState)> {
        [
            AmendmentState::Accepted,
            AmendmentState::Review,
            AmendmentState::Draft,
        ]
        .into_iter()
        .map(|s| (self.founding_path(s), s))
        .find(|(p, _)| p.is_file())
    }

    /// Amendment records (founding excluded), sorted by path.
    pub fn list_amendments(&self) -> Result<Vec<(PathBuf, AmendmentState)>, StatuteError> {
        let dir = self.amendments_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some((RecordKind::Amendment, Decoration::Amendment(state))) =
                decoration::classify(name)
            {
                out.push((path, state));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    pub fn accepted_amendments(&self) -> Result<Vec<PathBuf>, StatuteError> {
        Ok(self
            .list_amendments()?
            .into_iter()
            .filter(|(_, s)| *s == AmendmentState::Accepted)
            .map(|(p, _)| p)
            .collect())
    }

    /// Base name of the newest accepted amendment.
    pub fn latest_accepted_base(&self) -> Result<Option<String>, StatuteError> {
        Ok(self.accepted_amendments()?.last().and_then(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| decoration::strip(n).to_string())
        }))
    }
}

/// Same directory, same base name, different decoration.
pub fn with_state(path: &Path, decoration: Decoration) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    path.with_file_name(decoration::with_decoration(
        decoration::strip(name),
        decoration,
    ))
}

/// Writes `contents` to a unique sibling temp file and renames it over
/// `path`. The rename is the only point at which readers see a change.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), StatuteError> {
    let parent = path.parent().ok_or_else(|| {
        StatuteError::ValidationError(format!("{} has no parent directory", path.display()))
    })?;
    let tmp = parent.join(format!(".{}.tmp", Ulid::new()));
    let result = (|| -> Result<(), std::io::Error> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(StatuteError::IoError)
}

pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
