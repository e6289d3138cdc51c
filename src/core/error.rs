use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatuteError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Precondition failed: {0}")]
    Precondition(Precondition),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No LAW record found under .constitution/")]
    LawNotFound,
    #[error("LAW is corrupted and requires manual recovery: {0}")]
    LawCorrupted(String),
    #[error("Malformed header: {0}")]
    MalformedHeader(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Named lifecycle precondition violations. Reported to the caller as-is,
/// never retried or coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    NotConstitutional(PathBuf),
    WrongDecoration {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },
    MissingHeader(PathBuf),
    StatusNotReview {
        path: PathBuf,
        found: String,
    },
    ApplyOkMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    AlreadyAccepted(PathBuf),
    MissingNeedsInputDetail,
}

impl Precondition {
    /// Stable machine-readable code used in journal entries and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConstitutional(_) => "NOT_CONSTITUTIONAL",
            Self::WrongDecoration { .. } => "WRONG_DECORATION",
            Self::MissingHeader(_) => "MISSING_HEADER",
            Self::StatusNotReview { .. } => "STATUS_NOT_REVIEW",
            Self::ApplyOkMismatch { .. } => "APPLY_OK_MISMATCH",
            Self::AlreadyAccepted(_) => "ALREADY_ACCEPTED",
            Self::MissingNeedsInputDetail => "MISSING_NEEDS_INPUT_DETAIL",
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConstitutional(path) => {
                write!(f, "{} is not a constitutional record", path.display())
            }
            Self::WrongDecoration {
                path,
                expected,
                found,
            } => write!(
                f,
                "{} must be decorated {} (found {})",
                path.display(),
                expected,
                found
            ),
            Self::MissingHeader(path) => {
                write!(f, "{} must include a header block", path.display())
            }
            Self::StatusNotReview { path, found } => write!(
                f,
                "{} status must be 'review' before promotion (found '{}')",
                path.display(),
                found
            ),
            Self::ApplyOkMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "{} apply_ok_at must match the current trimmed body hash (expected {}, found '{}')",
                path.display(),
                expected,
                found
            ),
            Self::AlreadyAccepted(path) => {
                write!(f, "{} is accepted and immutable", path.display())
            }
            Self::MissingNeedsInputDetail => {
                write!(f, "NEEDS_INPUT requires both a reason code and a request")
            }
        }
    }
}

impl From<Precondition> for StatuteError {
    fn from(p: Precondition) -> Self {
        StatuteError::Precondition(p)
    }
}

impl StatuteError {
    /// Short code for journal entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IoError(_) => "IO",
            Self::JsonError(_) => "JSON",
            Self::ConfigError(_) => "CONFIG",
            Self::Precondition(p) => p.code(),
            Self::NotFound(_) => "NOT_FOUND",
            Self::LawNotFound => "LAW_NOT_FOUND",
            Self::LawCorrupted(_) => "LAW_CORRUPTED",
            Self::MalformedHeader(_) => "MALFORMED_HEADER",
            Self::ValidationError(_) => "VALIDATION",
        }
    }
}
