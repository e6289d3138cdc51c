//! State encoder: lifecycle state as a filename decoration.
//!
//! A decorated name is `<marker> <base>`. Amendment-family records (the
//! founding record included) and the law record use disjoint marker
//! alphabets. An unknown or absent marker means "not a constitutional
//! record", never an error.

use serde::Serialize;
use std::fmt;

pub const LAW_BASE: &str = "LAW";
pub const FOUNDING_BASE: &str = ".founding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentState {
    Draft,
    Review,
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LawState {
    Active,
    Resolving,
    Corrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoration {
    Amendment(AmendmentState),
    Law(LawState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Amendment,
    Founding,
    Law,
}

impl AmendmentState {
    pub const ALL: [AmendmentState; 3] = [Self::Draft, Self::Review, Self::Accepted];

    pub fn marker(self) -> &'static str {
        match self {
            Self::Draft => "📝",
            Self::Review => "🔍",
            Self::Accepted => "✅",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Review => "review",
            Self::Accepted => "accepted",
        }
    }
}

impl LawState {
    pub const ALL: [LawState; 3] = [Self::Active, Self::Resolving, Self::Corrupted];

    pub fn marker(self) -> &'static str {
        match self {
            Self::Active => "📜",
            Self::Resolving => "⏳",
            Self::Corrupted => "❌",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolving => "resolving",
            Self::Corrupted => "corrupted",
        }
    }
}

impl Decoration {
    pub fn marker(self) -> &'static str {
        match self {
            Self::Amendment(s) => s.marker(),
            Self::Law(s) => s.marker(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amendment(s) => s.as_str(),
            Self::Law(s) => s.as_str(),
        }
    }

    fn all() -> impl Iterator<Item = Decoration> {
        AmendmentState::ALL
            .into_iter()
            .map(Decoration::Amendment)
            .chain(LawState::ALL.into_iter().map(Decoration::Law))
    }
}

impl fmt::Display for AmendmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for LawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.marker(), self.as_str())
    }
}

/// Decoration carried by a file name, if any.
pub fn decoration_of(name: &str) -> Option<Decoration> {
    Decoration::all().find(|d| {
        name.strip_prefix(d.marker())
            .is_some_and(|rest| rest.starts_with(' ') && rest.len() > 1)
    })
}

pub fn with_decoration(base: &str, decoration: Decoration) -> String {
    format!("{} {}", decoration.marker(), base)
}

/// Removes a known decoration; undecorated names are returned unchanged.
pub fn strip(name: &str) -> &str {
    match decoration_of(name) {
        Some(d) => &name[d.marker().len() + 1..],
        None => name,
    }
}

/// Amendment base names are sortable 14-digit timestamps (`YYYYMMDDHHMMSS`).
pub fn is_amendment_base(base: &str) -> bool {
    base.len() == 14 && base.bytes().all(|b| b.is_ascii_digit())
}

pub fn kind_of_base(base: &str) -> Option<RecordKind> {
    if base == LAW_BASE {
        Some(RecordKind::Law)
    } else if base == FOUNDING_BASE {
        Some(RecordKind::Founding)
    } else if is_amendment_base(base) {
        Some(RecordKind::Amendment)
    } else {
        None
    }
}

/// Kind and decoration of a constitutional file name. A decoration from the
/// wrong alphabet for the base name is not constitutional.
pub fn classify(name: &str) -> Option<(RecordKind, Decoration)> {
    let decoration = decoration_of(name)?;
    let kind = kind_of_base(strip(name))?;
    match (kind, decoration) {
        (RecordKind::Law, Decoration::Law(_)) => Some((kind, decoration)),
        (RecordKind::Amendment | RecordKind::Founding, Decoration::Amendment(_)) => {
            Some((kind, decoration))
        }
        _ => None,
    }
}

/// Amendment-family state of a file name, if it is one.
pub fn amendment_state(name: &str) -> Option<AmendmentState> {
    match classify(name)? {
        (RecordKind::Amendment | RecordKind::Founding, Decoration::Amendment(s)) => Some(s),
        _ => None,
    }
}

pub fn law_state(name: &str) -> Option<LawState> {
    match classify(name)? {
        (RecordKind::Law, Decoration::Law(s)) => Some(s),
        _ => None,
    }
}
