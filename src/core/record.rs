//! Record codec: an ordered header block followed by an opaque body.
//!
//! ```text
//! ---
//! status: review
//! apply_ok_at: "9f2c..."
//! ---
//! body text
//! ```
//!
//! Parsing never fails on malformed input: text without the delimiter pair is
//! a plain document with an empty header. Untouched header lines are kept
//! verbatim so `serialize(parse(text)) == text`.

use crate::core::error::StatuteError;
use crate::core::output;
use std::fs;
use std::path::Path;

const OPEN: &str = "---\n";
const CLOSE: &str = "\n---\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderLine {
    Field {
        key: String,
        value: String,
        /// Original line text; `None` once the field has been rewritten.
        raw: Option<String>,
        /// Indented continuation lines, kept verbatim.
        nested: Vec<String>,
    },
    Opaque(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    lines: Vec<HeaderLine>,
    delimited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub body: String,
}

/// Splits `text` into (header text, body) when the delimiter pair is present.
fn split_delimited(text: &str) -> Option<(&str, &str)> {
    if !text.starts_with(OPEN) {
        return None;
    }
    let close = text[OPEN.len()..].find(CLOSE)? + OPEN.len();
    Some((&text[OPEN.len()..close], &text[close + CLOSE.len()..]))
}

fn parse_field(line: &str) -> Option<(String, String)> {
    if line.starts_with(char::is_whitespace) || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

fn parse_lines(header_text: &str) -> Vec<HeaderLine> {
    let mut lines: Vec<HeaderLine> = Vec::new();
    for line in header_text.split('\n') {
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if indented && !line.trim().is_empty() {
            if let Some(HeaderLine::Field { nested, .. }) = lines.last_mut() {
                nested.push(line.to_string());
                continue;
            }
        }
        match parse_field(line) {
            Some((key, value)) => lines.push(HeaderLine::Field {
                key,
                value,
                raw: Some(line.to_string()),
                nested: Vec::new(),
            }),
            None => lines.push(HeaderLine::Opaque(line.to_string())),
        }
    }
    lines
}

/// Parses a record, failing soft: no delimiter pair means an empty header and
/// the whole text as body.
pub fn parse(text: &str) -> Record {
    match split_delimited(text) {
        Some((header_text, body)) => Record {
            header: Header {
                lines: parse_lines(header_text),
                delimited: true,
            },
            body: body.to_string(),
        },
        None => Record {
            header: Header::default(),
            body: text.to_string(),
        },
    }
}

/// Strict variant used for derived records: the header must exist and every
/// top-level line must be a field, blank, or a `#` comment.
pub fn parse_strict(text: &str) -> Result<Record, StatuteError> {
    let (header_text, _) = split_delimited(text).ok_or_else(|| {
        StatuteError::MalformedHeader("missing header delimiter pair".to_string())
    })?;
    let record = parse(text);
    for line in header_text.split('\n') {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }
        if parse_field(line).is_none() {
            return Err(StatuteError::MalformedHeader(format!(
                "unparseable header line: {}",
                output::compact_line(line, 60)
            )));
        }
    }
    Ok(record)
}

pub fn serialize(header: &Header, body: &str) -> String {
    if !header.delimited && header.lines.is_empty() {
        return body.to_string();
    }
    let mut out = String::with_capacity(body.len() + 64);
    out.push_str(OPEN);
    let mut first = true;
    for line in &header.lines {
        let mut push = |text: &str| {
            if !first {
                out.push('\n');
            }
            out.push_str(text);
            first = false;
        };
        match line {
            HeaderLine::Field {
                key,
                value,
                raw,
                nested,
            } => {
                match raw {
                    Some(raw) => push(raw),
                    None => push(&format!("{}: {}", key, value)),
                }
                for n in nested {
                    push(n);
                }
            }
            HeaderLine::Opaque(text) => push(text),
        }
    }
    out.push_str(CLOSE);
    out.push_str(body);
    out
}

/// Returns the body with any header removed, trimmed of surrounding
/// whitespace. This is the text every digest in the system is computed over.
pub fn trimmed_body(text: &str) -> &str {
    match split_delimited(text) {
        Some((_, body)) => body.trim(),
        None => text.trim(),
    }
}

/// Removes one matching pair of surrounding quotes. Inner quotes are kept.
pub fn unquote(value: &str) -> &str {
    let v = value.trim();
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

impl Header {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            delimited: true,
        }
    }

    pub fn is_delimited(&self) -> bool {
        self.delimited
    }

    pub fn is_empty(&self) -> bool {
        !self
            .lines
            .iter()
            .any(|l| matches!(l, HeaderLine::Field { .. }))
    }

    /// Field names in serialization order (duplicates included).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HeaderLine::Field { key, .. } => Some(key.as_str()),
            HeaderLine::Opaque(_) => None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    /// Raw scalar text after the colon. The last occurrence wins.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|l| match l {
            HeaderLine::Field { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Scalar value with one pair of surrounding quotes removed.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_raw(key).map(unquote)
    }

    /// Indented lines nested under `key`, verbatim.
    pub fn nested(&self, key: &str) -> Option<&[String]> {
        self.lines.iter().rev().find_map(|l| match l {
            HeaderLine::Field { key: k, nested, .. } if k == key => Some(nested.as_slice()),
            _ => None,
        })
    }

    /// Sets `key` to a double-quoted scalar. Line breaks and control
    /// characters are folded to single spaces so a value can never span lines.
    pub fn set(&mut self, key: &str, value: &str) {
        let folded = output::fold_line(value);
        self.set_raw(key, format!("\"{}\"", folded));
    }

    /// Sets `key` to an unquoted token such as `review`.
    pub fn set_plain(&mut self, key: &str, value: &str) {
        let folded = output::fold_line(value);
        self.set_raw(key, folded);
    }

    fn set_raw(&mut self, key: &str, value: String) {
        self.delimited = true;
        let mut seen = false;
        let mut replacement = Some(value);
        self.lines.retain_mut(|line| match line {
            HeaderLine::Field {
                key: k,
                value: v,
                raw,
                nested,
            } if k == key => {
                if seen {
                    return false;
                }
                seen = true;
                if let Some(new) = replacement.take() {
                    *v = new;
                }
                *raw = None;
                nested.clear();
                true
            }
            _ => true,
        });
        if let Some(value) = replacement {
            // Keep a trailing blank line (if any) after the new field.
            let insert_at = match self.lines.last() {
                Some(HeaderLine::Opaque(text)) if text.trim().is_empty() => self.lines.len() - 1,
                _ => self.lines.len(),
            };
            self.lines.insert(
                insert_at,
                HeaderLine::Field {
                    key: key.to_string(),
                    value,
                    raw: None,
                    nested: Vec::new(),
                },
            );
        }
    }

    /// Removes every occurrence of `key`. Returns whether anything changed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|l| !matches!(l, HeaderLine::Field { key: k, .. } if k == key));
        before != self.lines.len()
    }

    pub fn remove_all(&mut self, keys: &[&str]) {
        for key in keys {
            self.remove(key);
        }
    }
}

impl Record {
    pub fn new(header: Header, body: impl Into<String>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    pub fn read(path: &Path) -> Result<Self, StatuteError> {
        let text = fs::read_to_string(path)?;
        Ok(parse(&text))
    }

    pub fn to_text(&self) -> String {
        serialize(&self.header, &self.body)
    }

    pub fn trimmed_body(&self) -> &str {
        self.body.trim()
    }

    /// Lower-cased `status` field, empty when absent.
    pub fn status(&self) -> String {
        self.header
            .get("status")
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }
}
