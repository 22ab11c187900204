//! Statistic key grammar.
//!
//! A key is zero or more hierarchy segments followed by a base name:
//! `subnet[7].pool[2].total-addresses`. Segment ids may themselves contain
//! dots (D2 key names do), so segments are found by bracket, not by splitting.

use std::fmt;

use thiserror::Error;

use config::source::{POOL_LABEL, SUBNET_LABEL};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,
    #[error("key has no base name")]
    EmptyBaseName,
    #[error("segment `{0}` is not followed by a base name")]
    DanglingSegment(String),
    #[error("malformed segment in `{0}`")]
    MalformedSegment(String),
    #[error("segment `{0}` appears more than once")]
    DuplicateSegment(String),
}

/// One bracketed qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Subnet(String),
    Pool(String),
    /// anything else Kea may invent, e.g. `pd-pool[0]`
    Other { kind: String, id: String },
}

impl Segment {
    fn new(kind: &str, id: &str) -> Self {
        match kind {
            "subnet" => Segment::Subnet(id.to_owned()),
            "pool" => Segment::Pool(id.to_owned()),
            _ => Segment::Other {
                kind: kind.to_owned(),
                id: id.to_owned(),
            },
        }
    }

    /// label this segment's id is exported under
    pub fn label(&self) -> String {
        match self {
            Segment::Subnet(_) => SUBNET_LABEL.to_owned(),
            Segment::Pool(_) => POOL_LABEL.to_owned(),
            Segment::Other { kind, .. } => {
                // leading `__` is reserved by prometheus
                let name = sanitize(kind);
                let name = name.trim_start_matches('_');
                if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                    format!("_{name}_id")
                } else {
                    format!("{name}_id")
                }
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Segment::Subnet(id) | Segment::Pool(id) => id,
            Segment::Other { id, .. } => id,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Subnet(id) => write!(f, "subnet[{id}]"),
            Segment::Pool(id) => write!(f, "pool[{id}]"),
            Segment::Other { kind, id } => write!(f, "{kind}[{id}]"),
        }
    }
}

/// A parsed statistic key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatKey {
    pub segments: Vec<Segment>,
    pub base: String,
}

impl StatKey {
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        let mut segments: Vec<Segment> = Vec::new();
        let mut rest = key;
        while let Some((kind, after)) = segment_start(rest) {
            let close = after
                .find(']')
                .ok_or_else(|| KeyError::MalformedSegment(rest.to_owned()))?;
            let id = &after[..close];
            if id.is_empty() || id.contains('[') {
                return Err(KeyError::MalformedSegment(rest.to_owned()));
            }
            let seg = Segment::new(kind, id);
            let tail = &after[close + 1..];
            rest = match tail.strip_prefix('.') {
                Some(tail) => tail,
                None if tail.is_empty() => return Err(KeyError::DanglingSegment(seg.to_string())),
                None => return Err(KeyError::MalformedSegment(rest.to_owned())),
            };
            if segments.iter().any(|s| s.label() == seg.label()) {
                return Err(KeyError::DuplicateSegment(seg.label()));
            }
            segments.push(seg);
        }
        if rest.is_empty() {
            return Err(KeyError::EmptyBaseName);
        }
        if rest.contains('[') || rest.contains(']') {
            return Err(KeyError::MalformedSegment(rest.to_owned()));
        }
        Ok(Self {
            segments,
            base: rest.to_owned(),
        })
    }
}

/// `kind[` at the start of `s`, where `kind` is a plain word
fn segment_start(s: &str) -> Option<(&str, &str)> {
    let open = s.find('[')?;
    let kind = &s[..open];
    let is_word = !kind.is_empty()
        && kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    is_word.then(|| (kind, &s[open + 1..]))
}

/// lowercase, anything outside `[a-z0-9]` becomes `_`
pub fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
