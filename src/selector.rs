//! Locator synthesis and resolution.
//!
//! Synthesis walks the ancestor facts of a target element and emits a
//! structural path (`html > body > div:nth-of-type(2) > button`). An element
//! with an id short-circuits the walk: the id is treated as globally unique,
//! so the path starts there. The result is robust to unrelated DOM churn but
//! fragile to structural reordering, a deliberate tradeoff for simplicity.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::dom::{Document, NodeId};
use crate::error::{EngineError, Result};

/// Locators starting with this prefix are path expressions, not structural
/// selectors.
pub const PATH_EXPRESSION_PREFIX: &str = "//";

/// Per-ancestor facts for one level of a target element's path, ordered
/// target-first. The production capture script gathers these in the page; the
/// in-memory document derives them from its tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    /// 1-based position among siblings sharing the same tag.
    #[serde(default = "default_ordinal")]
    pub ordinal: usize,
}

fn default_ordinal() -> usize {
    1
}

impl PathSegment {
    pub fn new(tag: &str, id: Option<&str>, ordinal: usize) -> Self {
        Self {
            tag: tag.to_string(),
            id: id.map(|s| s.to_string()),
            ordinal,
        }
    }
}

/// Build a locator string from target-first ancestor facts.
pub fn synthesize(path: &[PathSegment]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(path.len());
    for segment in path {
        let mut part = segment.tag.to_ascii_lowercase();
        match segment.id.as_deref() {
            Some(id) if !id.is_empty() => {
                part.push('#');
                part.push_str(id);
                parts.push(part);
                // An id is unique enough; stop walking toward the root.
                break;
            }
            _ => {
                if segment.ordinal > 1 {
                    part.push_str(&format!(":nth-of-type({})", segment.ordinal));
                }
                parts.push(part);
            }
        }
    }
    parts.reverse();
    parts.join(" > ")
}

/// One level of a parsed structural locator.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentQuery {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub nth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathPredicate {
    Id(String),
    Position(usize),
}

/// The path-expression subset the reference document evaluates:
/// `//tag`, `//tag[@id='x']`, `//tag[n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub tag: String,
    pub predicate: Option<PathPredicate>,
}

/// A parsed locator, ready to run against a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Locator {
    Structural(Vec<SegmentQuery>),
    Path(PathExpr),
}

fn segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9-]*)?(?:#([A-Za-z0-9_-]+))?(?::nth-of-type\((\d+)\))?$")
            .expect("segment pattern is valid")
    })
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^//([A-Za-z][A-Za-z0-9-]*)(?:\[(?:@id='([^']*)'|(\d+))\])?$")
            .expect("path pattern is valid")
    })
}

impl Locator {
    /// Parse a locator string. Malformed strings are an error here; during
    /// resolution the caller treats that error as a miss.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EngineError::MalformedLocator("empty locator".to_string()));
        }

        if raw.starts_with(PATH_EXPRESSION_PREFIX) {
            let caps = path_re()
                .captures(raw)
                .ok_or_else(|| EngineError::MalformedLocator(raw.to_string()))?;
            let tag = caps[1].to_ascii_lowercase();
            let predicate = if let Some(id) = caps.get(2) {
                Some(PathPredicate::Id(id.as_str().to_string()))
            } else if let Some(pos) = caps.get(3) {
                let n: usize = pos
                    .as_str()
                    .parse()
                    .map_err(|_| EngineError::MalformedLocator(raw.to_string()))?;
                Some(PathPredicate::Position(n))
            } else {
                None
            };
            return Ok(Locator::Path(PathExpr { tag, predicate }));
        }

        let mut segments = Vec::new();
        for part in raw.split(" > ") {
            let part = part.trim();
            let caps = segment_re()
                .captures(part)
                .filter(|c| c.get(1).is_some() || c.get(2).is_some())
                .ok_or_else(|| EngineError::MalformedLocator(raw.to_string()))?;
            segments.push(SegmentQuery {
                tag: caps.get(1).map(|m| m.as_str().to_ascii_lowercase()),
                id: caps.get(2).map(|m| m.as_str().to_string()),
                nth: caps.get(3).and_then(|m| m.as_str().parse().ok()),
            });
        }
        Ok(Locator::Structural(segments))
    }
}

/// Try each candidate locator in order against the reference document. A
/// malformed locator is a miss, never an error; the first match wins.
pub fn resolve(doc: &Document, candidates: &[&str]) -> Option<NodeId> {
    for candidate in candidates {
        let locator = match Locator::parse(candidate) {
            Ok(l) => l,
            Err(_) => continue,
        };
        if let Some(node) = doc.query(&locator) {
            return Some(node);
        }
    }
    None
}
