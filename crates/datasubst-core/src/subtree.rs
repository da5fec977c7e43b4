//! Dotted-path navigation into a decoded [`Value`] tree.

use std::fmt;
use std::str::FromStr;

use crate::error::{DatasubstError, Result};
use crate::value::Value;

/// A non-empty sequence of mapping keys, parsed from a dotted string such as `.key2.first`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreePath {
    segments: Vec<String>,
}

impl SubtreePath {
    /// Parse a dotted path. A single leading `.` is ignored.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.strip_prefix('.').unwrap_or(path);
        if trimmed.is_empty() {
            return Err(DatasubstError::Usage(format!(
                "subtree path '{path}' is empty"
            )));
        }

        let segments: Vec<String> = trimmed.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(DatasubstError::Usage(format!(
                "subtree path '{path}' contains an empty segment"
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl FromStr for SubtreePath {
    type Err = DatasubstError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SubtreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

/// Walk `path` from `root`, requiring a mapping at every step.
///
/// Fails on the first segment that is absent or whose parent is not a mapping.
pub fn navigate<'a>(root: &'a Value, path: &SubtreePath) -> Result<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match current {
            Value::Mapping(map) => map.get(segment).ok_or_else(|| DatasubstError::Subtree {
                path: path.to_string(),
                segment: segment.clone(),
                reason: "key not found".into(),
            })?,
            other => {
                return Err(DatasubstError::Subtree {
                    path: path.to_string(),
                    segment: segment.clone(),
                    reason: format!("parent is a {}, not a mapping", other.kind_name()),
                })
            }
        };
    }
    tracing::debug!(%path, kind = current.kind_name(), "narrowed data to subtree");
    Ok(current)
}
