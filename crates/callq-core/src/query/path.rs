//! Module: query::path
//! Responsibility: resolve dotted `GetField` paths to a concrete access kind.
//! Does not own: SQL rendering of the resolved access.
//! Boundary: every path resolves to exactly one `ResolvedField` or an error.

use crate::model::{FieldDescriptor, FieldRegistry, StorageKind};
use std::fmt::Write as _;
use thiserror::Error as ThisError;

const FEEDBACK_PREFIX: &str = "feedback.[";
const FEEDBACK_PAYLOAD: &str = "payload";

///
/// ResolveError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ResolveError {
    #[error("unknown field path '{path}'")]
    UnknownField { path: String },

    #[error("field '{field}' requires a nested path")]
    MissingJsonPath { field: String },

    #[error("malformed feedback path '{path}': expected feedback.[<type>].payload.<path>")]
    InvalidFeedbackPath { path: String },

    #[error("unsupported operand in {op}: {detail}")]
    UnsupportedOperand { op: &'static str, detail: String },

    #[error("literal of kind {found} is not valid for '{field}' (expected {expected})")]
    InvalidLiteral {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ResolveError {
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::UnknownField { .. } => "unknown_field",
            Self::MissingJsonPath { .. } => "missing_json_path",
            Self::InvalidFeedbackPath { .. } => "invalid_feedback_path",
            Self::UnsupportedOperand { .. } => "unsupported_operand",
            Self::InvalidLiteral { .. } => "invalid_literal",
        }
    }

    pub(crate) fn unsupported(op: &'static str, detail: impl Into<String>) -> Self {
        Self::UnsupportedOperand {
            op,
            detail: detail.into(),
        }
    }
}

///
/// JsonPath
///
/// Key sequence inside a JSON document. Values read through a path are
/// text; comparisons coerce numeric-if-parseable, else string.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct JsonPath {
    keys: Vec<String>,
}

impl JsonPath {
    #[must_use]
    pub const fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// SQL/JSON path text, e.g. `$."param"."val"`.
    #[must_use]
    pub fn to_json_path(&self) -> String {
        let mut out = String::from("$");
        for key in &self.keys {
            let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
            let _ = write!(out, ".\"{escaped}\"");
        }
        out
    }
}

///
/// FeedbackPath
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeedbackPath {
    pub feedback_type: String,
    pub path: JsonPath,
}

///
/// ObjectRefPath
///
/// Path that crosses one or more expand columns. `hops[0]` is read from the
/// call document; every later hop is read from the object reached by the
/// previous one; `leaf` is read from the final object.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectRefPath {
    pub root: &'static FieldDescriptor,
    pub hops: Vec<JsonPath>,
    pub leaf: JsonPath,
}

///
/// ResolvedField
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResolvedField {
    /// Native column or synthetic field.
    Column(&'static FieldDescriptor),
    Json {
        field: &'static FieldDescriptor,
        path: JsonPath,
    },
    Feedback(FeedbackPath),
    ObjectRef(ObjectRefPath),
}

impl ResolvedField {
    /// Light fields can be evaluated from native columns alone.
    #[must_use]
    pub const fn is_light(&self) -> bool {
        matches!(self, Self::Column(_))
    }
}

///
/// ExpandColumns
///
/// Declared reference-holding paths, stored as segment lists.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExpandColumns {
    columns: Vec<Vec<String>>,
}

impl ExpandColumns {
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut columns: Vec<Vec<String>> = columns
            .into_iter()
            .map(|column| split_path(column.as_ref()))
            .collect();
        columns.sort();
        columns.dedup();

        Self { columns }
    }

    pub fn iter(&self) -> impl Iterator<Item = &[String]> {
        self.columns.iter().map(Vec::as_slice)
    }

    /// Expand columns that are strict prefixes of `segments`, shortest first.
    fn prefixes_of(&self, segments: &[String]) -> Vec<&[String]> {
        let mut hits: Vec<&[String]> = self
            .columns
            .iter()
            .filter(|column| column.len() < segments.len() && segments.starts_with(column))
            .map(Vec::as_slice)
            .collect();
        hits.sort_by_key(|column| column.len());
        hits
    }
}

/// Split a dotted path; `\.` keeps a literal dot inside one segment.
#[must_use]
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('.') => current.push('.'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);

    segments
}

/// Resolve `path` against the registry and declared expand columns.
pub fn resolve(
    path: &str,
    registry: &FieldRegistry,
    expand: &ExpandColumns,
) -> Result<ResolvedField, ResolveError> {
    if path.starts_with(FEEDBACK_PREFIX) {
        return resolve_feedback(path).map(ResolvedField::Feedback);
    }

    if let Some(field) = registry.get(path) {
        return match field.storage {
            StorageKind::JsonBlob => Err(ResolveError::MissingJsonPath {
                field: field.name.to_string(),
            }),
            _ => Ok(ResolvedField::Column(field)),
        };
    }

    let segments = split_path(path);
    if segments.iter().any(String::is_empty) {
        return Err(unknown(path));
    }
    let Some(root) = registry.get(&segments[0]) else {
        return Err(unknown(path));
    };
    if !root.is_heavy() {
        return Err(unknown(path));
    }

    let hops = expand.prefixes_of(&segments);
    if hops.is_empty() {
        return Ok(ResolvedField::Json {
            field: root,
            path: JsonPath::new(segments[1..].to_vec()),
        });
    }

    let mut relative = Vec::with_capacity(hops.len());
    let mut consumed = 1;
    for hop in &hops {
        relative.push(JsonPath::new(hop[consumed..].to_vec()));
        consumed = hop.len();
    }

    Ok(ResolvedField::ObjectRef(ObjectRefPath {
        root,
        hops: relative,
        leaf: JsonPath::new(segments[consumed..].to_vec()),
    }))
}

fn resolve_feedback(path: &str) -> Result<FeedbackPath, ResolveError> {
    let invalid = || ResolveError::InvalidFeedbackPath {
        path: path.to_string(),
    };

    let rest = &path[FEEDBACK_PREFIX.len()..];
    let close = rest.find("].").ok_or_else(invalid)?;
    let feedback_type = &rest[..close];
    if feedback_type.is_empty() {
        return Err(invalid());
    }

    let segments = split_path(&rest[close + 2..]);
    if segments.first().map(String::as_str) != Some(FEEDBACK_PAYLOAD)
        || segments.len() < 2
        || segments.iter().any(String::is_empty)
    {
        return Err(invalid());
    }

    Ok(FeedbackPath {
        feedback_type: feedback_type.to_string(),
        path: JsonPath::new(segments[1..].to_vec()),
    })
}

fn unknown(path: &str) -> ResolveError {
    ResolveError::UnknownField {
        path: path.to_string(),
    }
}
