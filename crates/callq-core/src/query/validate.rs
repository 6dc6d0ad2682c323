//! Module: query::validate
//! Responsibility: request-shape checks that run before any SQL is built.
//! Does not own: path resolution (see `query::path`) or per-node checks made
//! while compiling conditions.
//! Boundary: a failed check means no statement is produced.

use crate::{
    model::FieldRegistry,
    query::{optimize::filters::CallsFilter, path::split_path},
};
use thiserror::Error as ThisError;

///
/// ValidateError
///
/// Request errors caught before or during compilation. Never retryable
/// without changing the request.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ValidateError {
    #[error("project id must not be empty")]
    EmptyProjectId,

    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error("field '{field}' cannot be filtered on")]
    FieldNotFilterable { field: String },

    #[error("field '{field}' cannot be ordered by")]
    FieldNotOrderable { field: String },

    #[error("filter '{filter}' has {len} values; at most {max} are allowed")]
    TooManyValues {
        filter: &'static str,
        len: usize,
        max: usize,
    },

    #[error("query needs more than {max} object reference subqueries")]
    TooManyObjectRefCtes { max: usize },

    #[error("invalid expand column '{column}': expected <document field>.<path>")]
    InvalidExpandColumn { column: String },

    #[error("invalid sort field '{field}'")]
    InvalidSortField { field: String },
}

impl ValidateError {
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::EmptyProjectId => "empty_project_id",
            Self::UnknownField { .. } => "unknown_field",
            Self::FieldNotFilterable { .. } => "field_not_filterable",
            Self::FieldNotOrderable { .. } => "field_not_orderable",
            Self::TooManyValues { .. } => "too_many_values",
            Self::TooManyObjectRefCtes { .. } => "too_many_object_ref_ctes",
            Self::InvalidExpandColumn { .. } => "invalid_expand_column",
            Self::InvalidSortField { .. } => "invalid_sort_field",
        }
    }
}

pub(crate) fn validate_project(project_id: &str) -> Result<(), ValidateError> {
    if project_id.trim().is_empty() {
        return Err(ValidateError::EmptyProjectId);
    }

    Ok(())
}

/// Enforce `max` on the number of values of one list input.
pub(crate) const fn validate_len(
    filter: &'static str,
    len: usize,
    max: usize,
) -> Result<(), ValidateError> {
    if len > max {
        return Err(ValidateError::TooManyValues { filter, len, max });
    }

    Ok(())
}

/// Every list of the hardcoded filter stays within `max` values.
pub(crate) fn validate_filter(filter: &CallsFilter, max: usize) -> Result<(), ValidateError> {
    for (name, _, values) in filter.lists() {
        validate_len(name, values.len(), max)?;
    }

    Ok(())
}

/// Expand columns must point inside a JSON document field.
pub(crate) fn validate_expand_columns(
    columns: &[String],
    registry: &FieldRegistry,
) -> Result<(), ValidateError> {
    for column in columns {
        let segments = split_path(column);
        let rooted = segments.len() >= 2
            && segments.iter().all(|segment| !segment.is_empty())
            && registry
                .get(&segments[0])
                .is_some_and(|field| field.is_heavy());

        if !rooted {
            return Err(ValidateError::InvalidExpandColumn {
                column: column.clone(),
            });
        }
    }

    Ok(())
}
