//! Module: threads
//! Responsibility: the threads read path over the embedded SQLite store.
//! Does not own: calls compilation; this dialect has no CTE or JOIN passes.
//! Boundary: placeholders are `:name`, list filters bind one per element.

mod sqlite;

use crate::{
    config::CompileConfig,
    error::CompileError,
    query::{CompiledQuery, OrderBy, OrderDirection},
};
use time::OffsetDateTime;

pub use sqlite::THREAD_SORT_FIELDS;

///
/// ThreadsFilter
///
/// Turn-level bounds; a thread is reported from the turns that pass.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadsFilter {
    /// Inclusive lower bound on turn start time.
    pub after_datetime: Option<OffsetDateTime>,
    /// Exclusive upper bound on turn start time.
    pub before_datetime: Option<OffsetDateTime>,
    pub thread_ids: Option<Vec<String>>,
}

///
/// ThreadsQuery
///
/// One row per thread: turn count, first and last activity, and the ids of
/// the first and last turn. Sorted by `last_updated DESC` unless told
/// otherwise.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadsQuery {
    pub project_id: String,
    pub filter: ThreadsFilter,
    pub sort_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ThreadsQuery {
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: ThreadsFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.sort_by.push(OrderBy::new(field, direction));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn compile(&self) -> Result<CompiledQuery, CompileError> {
        self.compile_with(&CompileConfig::default())
    }

    pub fn compile_with(&self, config: &CompileConfig) -> Result<CompiledQuery, CompileError> {
        sqlite::compile_threads(self, config)
    }
}
