//! Module: query::builder
//! Responsibility: the single-use calls query builder and its output.
//! Does not own: statement construction (see `query::compile`).
//! Boundary: `compile*` consumes the builder, so a compiled plan can never
//! be mutated again.

use crate::{
    error::CompileError,
    model::TableKind,
    param::BoundParams,
    query::{
        compile::{Shape, compile_plan},
        context::QueryContext,
        expr::Expr,
        optimize::filters::CallsFilter,
        order::{OrderBy, OrderDirection},
    },
};
use serde::Serialize;

///
/// CompiledQuery
///
/// One statement plus its bound parameters. An empty `sql` is the no-op
/// sentinel returned by batch mutations with nothing to do; callers must
/// check `is_noop` before executing.
///

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: BoundParams,
}

impl CompiledQuery {
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.sql.is_empty()
    }
}

///
/// Toggles
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::struct_excessive_bools)]
pub(crate) struct Toggles {
    pub(crate) include_costs: bool,
    pub(crate) include_storage_size: bool,
    pub(crate) include_total_storage_size: bool,
    pub(crate) include_running: bool,
    pub(crate) include_deleted: bool,
}

///
/// CallsQuery
///
/// Builder state for one calls query. Every setter may be called any number
/// of times in any order; list setters append.
///

#[derive(Clone, Debug, Default)]
pub struct CallsQuery {
    pub(crate) project_id: String,
    pub(crate) fields: Vec<String>,
    pub(crate) conditions: Vec<Expr>,
    pub(crate) order: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) filter: CallsFilter,
    pub(crate) expand_columns: Vec<String>,
    pub(crate) table: TableKind,
    pub(crate) toggles: Toggles,
}

impl CallsQuery {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn table(mut self, table: TableKind) -> Self {
        self.table = table;
        self
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Add one output field. No fields at all selects every physical column.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    #[must_use]
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare paths whose values are object references.
    #[must_use]
    pub fn expand_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    // ------------------------------------------------------------------
    // Filtering
    // ------------------------------------------------------------------

    /// AND another condition into the query.
    #[must_use]
    pub fn condition(mut self, expr: Expr) -> Self {
        self.conditions.push(expr);
        self
    }

    /// Replace the hardcoded light filter.
    #[must_use]
    pub fn filter(mut self, filter: CallsFilter) -> Self {
        self.filter = filter;
        self
    }

    // ------------------------------------------------------------------
    // Ordering and pagination
    // ------------------------------------------------------------------

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order.push(OrderBy::new(field, direction));
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

    // ------------------------------------------------------------------
    // Feature toggles
    // ------------------------------------------------------------------

    /// Splice per-model LLM costs into `summary`.
    #[must_use]
    pub const fn include_costs(mut self, on: bool) -> Self {
        self.toggles.include_costs = on;
        self
    }

    #[must_use]
    pub const fn include_storage_size(mut self, on: bool) -> Self {
        self.toggles.include_storage_size = on;
        self
    }

    #[must_use]
    pub const fn include_total_storage_size(mut self, on: bool) -> Self {
        self.toggles.include_total_storage_size = on;
        self
    }

    /// Also return calls that have started but not finished. No effect on
    /// the merged table, which already holds them.
    #[must_use]
    pub const fn include_running(mut self, on: bool) -> Self {
        self.toggles.include_running = on;
        self
    }

    #[must_use]
    pub const fn include_deleted(mut self, on: bool) -> Self {
        self.toggles.include_deleted = on;
        self
    }

    // ------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------

    /// Compile against the calls schema with default limits.
    pub fn compile(self) -> Result<CompiledQuery, CompileError> {
        self.compile_with(&QueryContext::standard())
    }

    pub fn compile_with(self, ctx: &QueryContext<'_>) -> Result<CompiledQuery, CompileError> {
        compile_plan(&self, ctx, Shape::Rows)
    }

    /// `SELECT count() AS count` over the calls this query would match,
    /// ignoring selection, order and pagination.
    pub fn compile_count(self) -> Result<CompiledQuery, CompileError> {
        self.compile_count_with(&QueryContext::standard())
    }

    pub fn compile_count_with(self, ctx: &QueryContext<'_>) -> Result<CompiledQuery, CompileError> {
        compile_plan(&self, ctx, Shape::Count)
    }
}
