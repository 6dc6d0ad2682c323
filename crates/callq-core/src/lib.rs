//! Call-query compiler: turns a declarative calls/traces query into one
//! parameterized ClickHouse statement plus its bound parameters, and a
//! reduced SQLite emitter for the threads read path.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod error;
pub mod model;
pub mod obs;
pub mod param;
pub mod query;
pub mod threads;
pub mod value;

///
/// CONSTANTS
///

/// Default maximum number of values accepted by one hardcoded array filter.
pub const DEFAULT_MAX_ARRAY_FILTER_LEN: usize = 1000;

/// Default maximum number of object-reference CTEs generated for one query.
pub const DEFAULT_MAX_OBJECT_REF_CTES: usize = 10;

/// Default sort-key safety margin, in seconds, for datetime range pruning.
pub const DEFAULT_DATETIME_MARGIN_SECS: i64 = 5 * 60;

///
/// Prelude
///
/// Query vocabulary only: builders, conditions, values and table selectors.
///

pub mod prelude {
    pub use crate::{
        config::CompileConfig,
        error::CompileError,
        model::table::TableKind,
        query::{
            CallsFilter, CallsQuery, CallsQueryRequest, CompiledQuery, OrderDirection, QueryContext,
            expr::{CastTo, Expr, FieldRef, field},
        },
        value::Value,
    };
}
