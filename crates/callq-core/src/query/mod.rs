//! Module: query
//! Responsibility: the calls query surface, from builder to statement.
//! Does not own: the field registry or table vocabulary (see `model`).
//! Boundary: public entry points are `CallsQuery`, `CallsQueryRequest` and
//! `soft_delete_calls`.

pub(crate) mod assemble;
pub(crate) mod builder;
pub(crate) mod compile;
pub(crate) mod condition;
pub(crate) mod context;
pub mod expr;
pub(crate) mod json;
pub mod mutation;
pub(crate) mod optimize;
pub(crate) mod order;
pub mod path;
pub(crate) mod request;
pub(crate) mod select;
pub(crate) mod state;
pub mod validate;

#[cfg(test)]
mod tests;

// re-exports
pub use builder::{CallsQuery, CompiledQuery};
pub use context::QueryContext;
pub use mutation::soft_delete_calls;
pub use optimize::{
    PassSet,
    filters::{CallsFilter, OP_NAME_WILDCARD},
};
pub use order::{OrderBy, OrderDirection};
pub use request::{CallsQueryRequest, QueryExpr};
