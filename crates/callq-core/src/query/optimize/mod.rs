//! Module: query::optimize
//! Responsibility: the ordered rewrite passes applied while compiling.
//! Does not own: base condition semantics (see `query::condition`).
//! Boundary: every pass either leaves results unchanged or adds a superset
//! pre-filter next to the exact predicate.
//!
//! Pass order: predicate pushdown, LIKE pre-filter, datetime sort-key
//! pre-filter, object references, feedback join, cost chain, then
//! storage/queue/ref-array filters.

pub(crate) mod cost;
pub(crate) mod datetime;
pub(crate) mod feedback;
pub(crate) mod filters;
pub(crate) mod like_filter;
pub(crate) mod object_ref;
pub(crate) mod pushdown;
pub(crate) mod storage;

use crate::{
    model::TableVariant,
    query::{
        assemble::{and_all, or_all},
        expr::Expr,
        state::{CompileState, Scope},
    },
};

///
/// PassSet
///
/// Which passes changed the statement during one compile.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::struct_excessive_bools)]
pub struct PassSet {
    pub pushdown: bool,
    pub like_prefilter: bool,
    pub datetime_prefilter: bool,
    pub object_refs: bool,
    pub feedback_join: bool,
    pub costs: bool,
    pub storage_size: bool,
    pub running: bool,
}

///
/// Superset pre-filter walker.
///
/// Walks a condition tree and returns a predicate that is true for every
/// row the condition can be true for. `leaf` handles comparison nodes and
/// receives the current negation parity. Negation is pushed through `And`
/// and `Or` by De Morgan, so a conjunction keeps whichever children produced
/// a pre-filter while a disjunction needs every child to produce one.
///

pub(crate) fn superset_predicate<F>(expr: &Expr, negated: bool, leaf: &mut F) -> Option<String>
where
    F: FnMut(&Expr, bool) -> Option<String>,
{
    match (expr, negated) {
        (Expr::Not(inner), _) => superset_predicate(inner, !negated, leaf),
        (Expr::And(parts), false) | (Expr::Or(parts), true) => and_all(
            parts
                .iter()
                .filter_map(|part| superset_predicate(part, negated, leaf))
                .collect(),
        ),
        (Expr::And(parts) | Expr::Or(parts), _) => {
            if parts.is_empty() {
                return None;
            }
            let mut out = Vec::with_capacity(parts.len());
            for part in parts {
                out.push(superset_predicate(part, negated, leaf)?);
            }
            or_all(out)
        }
        _ => leaf(expr, negated),
    }
}

///
/// Prefilters
///
/// Pre-aggregation pre-filters for a list of conditions.
///

pub(crate) fn prefilters(
    conditions: &[Expr],
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Vec<String> {
    let mut out = Vec::new();
    for condition in conditions {
        if scope.config.like_prefilter
            && let Some(sql) = like_filter::like_prefilter(condition, variant, scope, state)
        {
            state.passes.like_prefilter = true;
            out.push(sql);
        }
        if scope.config.datetime_prefilter
            && let Some(sql) = datetime::sort_key_prefilter(condition, variant, scope, state)
        {
            state.passes.datetime_prefilter = true;
            out.push(sql);
        }
    }

    out
}
