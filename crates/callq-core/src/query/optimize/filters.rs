//! Module: query::optimize::filters
//! Responsibility: the hardcoded light filter (id lists, refs, roots, queue).
//! Does not own: length limits (see `query::validate`).
//! Boundary: emits row-level fragments plus exact post-aggregation checks.
//!
//! On the merged table a row-level membership test would drop the parts of
//! a call that do not carry the column, so row-level fragments tolerate the
//! unmerged parts and the exact test runs again after GROUP BY.

use crate::{
    model::{FieldDescriptor, TableVariant, field::ColumnType},
    param::{ParamBuilder, ParamType},
    query::{
        assemble::or_all,
        path::ResolveError,
        state::{CompileState, Scope},
    },
    value::Value,
};
use serde::{Deserialize, Serialize};

/// Suffix marking an op-name entry as a prefix match.
pub const OP_NAME_WILDCARD: &str = ":*";

///
/// CallsFilter
///
/// Enumerated light filters. Absent and empty lists both mean "no filter".
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallsFilter {
    pub op_names: Option<Vec<String>>,
    pub input_refs: Option<Vec<String>>,
    pub output_refs: Option<Vec<String>>,
    pub parent_ids: Option<Vec<String>>,
    pub trace_ids: Option<Vec<String>>,
    pub call_ids: Option<Vec<String>>,
    pub thread_ids: Option<Vec<String>>,
    pub turn_ids: Option<Vec<String>>,
    pub wb_user_ids: Option<Vec<String>>,
    pub wb_run_ids: Option<Vec<String>>,
    pub trace_roots_only: Option<bool>,
    pub queue_id: Option<String>,
}

impl CallsFilter {
    /// `(filter name, backing field, values)` for every plain list filter.
    pub(crate) fn lists(&self) -> [(&'static str, &'static str, &[String]); 10] {
        [
            ("op_names", "op_name", list(&self.op_names)),
            ("input_refs", "input_refs", list(&self.input_refs)),
            ("output_refs", "output_refs", list(&self.output_refs)),
            ("parent_ids", "parent_id", list(&self.parent_ids)),
            ("trace_ids", "trace_id", list(&self.trace_ids)),
            ("call_ids", "id", list(&self.call_ids)),
            ("thread_ids", "thread_id", list(&self.thread_ids)),
            ("turn_ids", "turn_id", list(&self.turn_ids)),
            ("wb_user_ids", "wb_user_id", list(&self.wb_user_ids)),
            ("wb_run_ids", "wb_run_id", list(&self.wb_run_ids)),
        ]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists().iter().all(|(_, _, values)| values.is_empty())
            && !self.trace_roots_only.unwrap_or(false)
            && self.queue_id.is_none()
    }
}

fn list(values: &Option<Vec<String>>) -> &[String] {
    values.as_deref().unwrap_or_default()
}

///
/// FilterFragments
///

#[derive(Debug, Default)]
pub(crate) struct FilterFragments {
    /// Row-level, pre-aggregation.
    pub(crate) pre: Vec<String>,
    /// Exact, post-aggregation; empty for flat tables.
    pub(crate) post: Vec<String>,
}

pub(crate) fn compile_filter(
    filter: &CallsFilter,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<FilterFragments, ResolveError> {
    let mut out = FilterFragments::default();
    let params = &mut state.params;

    for (name, column, values) in filter.lists() {
        if values.is_empty() {
            continue;
        }
        let field = registered(scope, column)?;
        let predicate = |sql: &str, params: &mut ParamBuilder| {
            if name == "op_names" {
                op_name_predicate(sql, values, params)
            } else {
                membership(sql, field, values, params)
            }
        };
        place(&mut out, variant, field, params, predicate);
    }

    if filter.trace_roots_only.unwrap_or(false) {
        let parent = registered(scope, "parent_id")?;
        let is_root = variant.null_check(parent, false, params);
        if variant.is_aggregated() {
            out.post.push(is_root);
        } else {
            out.pre.push(is_root);
        }
    }

    if let Some(queue_id) = &filter.queue_id {
        let queue = params.add(queue_id.as_str(), ParamType::String);
        out.pre.push(format!(
            "{} IN (SELECT annotation_queue_items.call_id FROM annotation_queue_items \
             WHERE annotation_queue_items.project_id = {} \
             AND annotation_queue_items.queue_id = {queue} \
             AND annotation_queue_items.deleted_at IS NULL)",
            variant.column_ref("id"),
            state.project,
        ));
    }

    Ok(out)
}

fn registered(scope: &Scope<'_>, name: &str) -> Result<&'static FieldDescriptor, ResolveError> {
    scope.fields.get(name).ok_or_else(|| ResolveError::UnknownField {
        path: name.to_string(),
    })
}

// Row-level fragment with unmerged-part tolerance, plus the exact post check.
fn place<F>(
    out: &mut FilterFragments,
    variant: &dyn TableVariant,
    field: &FieldDescriptor,
    params: &mut ParamBuilder,
    predicate: F,
) where
    F: Fn(&str, &mut ParamBuilder) -> String,
{
    let row = predicate(&variant.field_column(field), params);

    match variant.unmerged_tolerance(field) {
        Some(tolerance) => {
            out.pre.push(format!("({row} OR {tolerance})"));
            out.post.push(predicate(&variant.field_expr(field), params));
        }
        None => out.pre.push(row),
    }
}

fn membership(sql: &str, field: &FieldDescriptor, values: &[String], params: &mut ParamBuilder) -> String {
    let list = params.add(
        Value::from(values.to_vec()),
        ParamType::array_of(ParamType::String),
    );
    if field.column_type == ColumnType::TextArray {
        format!("hasAny({sql}, {list})")
    } else {
        format!("{sql} IN {list}")
    }
}

// Exact names go through one IN list; `name:*` entries match by prefix.
fn op_name_predicate(sql: &str, values: &[String], params: &mut ParamBuilder) -> String {
    let (prefixes, exact): (Vec<&String>, Vec<&String>) = values
        .iter()
        .partition(|name| name.ends_with(OP_NAME_WILDCARD));

    let mut parts = Vec::new();
    if !exact.is_empty() {
        let list = params.add(
            Value::List(exact.into_iter().map(|name| Value::from(name.as_str())).collect()),
            ParamType::array_of(ParamType::String),
        );
        parts.push(format!("{sql} IN {list}"));
    }
    for name in prefixes {
        let prefix = params.add(name.strip_suffix('*').unwrap_or(name), ParamType::String);
        parts.push(format!("startsWith({sql}, {prefix})"));
    }

    or_all(parts).unwrap_or_else(|| "0".to_string())
}
