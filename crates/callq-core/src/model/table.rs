//! Module: model::table
//! Responsibility: the per-table-variant SQL vocabulary.
//! Does not own: deciding which passes run (see `query::optimize`).
//! Boundary: the compiler asks the variant; it never branches on the variant itself.

use crate::{
    model::field::{AggregateKind, ColumnType, FieldDescriptor, FieldRegistry},
    param::ParamBuilder,
};
use serde::Deserialize;

///
/// TableKind
///
/// Physical representation a query is compiled against.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Multi-row-per-call table reconciled with GROUP BY.
    #[default]
    Merged,
    /// One fully materialized, sentinel-bearing row per finished call.
    Complete,
    /// Complete rows plus in-flight starts, unioned by id.
    StartsUnion,
}

impl TableKind {
    #[must_use]
    pub fn variant(self) -> &'static dyn TableVariant {
        match self {
            Self::Merged => &MergedCalls,
            Self::Complete => &FlatCalls::COMPLETE,
            Self::StartsUnion => &RunningCalls,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Complete => "complete",
            Self::StartsUnion => "starts_union",
        }
    }
}

///
/// Placement
///
/// Clause that receives compiled call-level conditions.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placement {
    Where,
    Having,
}

///
/// TableVariant
///
/// The only seam through which compilation differs between table variants.
///

pub trait TableVariant: Sync {
    fn kind(&self) -> TableKind;

    fn table_name(&self) -> &'static str;

    /// Qualified reference to a physical column.
    fn column_ref(&self, column: &str) -> String {
        format!("{}.{column}", self.table_name())
    }

    /// Reconcile a field expression across the physical rows of one call.
    fn wrap_in_aggregate(&self, field: &FieldDescriptor, expr: String) -> String;

    /// Reconcile an arbitrary (joined) expression; identity for flat tables.
    fn aggregate_any(&self, expr: String) -> String;

    /// Null-equivalence test for `field`; `negate` tests presence.
    fn null_check(&self, field: &FieldDescriptor, negate: bool, params: &mut ParamBuilder)
    -> String;

    fn group_by_clause(&self) -> Option<String>;

    fn placement(&self) -> Placement;

    /// Extra disjunct letting pre-aggregation filters keep the physical rows
    /// of a call that do not carry `field`.
    fn unmerged_tolerance(&self, field: &FieldDescriptor) -> Option<String>;

    /// Unreconciled reference to the column backing `field`.
    fn field_column(&self, field: &FieldDescriptor) -> String {
        self.column_ref(field.column)
    }

    /// Column reference already reconciled for use in SELECT/HAVING/ORDER BY.
    fn field_expr(&self, field: &FieldDescriptor) -> String {
        self.wrap_in_aggregate(field, self.field_column(field))
    }

    fn is_aggregated(&self) -> bool {
        self.group_by_clause().is_some()
    }
}

/// Row-liveness predicates: not soft-deleted (unless requested) and started.
pub fn live_call_filters(
    variant: &dyn TableVariant,
    registry: &FieldRegistry,
    include_deleted: bool,
    params: &mut ParamBuilder,
) -> Vec<String> {
    let mut out = Vec::new();
    if !include_deleted && let Some(deleted_at) = registry.get("deleted_at") {
        out.push(variant.null_check(deleted_at, false, params));
    }
    if let Some(started_at) = registry.get("started_at") {
        out.push(variant.null_check(started_at, true, params));
    }

    out
}

// ----------------------------------------------------------------------
// Merged
// ----------------------------------------------------------------------

///
/// MergedCalls
///

#[derive(Debug)]
pub struct MergedCalls;

impl TableVariant for MergedCalls {
    fn kind(&self) -> TableKind {
        TableKind::Merged
    }

    fn table_name(&self) -> &'static str {
        "calls_merged"
    }

    fn wrap_in_aggregate(&self, field: &FieldDescriptor, expr: String) -> String {
        match field.aggregate {
            AggregateKind::None => expr,
            AggregateKind::Any => format!("any({expr})"),
            AggregateKind::LatestVersion => format!("argMaxMerge({expr})"),
            AggregateKind::ArrayConcat => format!("array_concat_agg({expr})"),
        }
    }

    fn aggregate_any(&self, expr: String) -> String {
        format!("any({expr})")
    }

    fn null_check(
        &self,
        field: &FieldDescriptor,
        negate: bool,
        _params: &mut ParamBuilder,
    ) -> String {
        let expr = self.field_expr(field);
        if negate {
            format!("{expr} IS NOT NULL")
        } else {
            format!("{expr} IS NULL")
        }
    }

    fn group_by_clause(&self) -> Option<String> {
        Some(format!(
            "({}, {})",
            self.column_ref("project_id"),
            self.column_ref("id")
        ))
    }

    fn placement(&self) -> Placement {
        Placement::Having
    }

    fn unmerged_tolerance(&self, field: &FieldDescriptor) -> Option<String> {
        if !field.requires_aggregation() {
            return None;
        }
        let column = self.field_column(field);
        Some(match field.aggregate {
            AggregateKind::ArrayConcat => format!("length({column}) = 0"),
            _ => format!("{column} IS NULL"),
        })
    }
}

// ----------------------------------------------------------------------
// Flat (complete / starts)
// ----------------------------------------------------------------------

///
/// FlatCalls
///
/// One row per call; absent values are sentinels.
///

#[derive(Debug)]
pub struct FlatCalls {
    table: &'static str,
    /// Start rows carry no end-part columns; they read as sentinels.
    fill_end_part: bool,
}

impl FlatCalls {
    pub const COMPLETE: Self = Self {
        table: "calls_complete",
        fill_end_part: false,
    };
    pub const STARTS: Self = Self {
        table: "call_starts",
        fill_end_part: true,
    };
}

// Constant standing in for an end-part column on a start row.
const fn end_part_fill(field: &FieldDescriptor) -> &'static str {
    match field.column_type {
        ColumnType::DateTime => "toDateTime64(0, 6)",
        ColumnType::Int => "-1",
        ColumnType::TextArray => "CAST([], 'Array(String)')",
        ColumnType::Text | ColumnType::Json => "''",
    }
}

impl TableVariant for FlatCalls {
    fn kind(&self) -> TableKind {
        TableKind::Complete
    }

    fn table_name(&self) -> &'static str {
        self.table
    }

    fn field_column(&self, field: &FieldDescriptor) -> String {
        if self.fill_end_part && !field.on_start_part {
            end_part_fill(field).to_string()
        } else {
            self.column_ref(field.column)
        }
    }

    fn wrap_in_aggregate(&self, _field: &FieldDescriptor, expr: String) -> String {
        expr
    }

    fn aggregate_any(&self, expr: String) -> String {
        expr
    }

    fn null_check(&self, field: &FieldDescriptor, negate: bool, params: &mut ParamBuilder) -> String {
        sentinel_check(&self.field_column(field), field, negate, params)
    }

    fn group_by_clause(&self) -> Option<String> {
        None
    }

    fn placement(&self) -> Placement {
        Placement::Where
    }

    fn unmerged_tolerance(&self, _field: &FieldDescriptor) -> Option<String> {
        None
    }
}

// ----------------------------------------------------------------------
// Starts union
// ----------------------------------------------------------------------

///
/// RunningCalls
///
/// Flat view over `calls_running`, the derived union of complete rows and
/// in-flight starts. Row sources are compiled with `FlatCalls`.
///

#[derive(Debug)]
pub struct RunningCalls;

impl RunningCalls {
    /// Row sources in union order.
    #[must_use]
    pub const fn sources() -> [&'static FlatCalls; 2] {
        [&FlatCalls::COMPLETE, &FlatCalls::STARTS]
    }
}

impl TableVariant for RunningCalls {
    fn kind(&self) -> TableKind {
        TableKind::StartsUnion
    }

    fn table_name(&self) -> &'static str {
        "calls_running"
    }

    fn wrap_in_aggregate(&self, _field: &FieldDescriptor, expr: String) -> String {
        expr
    }

    fn aggregate_any(&self, expr: String) -> String {
        expr
    }

    fn null_check(&self, field: &FieldDescriptor, negate: bool, params: &mut ParamBuilder) -> String {
        sentinel_check(&self.column_ref(field.column), field, negate, params)
    }

    fn group_by_clause(&self) -> Option<String> {
        None
    }

    fn placement(&self) -> Placement {
        Placement::Where
    }

    fn unmerged_tolerance(&self, _field: &FieldDescriptor) -> Option<String> {
        None
    }
}

// Sentinels are bound with `add_unique` so each injection keeps its own name.
fn sentinel_check(
    column: &str,
    field: &FieldDescriptor,
    negate: bool,
    params: &mut ParamBuilder,
) -> String {
    match field.sentinel.sentinel() {
        Some(sentinel) => {
            let param = params.add_unique(sentinel, field.sentinel.param_type());
            let op = if negate { "!=" } else { "=" };
            format!("{column} {op} {param}")
        }
        None if negate => format!("{column} IS NOT NULL"),
        None => format!("{column} IS NULL"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn field(name: &str) -> &'static FieldDescriptor {
        FieldRegistry::calls().get(name).expect("registered field")
    }

    #[test]
    fn merged_wraps_by_aggregate_kind() {
        let merged = TableKind::Merged.variant();

        assert_eq!(merged.field_expr(field("id")), "calls_merged.id");
        assert_eq!(merged.field_expr(field("op_name")), "any(calls_merged.op_name)");
        assert_eq!(
            merged.field_expr(field("display_name")),
            "argMaxMerge(calls_merged.display_name)"
        );
        assert_eq!(
            merged.field_expr(field("input_refs")),
            "array_concat_agg(calls_merged.input_refs)"
        );
        assert_eq!(
            merged.group_by_clause().as_deref(),
            Some("(calls_merged.project_id, calls_merged.id)")
        );
    }

    #[test]
    fn flat_never_aggregates() {
        for kind in [TableKind::Complete, TableKind::StartsUnion] {
            let variant = kind.variant();
            assert_eq!(variant.group_by_clause(), None);
            assert!(!variant.is_aggregated());
            assert_eq!(variant.placement(), Placement::Where);
            assert!(!variant.field_expr(field("started_at")).contains("any("));
        }
    }

    #[test]
    fn merged_null_check_uses_null() {
        let mut params = ParamBuilder::new("pb");
        let sql = TableKind::Merged
            .variant()
            .null_check(field("ended_at"), false, &mut params);

        assert_eq!(sql, "any(calls_merged.ended_at) IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn flat_null_checks_bind_independent_sentinels() {
        let mut params = ParamBuilder::new("pb");
        let complete = TableKind::Complete.variant();
        let ended = complete.null_check(field("ended_at"), false, &mut params);
        let deleted = complete.null_check(field("deleted_at"), false, &mut params);

        assert_eq!(ended, "calls_complete.ended_at = {pb_0:DateTime64(6)}");
        assert_eq!(deleted, "calls_complete.deleted_at = {pb_1:DateTime64(6)}");

        let params = params.finish();
        assert_eq!(params.get("pb_0"), params.get("pb_1"));
        assert_eq!(
            params.get("pb_0"),
            Some(&Value::Text("1970-01-01 00:00:00.000000".to_string()))
        );
    }

    #[test]
    fn start_rows_read_end_part_columns_as_sentinels() {
        let starts = &FlatCalls::STARTS;
        let mut params = ParamBuilder::new("pb");

        assert_eq!(starts.field_column(field("op_name")), "call_starts.op_name");
        assert_eq!(starts.field_column(field("ended_at")), "toDateTime64(0, 6)");
        assert_eq!(starts.field_column(field("output_refs")), "CAST([], 'Array(String)')");
        assert_eq!(
            starts.null_check(field("exception"), false, &mut params),
            "'' = {pb_0:String}"
        );
    }

    #[test]
    fn live_filters_skip_deleted_check_when_requested() {
        let mut params = ParamBuilder::new("pb");
        let registry = FieldRegistry::calls();
        let filters = live_call_filters(TableKind::Merged.variant(), registry, true, &mut params);

        assert_eq!(filters, vec!["any(calls_merged.started_at) IS NOT NULL".to_string()]);
    }

    #[test]
    fn tolerance_only_for_aggregated_parts() {
        let merged = TableKind::Merged.variant();

        assert_eq!(merged.unmerged_tolerance(field("id")), None);
        assert_eq!(
            merged.unmerged_tolerance(field("op_name")).as_deref(),
            Some("calls_merged.op_name IS NULL")
        );
        assert_eq!(
            merged.unmerged_tolerance(field("input_refs")).as_deref(),
            Some("length(calls_merged.input_refs) = 0")
        );
        assert_eq!(
            TableKind::Complete.variant().unmerged_tolerance(field("op_name")),
            None
        );
    }
}
