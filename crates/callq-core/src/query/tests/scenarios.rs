use super::*;
use crate::query::{
    CallsFilter, OrderDirection, expr::field, validate::ValidateError,
};

#[test]
fn merged_selection_reconciles_parts_with_group_by() {
    let compiled = compile(
        merged("entity/proj")
            .fields(["id", "started_at"])
            .order_by("started_at", OrderDirection::Desc),
    );

    assert_eq!(
        compiled.sql,
        "SELECT calls_merged.id AS id, any(calls_merged.started_at) AS started_at\n\
         FROM calls_merged\n\
         WHERE calls_merged.project_id = {pb_0:String}\n\
         GROUP BY (calls_merged.project_id, calls_merged.id)\n\
         HAVING any(calls_merged.deleted_at) IS NULL AND any(calls_merged.started_at) IS NOT NULL\n\
         ORDER BY any(calls_merged.started_at) DESC"
    );
    assert_eq!(compiled.params.len(), 1);
    assert_eq!(compiled.params.get("pb_0"), Some(&Value::from("entity/proj")));
}

#[test]
fn complete_selection_is_flat_with_sentinel_liveness() {
    let compiled = compile(
        complete("entity/proj")
            .fields(["id", "started_at"])
            .order_by("started_at", OrderDirection::Desc),
    );

    assert_eq!(
        compiled.sql,
        "SELECT calls_complete.id AS id, calls_complete.started_at AS started_at\n\
         FROM calls_complete\n\
         WHERE calls_complete.project_id = {pb_0:String} \
         AND calls_complete.deleted_at = {pb_1:DateTime64(6)} \
         AND calls_complete.started_at != {pb_2:DateTime64(6)}\n\
         ORDER BY calls_complete.started_at DESC"
    );
    assert!(!compiled.sql.contains("GROUP BY"));
    assert!(!compiled.sql.contains("any("));
}

#[test]
fn heavy_json_equality_gets_like_prefilter_and_exact_match() {
    let compiled = compile(
        complete("entity/proj")
            .fields(["id", "inputs"])
            .condition(field("inputs.param.val").eq("hello")),
    );

    assert!(
        compiled
            .sql
            .contains("JSON_VALUE(calls_complete.inputs_dump, {pb_1:String}) = {pb_2:String}")
    );
    assert!(compiled.sql.contains("calls_complete.inputs_dump LIKE {pb_"));
    assert!(has_value(&compiled, "%\"hello\"%"));
    assert_eq!(compiled.params.get("pb_2"), Some(&Value::from("hello")));
}

#[test]
fn include_deleted_drops_the_deletion_check() {
    let compiled = compile(merged("p").field("id").include_deleted(true));

    assert!(!compiled.sql.contains("deleted_at"));
    assert!(compiled.sql.contains("any(calls_merged.started_at) IS NOT NULL"));
}

#[test]
fn hardcoded_filter_lands_in_the_statement() {
    let compiled = compile(complete("p").field("id").filter(CallsFilter {
        trace_ids: Some(vec!["t1".to_string(), "t2".to_string()]),
        ..CallsFilter::default()
    }));

    assert!(compiled.sql.contains("calls_complete.trace_id IN {pb_1:Array(String)}"));
    assert_eq!(
        compiled.params.get("pb_1"),
        Some(&Value::from(vec!["t1", "t2"]))
    );
}

#[test]
fn empty_project_is_rejected() {
    assert!(matches!(
        compile_err(merged("  ").field("id")),
        CompileError::Validate(ValidateError::EmptyProjectId)
    ));
}

#[test]
fn unknown_selection_is_rejected() {
    assert!(matches!(
        compile_err(merged("p").field("no_such_field")),
        CompileError::Validate(ValidateError::UnknownField { .. })
    ));
}

#[test]
fn oversized_filter_list_is_rejected_before_any_sql() {
    let ids: Vec<String> = (0..3).map(|i| format!("call-{i}")).collect();
    let config = CompileConfig {
        max_array_filter_len: 2,
        ..CompileConfig::default()
    };
    let ctx = QueryContext::new(FieldRegistry::calls(), &config);
    let err = merged("p")
        .filter(CallsFilter {
            call_ids: Some(ids),
            ..CallsFilter::default()
        })
        .compile_with(&ctx)
        .expect_err("too many ids");

    assert!(matches!(
        err,
        CompileError::Validate(ValidateError::TooManyValues { len: 3, max: 2, .. })
    ));
}

#[test]
fn malformed_expand_column_is_rejected() {
    assert!(matches!(
        compile_err(merged("p").expand_columns(["op_name.x"])),
        CompileError::Validate(ValidateError::InvalidExpandColumn { .. })
    ));
}

#[test]
fn count_wraps_the_filtered_ids() {
    let compiled = merged("p")
        .fields(["id", "inputs"])
        .condition(field("op_name").eq("predict"))
        .order_by("started_at", OrderDirection::Asc)
        .limit(10)
        .compile_count()
        .expect("count compiles");

    assert!(compiled.sql.starts_with(
        "SELECT count() AS count\nFROM (\nSELECT calls_merged.id AS id\nFROM calls_merged\n"
    ));
    assert!(compiled.sql.ends_with("\n)"));
    assert!(!compiled.sql.contains("ORDER BY"));
    assert!(!compiled.sql.contains("LIMIT"));
    assert!(!compiled.sql.contains("filtered_calls"));
}
