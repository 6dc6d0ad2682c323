use super::*;
use crate::query::{OrderDirection, expr::field, validate::ValidateError};

// ----------------------------------------------------------------------
// Pushdown
// ----------------------------------------------------------------------

#[test]
fn light_conditions_with_heavy_selection_push_down_and_paginate() {
    let compiled = compile(
        merged("p")
            .fields(["id", "inputs"])
            .condition(field("op_name").eq("predict"))
            .order_by("started_at", OrderDirection::Desc)
            .limit(10),
    );

    assert!(compiled.sql.starts_with(
        "WITH filtered_calls AS (\nSELECT calls_merged.id AS id\nFROM calls_merged\n\
         WHERE calls_merged.project_id = {pb_0:String}"
    ));
    assert!(compiled.sql.contains("\nLIMIT 10\n)\nSELECT "));
    assert!(compiled.sql.contains("calls_merged.id IN (SELECT id FROM filtered_calls)"));
    assert_eq!(compiled.sql.matches("LIMIT").count(), 1);
}

#[test]
fn heavy_conditions_keep_pagination_on_the_main_query() {
    let compiled = compile(
        merged("p")
            .fields(["id", "inputs"])
            .condition(field("op_name").eq("predict"))
            .condition(field("inputs.model").eq("gpt"))
            .limit(10),
    );

    assert!(compiled.sql.starts_with("WITH filtered_calls AS ("));
    assert!(compiled.sql.ends_with("\nLIMIT 10"));
    assert_eq!(compiled.sql.matches("LIMIT").count(), 1);
}

#[test]
fn light_only_selection_skips_pushdown() {
    let compiled = compile(
        merged("p")
            .fields(["id", "op_name"])
            .condition(field("op_name").eq("predict")),
    );

    assert!(!compiled.sql.contains("filtered_calls"));
}

// ----------------------------------------------------------------------
// Object references and feedback
// ----------------------------------------------------------------------

#[test]
fn expanded_reference_conditions_generate_ctes() {
    let compiled = compile(
        merged("p")
            .field("id")
            .expand_columns(["inputs.model"])
            .condition(field("inputs.model.name").eq("gpt")),
    );

    assert!(compiled.sql.starts_with("WITH obj_ref_0 AS (\n"));
    assert!(compiled.sql.contains("IN (SELECT ref FROM obj_ref_0)"));
}

#[test]
fn reference_cte_cap_rejects_the_query() {
    let config = CompileConfig {
        max_object_ref_ctes: 0,
        ..CompileConfig::default()
    };
    let ctx = QueryContext::new(FieldRegistry::calls(), &config);
    let err = merged("p")
        .field("id")
        .expand_columns(["inputs.model"])
        .condition(field("inputs.model.name").eq("gpt"))
        .compile_with(&ctx)
        .expect_err("cap exceeded");

    assert!(matches!(
        err,
        CompileError::Validate(ValidateError::TooManyObjectRefCtes { max: 0 })
    ));
}

#[test]
fn feedback_conditions_join_the_pivoted_feedback() {
    let compiled = compile(
        complete("p")
            .field("id")
            .condition(field("feedback.[note].payload.text").eq("ok")),
    );

    assert!(compiled.sql.contains(
        "LEFT JOIN (SELECT feedback.weave_ref AS weave_ref, argMaxIf(feedback.payload_dump, \
         feedback.created_at, feedback.feedback_type = {pb_"
    ));
    assert!(compiled.sql.contains("JSON_VALUE(feedback.payload_dump_0, {pb_"));
    assert!(has_value(&compiled, "note"));
}

// ----------------------------------------------------------------------
// Costs and storage
// ----------------------------------------------------------------------

#[test]
fn costs_wrap_the_statement_in_the_cost_chain() {
    let compiled = compile(
        complete("p")
            .field("id")
            .include_costs(true)
            .order_by("started_at", OrderDirection::Desc)
            .limit(5),
    );

    assert!(compiled.sql.starts_with("WITH all_calls AS (\n"));
    assert!(compiled.sql.contains("calls_complete.started_at AS order_key_0"));
    assert!(compiled.sql.contains("\nLIMIT 5\n),\nllm_usage AS (\n"));
    assert!(compiled.sql.contains("costs_by_call AS (\n"));
    assert!(compiled.sql.contains("SELECT all_calls.id AS id, "));
    assert!(compiled.sql.ends_with(
        "\nFROM all_calls\nLEFT JOIN costs_by_call ON all_calls.id = costs_by_call.id\n\
         ORDER BY all_calls.order_key_0 DESC"
    ));
}

#[test]
fn storage_sizes_join_the_stats_rollup() {
    let compiled = compile(complete("p").field("id").include_storage_size(true));

    assert!(compiled.sql.contains("storage_rollup.storage_size_bytes AS storage_size_bytes"));
    assert!(compiled.sql.contains("AS storage_rollup ON calls_complete.id = storage_rollup.id"));
}

// ----------------------------------------------------------------------
// Telemetry
// ----------------------------------------------------------------------

#[test]
fn sink_counts_outcomes_and_passes() {
    let report = compile_counted(vec![
        merged("p")
            .fields(["id", "inputs"])
            .condition(field("op_name").eq("predict")),
        complete("p")
            .field("id")
            .condition(field("inputs.param.val").eq("hello")),
        merged("").field("id"),
    ]);

    assert_eq!(report.compiled, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.pushdowns, 1);
    assert_eq!(report.like_prefilters, 1);
    assert_eq!(report.cost_chains, 0);
}
