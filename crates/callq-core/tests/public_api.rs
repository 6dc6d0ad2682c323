use callq_core::{
    model::FieldRegistry,
    obs::CompileCounters,
    prelude::*,
    query::{soft_delete_calls, validate::ValidateError},
    threads::{ThreadsFilter, ThreadsQuery},
};

#[test]
fn wire_request_compiles_to_one_statement() {
    let request = CallsQueryRequest::from_json(
        r#"{
            "project_id": "entity/proj",
            "columns": ["id", "op_name", "started_at"],
            "filter": {"trace_roots_only": true},
            "query": {"$expr": {"$eq": [{"$getField": "op_name"}, {"$literal": "predict"}]}},
            "sort_by": [{"field": "started_at", "direction": "desc"}],
            "limit": 25,
            "table": "complete"
        }"#,
    )
    .expect("request parses");
    let compiled = request.into_query().compile().expect("request compiles");

    assert!(
        compiled
            .sql
            .starts_with("SELECT calls_complete.id AS id, calls_complete.op_name AS op_name")
    );
    assert!(compiled.sql.ends_with("ORDER BY calls_complete.started_at DESC\nLIMIT 25"));

    let json = compiled.params.to_json_map();
    assert_eq!(json.get("pb_0"), Some(&serde_json::json!("entity/proj")));
    assert!(json.values().any(|value| value == "predict"));
}

#[test]
fn builder_and_request_agree() {
    let built = CallsQuery::new("p")
        .table(TableKind::Merged)
        .fields(["id", "inputs"])
        .condition(field("inputs.model").eq("gpt"))
        .compile()
        .expect("builder compiles");
    let requested = CallsQueryRequest::from_json(
        r#"{
            "project_id": "p",
            "columns": ["id", "inputs"],
            "query": {"$expr": {"$eq": [{"$getField": "inputs.model"}, {"$literal": "gpt"}]}}
        }"#,
    )
    .expect("request parses")
    .into_query()
    .compile()
    .expect("request compiles");

    assert_eq!(built, requested);
}

#[test]
fn rejected_compiles_produce_no_sql_and_are_counted() {
    let counters = CompileCounters::new();
    let config = CompileConfig::default();
    let ctx = QueryContext::new(FieldRegistry::calls(), &config).with_sink(&counters);

    let err = CallsQuery::new("p")
        .order_by("input_refs", OrderDirection::Asc)
        .compile_with(&ctx)
        .expect_err("ref arrays are not orderable");

    assert!(matches!(err, CompileError::Validate(ValidateError::FieldNotOrderable { .. })));
    assert!(!err.is_retryable());
    assert_eq!(counters.report().rejected, 1);
    assert_eq!(counters.report().compiled, 0);
}

#[test]
fn soft_delete_round_trip_through_the_public_surface() {
    let config = CompileConfig::default();
    let none = soft_delete_calls("p", &[], "u", TableKind::Complete, &config).expect("noop");
    let some = soft_delete_calls("p", &["c1".to_string()], "u", TableKind::Complete, &config)
        .expect("statement");

    assert!(none.is_noop());
    assert!(some.sql.starts_with("ALTER TABLE calls_complete\n"));
}

#[test]
fn threads_use_sqlite_placeholders() {
    let compiled = ThreadsQuery::new("p")
        .filter(ThreadsFilter {
            thread_ids: Some(vec!["t".to_string()]),
            ..ThreadsFilter::default()
        })
        .limit(5)
        .compile()
        .expect("threads compile");

    assert!(compiled.sql.contains("calls.project_id = :pb_0"));
    assert!(compiled.sql.contains("calls.thread_id IN (:pb_1)"));
    assert!(!compiled.sql.contains('{'));
    assert!(compiled.sql.ends_with("\nLIMIT 5"));
}
