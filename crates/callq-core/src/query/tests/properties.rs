use super::*;
use crate::query::expr::{Expr, field};
use proptest::prelude::*;

fn native_leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(|name| field("op_name").eq(name)),
        prop::collection::vec("[a-f0-9]{4}", 1..4).prop_map(|ids| field("trace_id").in_list(ids)),
        (0_i64..1_000).prop_map(|step| field("wb_run_step").gt(step)),
        (1_600_000_000_i64..1_800_000_000).prop_map(|epoch| field("started_at").gte(epoch)),
    ]
}

fn native_tree() -> impl Strategy<Value = Expr> {
    native_leaf().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(lhs, rhs)| lhs.and(rhs)),
            (inner.clone(), inner.clone()).prop_map(|(lhs, rhs)| lhs.or(rhs)),
            inner.prop_map(Expr::not),
        ]
    })
}

proptest! {
    #[test]
    fn native_conditions_aggregate_only_on_merged(condition in native_tree()) {
        let flat = compile(
            complete("p").fields(["id", "op_name"]).condition(condition.clone()),
        );
        let grouped = compile(merged("p").fields(["id", "op_name"]).condition(condition));

        prop_assert!(!flat.sql.contains("GROUP BY"), "{}", flat.sql);
        prop_assert!(!flat.sql.contains("any("), "{}", flat.sql);
        prop_assert!(!flat.sql.contains("HAVING"), "{}", flat.sql);
        prop_assert!(
            grouped.sql.contains("\nGROUP BY (calls_merged.project_id, calls_merged.id)"),
            "{}",
            grouped.sql
        );
        prop_assert!(grouped.sql.contains("any(calls_merged."), "{}", grouped.sql);
    }
}
