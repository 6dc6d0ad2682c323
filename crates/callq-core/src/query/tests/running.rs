use super::*;
use crate::query::{OrderDirection, expr::field};

fn running(project: &str) -> CallsQuery {
    complete(project).include_running(true)
}

#[test]
fn running_on_complete_unions_in_flight_starts() {
    let compiled = compile(running("p").fields(["id", "ended_at"]));

    assert!(compiled.sql.starts_with("WITH running_calls AS (\n(SELECT calls_complete.id AS id\nFROM calls_complete\n"));
    assert!(compiled.sql.contains("\nUNION ALL\n(SELECT call_starts.id AS id\nFROM call_starts\n"));
    assert!(compiled.sql.contains(
        "call_starts.id NOT IN (SELECT calls_complete.id FROM calls_complete \
         WHERE calls_complete.project_id = {pb_0:String})"
    ));
    assert!(compiled.sql.ends_with(") AS calls_running"));
    assert!(compiled.sql.contains("call_starts.id IN (SELECT id FROM running_calls)"));
    assert!(compiled.sql.contains("toDateTime64(0, 6) AS ended_at"));
}

#[test]
fn start_rows_of_finished_calls_never_reach_the_row_union() {
    let compiled = compile(running("p").fields(["id", "op_name"]));
    let (_, starts_rows) = compiled
        .sql
        .rsplit_once("FROM call_starts\n")
        .expect("starts row source");

    assert!(starts_rows.contains("call_starts.id IN (SELECT id FROM running_calls)"));
    assert!(starts_rows.contains(
        "call_starts.id NOT IN (SELECT calls_complete.id FROM calls_complete \
         WHERE calls_complete.project_id = {pb_0:String})"
    ));
    assert_eq!(compiled.sql.matches("call_starts.id NOT IN").count(), 2);
}

#[test]
fn running_branches_fetch_enough_rows_for_the_page() {
    let compiled = compile(
        running("p")
            .field("id")
            .condition(field("op_name").eq("predict"))
            .order_by("started_at", OrderDirection::Desc)
            .limit(10)
            .offset(5),
    );

    assert_eq!(compiled.sql.matches("\nLIMIT 15").count(), 2);
    assert!(compiled.sql.ends_with("ORDER BY calls_running.started_at DESC\nLIMIT 10\nOFFSET 5"));
    assert!(compiled.sql.contains("calls_complete.op_name = {pb_"));
    assert!(compiled.sql.contains("call_starts.op_name = {pb_"));
}

#[test]
fn running_is_a_no_op_on_the_merged_table() {
    let plain = compile(merged("p").field("id"));
    let with_running = compile(merged("p").field("id").include_running(true));

    assert_eq!(plain, with_running);
}
