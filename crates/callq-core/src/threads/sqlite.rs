use crate::{
    config::CompileConfig,
    error::CompileError,
    param::{ParamBuilder, ParamType, PlaceholderStyle},
    query::{
        CompiledQuery, OrderBy,
        assemble::SelectQuery,
        optimize::datetime::format_timestamp,
        path::ResolveError,
        validate::{ValidateError, validate_len, validate_project},
    },
    threads::ThreadsQuery,
    value::Value,
};
use time::OffsetDateTime;
use tracing::debug;

/// Output columns a threads query may be sorted by.
pub const THREAD_SORT_FIELDS: [&str; 4] =
    ["thread_id", "turn_count", "start_time", "last_updated"];

const DEFAULT_SORT: &str = "last_updated DESC";

// SQLite only accepts OFFSET after a LIMIT.
const UNBOUNDED_LIMIT: u64 = i64::MAX.unsigned_abs();

pub(super) fn compile_threads(
    query: &ThreadsQuery,
    config: &CompileConfig,
) -> Result<CompiledQuery, CompileError> {
    validate_project(&query.project_id)?;
    let thread_ids = query.filter.thread_ids.as_deref().unwrap_or_default();
    validate_len("thread_ids", thread_ids.len(), config.max_array_filter_len)?;
    let order = sort_clause(&query.sort_by)?;

    let mut params =
        ParamBuilder::with_style(config.param_prefix.clone(), PlaceholderStyle::Sqlite);
    let thread_values: Vec<Value> = thread_ids.iter().map(|id| Value::from(id.as_str())).collect();
    let turns = TurnFilter {
        project: params.add(query.project_id.as_str(), ParamType::String),
        thread_ids: params.add_each(&thread_values, &ParamType::String),
        after: bound(query.filter.after_datetime, "after_datetime", &mut params)?,
        before: bound(query.filter.before_datetime, "before_datetime", &mut params)?,
    };

    let mut select = SelectQuery::from_source("calls");
    select.columns = vec![
        "calls.thread_id AS thread_id".to_string(),
        "COUNT(*) AS turn_count".to_string(),
        "MIN(calls.started_at) AS start_time".to_string(),
        "MAX(COALESCE(calls.ended_at, calls.started_at)) AS last_updated".to_string(),
        format!("{} AS first_turn_id", turns.edge("ASC")),
        format!("{} AS last_turn_id", turns.edge("DESC")),
    ];
    select.where_ = turns.render("calls");
    select.group_by = Some("calls.thread_id".to_string());
    select.order_by = order;
    select.limit = query.limit.or_else(|| query.offset.map(|_| UNBOUNDED_LIMIT));
    select.offset = query.offset;

    debug!(
        thread_ids = thread_ids.len(),
        operator = "CompileThreads",
        "compiled threads query"
    );

    Ok(CompiledQuery {
        sql: select.render(),
        params: params.finish(),
    })
}

fn sort_clause(sort_by: &[OrderBy]) -> Result<Vec<String>, ValidateError> {
    if sort_by.is_empty() {
        return Ok(vec![DEFAULT_SORT.to_string()]);
    }

    sort_by
        .iter()
        .map(|by| {
            if THREAD_SORT_FIELDS.contains(&by.field.as_str()) {
                Ok(format!("{} {}", by.field, by.direction))
            } else {
                Err(ValidateError::InvalidSortField {
                    field: by.field.clone(),
                })
            }
        })
        .collect()
}

fn bound(
    instant: Option<OffsetDateTime>,
    name: &str,
    params: &mut ParamBuilder,
) -> Result<Option<String>, ResolveError> {
    instant
        .map(|instant| {
            let text = format_timestamp(instant).ok_or_else(|| ResolveError::InvalidLiteral {
                field: name.to_string(),
                expected: "representable timestamp",
                found: "datetime",
            })?;
            Ok(params.add(text, ParamType::String))
        })
        .transpose()
}

///
/// TurnFilter
///
/// Bound placeholders for the turn predicate, renderable against any alias
/// of `calls`.
///

struct TurnFilter {
    project: String,
    thread_ids: Vec<String>,
    after: Option<String>,
    before: Option<String>,
}

impl TurnFilter {
    fn render(&self, alias: &str) -> Vec<String> {
        let mut out = vec![
            format!("{alias}.project_id = {}", self.project),
            format!("{alias}.thread_id IS NOT NULL"),
            format!("{alias}.thread_id != ''"),
            format!("{alias}.id = {alias}.turn_id"),
            format!("{alias}.deleted_at IS NULL"),
        ];
        if !self.thread_ids.is_empty() {
            out.push(format!(
                "{alias}.thread_id IN ({})",
                self.thread_ids.join(", ")
            ));
        }
        if let Some(after) = &self.after {
            out.push(format!("{alias}.started_at >= {after}"));
        }
        if let Some(before) = &self.before {
            out.push(format!("{alias}.started_at < {before}"));
        }

        out
    }

    // Id of the earliest (`ASC`) or latest (`DESC`) turn of the outer thread.
    fn edge(&self, direction: &str) -> String {
        let mut filters = self.render("turn");
        filters.push("turn.thread_id = calls.thread_id".to_string());

        format!(
            "(SELECT turn.id FROM calls AS turn WHERE {} ORDER BY turn.started_at {direction}, turn.id {direction} LIMIT 1)",
            filters.join(" AND ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        query::OrderDirection,
        threads::{ThreadsFilter, ThreadsQuery},
    };

    #[test]
    fn default_query_groups_turns_by_thread() {
        let compiled = ThreadsQuery::new("proj").compile().expect("compiles");

        assert!(compiled.sql.starts_with("SELECT calls.thread_id AS thread_id, COUNT(*) AS turn_count"));
        assert!(compiled.sql.contains("\nFROM calls\nWHERE calls.project_id = :pb_0 AND"));
        assert!(compiled.sql.contains("calls.id = calls.turn_id"));
        assert!(compiled.sql.contains("\nGROUP BY calls.thread_id\nORDER BY last_updated DESC"));
        assert!(!compiled.sql.contains("\nLIMIT"));
        assert_eq!(compiled.params.len(), 1);
    }

    #[test]
    fn thread_ids_bind_one_placeholder_each() {
        let query = ThreadsQuery::new("proj").filter(ThreadsFilter {
            thread_ids: Some(vec!["a".to_string(), "b".to_string()]),
            ..ThreadsFilter::default()
        });
        let compiled = query.compile().expect("compiles");

        assert!(compiled.sql.contains("calls.thread_id IN (:pb_1, :pb_2)"));
        assert!(compiled.sql.contains("turn.thread_id IN (:pb_1, :pb_2)"));
        assert_eq!(compiled.params.get("pb_2"), Some(&Value::from("b")));
    }

    #[test]
    fn datetime_bounds_are_formatted_in_utc() {
        let after = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid");
        let query = ThreadsQuery::new("proj").filter(ThreadsFilter {
            after_datetime: Some(after),
            ..ThreadsFilter::default()
        });
        let compiled = query.compile().expect("compiles");

        assert!(compiled.sql.contains("calls.started_at >= :pb_1"));
        assert_eq!(
            compiled.params.get("pb_1"),
            Some(&Value::from("2023-11-14 22:13:20.000000"))
        );
    }

    #[test]
    fn sort_fields_are_restricted() {
        let ok = ThreadsQuery::new("proj")
            .sort_by("turn_count", OrderDirection::Desc)
            .compile()
            .expect("compiles");
        assert!(ok.sql.contains("ORDER BY turn_count DESC"));

        let err = ThreadsQuery::new("proj")
            .sort_by("op_name", OrderDirection::Asc)
            .compile()
            .expect_err("rejected");
        assert!(matches!(
            err,
            CompileError::Validate(ValidateError::InvalidSortField { .. })
        ));
    }

    #[test]
    fn offset_without_limit_still_renders_a_limit() {
        let compiled = ThreadsQuery::new("proj").offset(20).compile().expect("compiles");

        assert!(compiled.sql.ends_with("\nLIMIT 9223372036854775807\nOFFSET 20"));
    }
}
