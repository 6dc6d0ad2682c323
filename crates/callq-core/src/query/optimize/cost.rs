//! Module: query::optimize::cost
//! Responsibility: the LLM cost CTE chain wrapped around the main query.
//! Does not own: the main query itself (it becomes `all_calls` unchanged).
//! Boundary: costs are spliced into `summary_dump` as `weave.costs`.
//!
//! Chain: `all_calls` → `llm_usage` (one row per model in `summary.usage`)
//! → `ranked_prices` → `filtered_prices` (best price per model) →
//! `costs_by_call` (one JSON object per call).

use crate::query::{
    assemble::{Cte, SelectQuery, alias},
    order::SortKey,
};

pub(crate) const ALL_CALLS: &str = "all_calls";
const LLM_USAGE: &str = "llm_usage";
const RANKED_PRICES: &str = "ranked_prices";
const FILTERED_PRICES: &str = "filtered_prices";
const COSTS_BY_CALL: &str = "costs_by_call";

/// Stand-in model id so calls without usage still produce one usage row.
const DUMMY_LLM_ID: &str = "weave_dummy_llm_id";

// Empty when no price row matched the model.
const PRICE_ID: &str = "price_id";
const SUMMARY: &str = "summary_dump";
const EMPTY_OBJECT: &str = "'{}'";
const OPEN_OBJECT: &str = "'{'";
const CLOSE_OBJECT: &str = "'}'";
const COSTS_KEY: &str = r#"'"weave":{"costs":'"#;
const CLOSE_SPLICE: &str = "'}}'";

const USAGE_COLUMNS: [&str; 5] = [
    "llm_id",
    "requests",
    "prompt_tokens",
    "completion_tokens",
    "total_tokens",
];

const PRICE_COLUMNS: [&str; 10] = [
    "prompt_token_cost",
    "completion_token_cost",
    "prompt_token_cost_unit",
    "completion_token_cost_unit",
    "effective_date",
    "provider_id",
    "pricing_level",
    "pricing_level_id",
    "created_at",
    "created_by",
];

///
/// CostValue
///
/// One key of the per-model cost object.
///

enum CostValue {
    Number(&'static str),
    Product(&'static str, &'static str),
    Text(&'static str),
}

const COST_OBJECT: [(&str, CostValue); 16] = [
    ("requests", CostValue::Number("requests")),
    ("prompt_tokens", CostValue::Number("prompt_tokens")),
    ("completion_tokens", CostValue::Number("completion_tokens")),
    ("total_tokens", CostValue::Number("total_tokens")),
    (
        "prompt_tokens_total_cost",
        CostValue::Product("prompt_tokens", "prompt_token_cost"),
    ),
    (
        "completion_tokens_total_cost",
        CostValue::Product("completion_tokens", "completion_token_cost"),
    ),
    ("prompt_token_cost", CostValue::Number("prompt_token_cost")),
    ("completion_token_cost", CostValue::Number("completion_token_cost")),
    ("prompt_token_cost_unit", CostValue::Text("prompt_token_cost_unit")),
    ("completion_token_cost_unit", CostValue::Text("completion_token_cost_unit")),
    ("effective_date", CostValue::Text("effective_date")),
    ("provider_id", CostValue::Text("provider_id")),
    ("pricing_level", CostValue::Text("pricing_level")),
    ("pricing_level_id", CostValue::Text("pricing_level_id")),
    ("created_at", CostValue::Text("created_at")),
    ("created_by", CostValue::Text("created_by")),
];

/// Alias of the `index`th carried sort key.
pub(crate) fn order_key(index: usize) -> String {
    format!("order_key_{index}")
}

/// `all_calls` plus the cost CTEs that follow it.
pub(crate) fn cost_ctes(all_calls: String, project: &str) -> Vec<Cte> {
    vec![
        Cte::new(ALL_CALLS, all_calls),
        Cte::new(LLM_USAGE, llm_usage()),
        Cte::new(RANKED_PRICES, ranked_prices(project)),
        Cte::new(FILTERED_PRICES, filtered_prices()),
        Cte::new(COSTS_BY_CALL, costs_by_call()),
    ]
}

/// Outer SELECT over `all_calls`: `outputs` in order, costs spliced into the
/// summary, ordered by the carried sort keys.
pub(crate) fn final_select(outputs: &[&str], order: &[SortKey]) -> SelectQuery {
    let mut select = SelectQuery::from_source(ALL_CALLS);
    select.columns = outputs
        .iter()
        .map(|column| {
            let name = alias(column);
            if *column == SUMMARY {
                format!("{} AS {name}", summary_splice())
            } else {
                format!("{ALL_CALLS}.{name} AS {name}")
            }
        })
        .collect();
    select.joins = vec![format!(
        "LEFT JOIN {COSTS_BY_CALL} ON {ALL_CALLS}.id = {COSTS_BY_CALL}.id"
    )];
    select.order_by = order
        .iter()
        .enumerate()
        .map(|(index, key)| format!("{ALL_CALLS}.{} {}", order_key(index), key.modifier))
        .collect();

    select
}

fn llm_usage() -> String {
    let summary = format!("coalesce({ALL_CALLS}.{SUMMARY}, {EMPTY_OBJECT})");
    let usage = format!("JSONExtractKeysAndValuesRaw({summary}, 'usage')");
    let tokens = |key: &str, fallback: &str| {
        format!(
            "if(JSONHas(kv.2, '{key}'), JSONExtractInt(kv.2, '{key}'), JSONExtractInt(kv.2, '{fallback}')) AS {key}"
        )
    };

    format!(
        "SELECT {ALL_CALLS}.id AS id, {ALL_CALLS}.started_at AS started_at, kv.1 AS llm_id, \
         JSONExtractInt(kv.2, 'requests') AS requests, {}, {}, \
         JSONExtractInt(kv.2, 'total_tokens') AS total_tokens \
         FROM {ALL_CALLS} \
         ARRAY JOIN if(empty({usage}), [('{DUMMY_LLM_ID}', {EMPTY_OBJECT})], {usage}) AS kv",
        tokens("prompt_tokens", "input_tokens"),
        tokens("completion_tokens", "output_tokens"),
    )
}

// Rank 1 is the applicable price (effective before the call started),
// project-level over default, then most recent.
fn ranked_prices(project: &str) -> String {
    let usage: Vec<String> = USAGE_COLUMNS
        .iter()
        .map(|column| format!("{LLM_USAGE}.{column} AS {column}"))
        .collect();
    let prices: Vec<String> = PRICE_COLUMNS
        .iter()
        .map(|column| format!("prices.{column} AS {column}"))
        .collect();

    format!(
        "SELECT {LLM_USAGE}.id AS id, {}, {}, ifNull(prices.id, '') AS {PRICE_ID}, \
         ROW_NUMBER() OVER (PARTITION BY {LLM_USAGE}.id, {LLM_USAGE}.llm_id ORDER BY \
         if(prices.effective_date <= {LLM_USAGE}.started_at, 1, 2), \
         if(prices.pricing_level_id = {project}, 1, 2), \
         prices.effective_date DESC, prices.created_at DESC) AS rank \
         FROM {LLM_USAGE} \
         LEFT JOIN (SELECT * FROM llm_token_prices \
         WHERE llm_token_prices.pricing_level_id IN ({project}, 'default')) AS prices \
         ON {LLM_USAGE}.llm_id = prices.llm_id",
        usage.join(", "),
        prices.join(", "),
    )
}

fn filtered_prices() -> String {
    let columns: Vec<String> = std::iter::once("id")
        .chain(USAGE_COLUMNS)
        .chain(PRICE_COLUMNS)
        .chain(std::iter::once(PRICE_ID))
        .map(|column| format!("{RANKED_PRICES}.{column} AS {column}"))
        .collect();

    format!(
        "SELECT {} FROM {RANKED_PRICES} WHERE {RANKED_PRICES}.rank = 1",
        columns.join(", ")
    )
}

fn costs_by_call() -> String {
    let mut parts = vec![
        format!("toJSONString({FILTERED_PRICES}.llm_id)"),
        "':{'".to_string(),
    ];
    for (index, (key, value)) in COST_OBJECT.iter().enumerate() {
        let separator = if index == 0 { "" } else { "," };
        parts.push(format!("'{separator}\"{key}\":'"));
        parts.push(match value {
            CostValue::Number(column) => format!("toString({FILTERED_PRICES}.{column})"),
            CostValue::Product(lhs, rhs) => {
                format!("toString({FILTERED_PRICES}.{lhs} * {FILTERED_PRICES}.{rhs})")
            }
            CostValue::Text(column) => {
                format!("toJSONString(toString({FILTERED_PRICES}.{column}))")
            }
        });
    }
    parts.push(CLOSE_OBJECT.to_string());

    format!(
        "SELECT {FILTERED_PRICES}.id AS id, \
         concat({OPEN_OBJECT}, arrayStringConcat(groupArray(concat({})), ','), {CLOSE_OBJECT}) AS costs_dump \
         FROM {FILTERED_PRICES} \
         WHERE {FILTERED_PRICES}.llm_id != '{DUMMY_LLM_ID}' \
         AND {FILTERED_PRICES}.{PRICE_ID} != '' \
         GROUP BY {FILTERED_PRICES}.id",
        parts.join(", ")
    )
}

// Unchanged when the call has no priced usage; otherwise the summary object
// gains a trailing `"weave":{"costs":{...}}` member.
fn summary_splice() -> String {
    let summary = format!("{ALL_CALLS}.{SUMMARY}");
    let costs = format!("ifNull({COSTS_BY_CALL}.costs_dump, '')");

    format!(
        "if({costs} = '', {summary}, concat(\
         if(coalesce({summary}, '') IN ('', {EMPTY_OBJECT}), {OPEN_OBJECT}, \
         concat(substring({summary}, 1, length({summary}) - 1), ',')), \
         {COSTS_KEY}, {costs}, {CLOSE_SPLICE}))"
    )
}
