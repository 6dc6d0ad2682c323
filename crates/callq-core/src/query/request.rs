use crate::{
    model::TableKind,
    query::{builder::CallsQuery, expr::Expr, optimize::filters::CallsFilter, order::OrderBy},
};
use serde::Deserialize;

///
/// QueryExpr
///
/// Wire wrapper around the condition tree: `{"$expr": {...}}`.
///

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct QueryExpr {
    #[serde(rename = "$expr")]
    pub expr: Expr,
}

///
/// CallsQueryRequest
///
/// Input shape handed over by the enclosing service. Absent members take
/// their defaults; unknown members are rejected.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
#[expect(clippy::struct_excessive_bools)]
pub struct CallsQueryRequest {
    pub project_id: String,
    pub columns: Option<Vec<String>>,
    pub filter: Option<CallsFilter>,
    pub query: Option<QueryExpr>,
    pub sort_by: Option<Vec<OrderBy>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub expand_columns: Option<Vec<String>>,
    pub table: TableKind,
    pub include_costs: bool,
    pub include_storage_size: bool,
    pub include_total_storage_size: bool,
    pub include_running: bool,
    pub include_deleted: bool,
}

impl CallsQueryRequest {
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    #[must_use]
    pub fn into_query(self) -> CallsQuery {
        let mut query = CallsQuery::new(self.project_id)
            .table(self.table)
            .fields(self.columns.unwrap_or_default())
            .expand_columns(self.expand_columns.unwrap_or_default())
            .filter(self.filter.unwrap_or_default())
            .include_costs(self.include_costs)
            .include_storage_size(self.include_storage_size)
            .include_total_storage_size(self.include_total_storage_size)
            .include_running(self.include_running)
            .include_deleted(self.include_deleted);

        if let Some(QueryExpr { expr }) = self.query {
            query = query.condition(expr);
        }
        for by in self.sort_by.unwrap_or_default() {
            query = query.order_by(by.field, by.direction);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }

        query
    }
}

impl From<CallsQueryRequest> for CallsQuery {
    fn from(request: CallsQueryRequest) -> Self {
        request.into_query()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{expr::field, order::OrderDirection};

    #[test]
    fn wire_request_maps_onto_the_builder() {
        let request = CallsQueryRequest::from_json(
            r#"{
                "project_id": "entity/proj",
                "columns": ["id", "inputs"],
                "filter": {"op_names": ["weave:///entity/proj/op/predict:*"], "trace_roots_only": true},
                "query": {"$expr": {"$eq": [{"$getField": "inputs.model"}, {"$literal": "gpt"}]}},
                "sort_by": [{"field": "started_at", "direction": "desc"}],
                "limit": 50,
                "table": "complete",
                "include_costs": true
            }"#,
        )
        .expect("request parses");
        let query = request.into_query();

        assert_eq!(query.project_id, "entity/proj");
        assert_eq!(query.fields, vec!["id", "inputs"]);
        assert_eq!(query.table, TableKind::Complete);
        assert_eq!(query.conditions, vec![field("inputs.model").eq("gpt")]);
        assert_eq!(query.order, vec![OrderBy::new("started_at", OrderDirection::Desc)]);
        assert_eq!(query.limit, Some(50));
        assert_eq!(query.offset, None);
        assert!(query.toggles.include_costs);
        assert_eq!(query.filter.trace_roots_only, Some(true));
    }

    #[test]
    fn unknown_members_are_rejected() {
        assert!(CallsQueryRequest::from_json(r#"{"project_id": "p", "colums": []}"#).is_err());
    }

    #[test]
    fn minimal_request_uses_defaults() {
        let query = CallsQueryRequest::from_json(r#"{"project_id": "p"}"#)
            .expect("request parses")
            .into_query();

        assert!(query.fields.is_empty());
        assert!(query.conditions.is_empty());
        assert_eq!(query.table, TableKind::Merged);
    }
}
