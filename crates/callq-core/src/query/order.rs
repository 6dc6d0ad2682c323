use crate::{
    error::CompileError,
    model::TableVariant,
    query::{
        json::{json_order_terms, json_value},
        optimize::storage::is_storage_field,
        path::{ResolvedField, resolve},
        select::field_value,
        state::{CompileState, Scope},
        validate::ValidateError,
    },
};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

///
/// OrderBy
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: OrderDirection,
}

impl OrderBy {
    #[must_use]
    pub fn new(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

///
/// SortKey
///
/// One ORDER BY entry; `modifier` is the direction plus any NULLS clause.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct SortKey {
    pub(crate) expr: String,
    pub(crate) modifier: String,
}

impl SortKey {
    pub(crate) fn new(expr: impl Into<String>, modifier: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            modifier: modifier.into(),
        }
    }

    pub(crate) fn render(&self) -> String {
        format!("{} {}", self.expr, self.modifier)
    }
}

///
/// OrderTerm
///
/// Sort keys produced by one requested ordering.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct OrderTerm {
    pub(crate) keys: Vec<SortKey>,
    /// Computable from native columns without joins.
    pub(crate) light: bool,
}

pub(crate) fn compile_order(
    order: &[OrderBy],
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<Vec<OrderTerm>, CompileError> {
    order
        .iter()
        .map(|by| compile_term(by, variant, scope, state))
        .collect()
}

fn compile_term(
    by: &OrderBy,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<OrderTerm, CompileError> {
    let not_orderable = || ValidateError::FieldNotOrderable {
        field: by.field.clone(),
    };

    match resolve(&by.field, scope.fields, &scope.expand)? {
        ResolvedField::Column(field) => {
            if !field.orderable {
                return Err(not_orderable().into());
            }
            let light = !is_storage_field(field);
            let expr = field_value(field, variant, scope, state)?;
            Ok(OrderTerm {
                keys: vec![SortKey::new(expr, by.direction.to_string())],
                light,
            })
        }
        ResolvedField::Json { field, path } => {
            let value = json_value(&variant.field_expr(field), &path, &mut state.params);
            Ok(OrderTerm {
                keys: json_order_terms(&value, by.direction),
                light: false,
            })
        }
        ResolvedField::Feedback(feedback) => {
            state.passes.feedback_join = true;
            let value = state
                .feedback
                .payload_value(variant, &feedback, &mut state.params);
            Ok(OrderTerm {
                keys: json_order_terms(&value, by.direction),
                light: false,
            })
        }
        ResolvedField::ObjectRef(_) => Err(not_orderable().into()),
    }
}
