//! LIKE pre-filter over raw JSON dump columns.
//!
//! A literal that survives JSON encoding byte-for-byte can be searched for
//! in the stored dump text before any extraction happens. Exact-true always
//! implies LIKE-true; the exact predicate still runs afterwards.

use crate::{
    model::{FieldDescriptor, TableVariant},
    param::{ParamBuilder, ParamType},
    query::{
        condition::{CmpOp, field_literal},
        expr::Expr,
        optimize::superset_predicate,
        path::{ResolvedField, resolve},
        state::{CompileState, Scope},
    },
    value::Value,
};

/// Superset LIKE predicate for `condition`, if any part of it qualifies.
pub(crate) fn like_prefilter(
    condition: &Expr,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Option<String> {
    let params = &mut state.params;

    superset_predicate(condition, false, &mut |leaf, negated| {
        if negated {
            return None;
        }
        leaf_prefilter(leaf, variant, scope, params)
    })
}

fn leaf_prefilter(
    leaf: &Expr,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    params: &mut ParamBuilder,
) -> Option<String> {
    let (path, patterns, case_insensitive) = match leaf {
        Expr::In(input, items) => {
            let Expr::GetField(path) = input.as_ref() else {
                return None;
            };
            if items.is_empty() {
                return None;
            }
            let patterns = items
                .iter()
                .map(|item| match item {
                    Expr::Literal(Value::Text(text)) => equality_pattern(text),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()?;
            (path.as_str(), patterns, false)
        }
        Expr::Contains {
            input,
            substr,
            case_insensitive,
        } => {
            let (Expr::GetField(path), Expr::Literal(Value::Text(text))) =
                (input.as_ref(), substr.as_ref())
            else {
                return None;
            };
            let pattern = is_like_safe(text).then(|| format!("%{}%", escape_like(text)))?;
            (path.as_str(), vec![pattern], *case_insensitive)
        }
        _ => {
            let (CmpOp::Eq, lhs, rhs) = CmpOp::of(leaf)? else {
                return None;
            };
            let (path, Value::Text(text), _) = field_literal(CmpOp::Eq, lhs, rhs)? else {
                return None;
            };
            (path, vec![equality_pattern(text)?], false)
        }
    };

    let field = dump_field(path, scope)?;
    let column = variant.field_column(field);
    let keyword = if case_insensitive { "ILIKE" } else { "LIKE" };
    let mut disjuncts: Vec<String> = patterns
        .into_iter()
        .map(|pattern| {
            let pattern = params.add(pattern, ParamType::String);
            format!("{column} {keyword} {pattern}")
        })
        .collect();
    if let Some(tolerance) = variant.unmerged_tolerance(field) {
        disjuncts.push(tolerance);
    }

    Some(if disjuncts.len() == 1 {
        disjuncts.remove(0)
    } else {
        format!("({})", disjuncts.join(" OR "))
    })
}

// Only plain JSON paths read straight from a call dump qualify.
fn dump_field(path: &str, scope: &Scope<'_>) -> Option<&'static FieldDescriptor> {
    match resolve(path, scope.fields, &scope.expand).ok()? {
        ResolvedField::Json { field, .. } => Some(field),
        _ => None,
    }
}

/// Pattern matching a JSON value whose extracted text equals `text`.
///
/// Text that could also be a bare JSON scalar (`5`, `true`, `null`) is
/// matched unquoted so numbers and booleans stored unquoted still pass.
fn equality_pattern(text: &str) -> Option<String> {
    if !is_like_safe(text) {
        return None;
    }
    let escaped = escape_like(text);
    if could_be_bare_scalar(text) {
        Some(format!("%{escaped}%"))
    } else {
        Some(format!("%\"{escaped}\"%"))
    }
}

/// Non-empty printable ASCII that JSON encodes unchanged.
pub(crate) fn is_like_safe(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\')
}

fn could_be_bare_scalar(text: &str) -> bool {
    matches!(text, "true" | "false" | "null") || serde_json::from_str::<f64>(text).is_ok()
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
