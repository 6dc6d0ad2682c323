use crate::{
    model::{FieldDescriptor, FieldRegistry, SyntheticKind, TableVariant},
    param::ParamBuilder,
    query::{
        assemble::alias,
        path::ResolveError,
        state::{CompileState, Scope},
        validate::ValidateError,
    },
};

/// Reconciled SQL value of a registry field for `variant`.
pub(crate) fn field_value(
    field: &'static FieldDescriptor,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<String, ResolveError> {
    match field.synthetic_kind() {
        None => Ok(variant.field_expr(field)),
        Some(SyntheticKind::Status) => status_expr(variant, scope.fields, &mut state.params),
        Some(SyntheticKind::LatencyMs) => latency_expr(variant, scope.fields, &mut state.params),
        Some(kind @ (SyntheticKind::StorageSize | SyntheticKind::TotalStorageSize)) => {
            state.passes.storage_size = true;
            state
                .storage
                .value(kind, variant, scope.fields, &mut state.params)
        }
    }
}

fn dependency(registry: &FieldRegistry, name: &str) -> Result<&'static FieldDescriptor, ResolveError> {
    registry.get(name).ok_or_else(|| ResolveError::UnknownField {
        path: name.to_string(),
    })
}

fn status_expr(
    variant: &dyn TableVariant,
    registry: &FieldRegistry,
    params: &mut ParamBuilder,
) -> Result<String, ResolveError> {
    let errored = variant.null_check(dependency(registry, "exception")?, true, params);
    let running = variant.null_check(dependency(registry, "ended_at")?, false, params);

    Ok(format!(
        "multiIf({errored}, 'error', {running}, 'running', 'success')"
    ))
}

fn latency_expr(
    variant: &dyn TableVariant,
    registry: &FieldRegistry,
    params: &mut ParamBuilder,
) -> Result<String, ResolveError> {
    let ended_at = dependency(registry, "ended_at")?;
    let running = variant.null_check(ended_at, false, params);
    let started = variant.field_expr(dependency(registry, "started_at")?);
    let ended = variant.field_expr(ended_at);

    Ok(format!(
        "if({running}, NULL, dateDiff('millisecond', {started}, {ended}))"
    ))
}

/// Selected fields in request order, `id` first when not requested.
/// An empty request selects every physical field.
pub(crate) fn resolve_selection(
    names: &[String],
    registry: &FieldRegistry,
) -> Result<Vec<&'static FieldDescriptor>, ValidateError> {
    let mut out: Vec<&'static FieldDescriptor> = if names.is_empty() {
        registry.physical().collect()
    } else {
        names
            .iter()
            .map(|name| {
                registry.get(name).ok_or_else(|| ValidateError::UnknownField {
                    field: name.clone(),
                })
            })
            .collect::<Result<_, _>>()?
    };

    if !out.iter().any(|field| field.name == "id")
        && let Some(id) = registry.get("id")
    {
        out.insert(0, id);
    }
    let mut seen = Vec::with_capacity(out.len());
    out.retain(|field| {
        let fresh = !seen.contains(&field.name);
        seen.push(field.name);
        fresh
    });

    Ok(out)
}

/// `value AS alias` entries for the SELECT list.
pub(crate) fn select_columns(
    fields: &[&'static FieldDescriptor],
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<Vec<String>, ResolveError> {
    fields
        .iter()
        .map(|&field| {
            let value = field_value(field, variant, scope, state)?;
            Ok(format!("{value} AS {}", alias(field.column)))
        })
        .collect()
}
