//! Module: query::compile
//! Responsibility: drive one calls query from builder state to a statement.
//! Does not own: condition semantics, pass internals, or rendering.
//! Boundary: validation runs first; on error no SQL is produced.
//!
//! Statement layout, outermost first:
//! `WITH obj_ref_*, filtered_calls | running_calls, [cost chain]`
//! then the main SELECT (or the cost SELECT over `all_calls`, or the count
//! wrapper).

use crate::{
    error::CompileError,
    model::{
        FieldDescriptor, TableKind, TableVariant,
        table::{FlatCalls, Placement, RunningCalls, live_call_filters},
    },
    obs::CompileEvent,
    query::{
        assemble::{Cte, SelectQuery, alias, union_all},
        builder::{CallsQuery, CompiledQuery},
        condition::{CompiledCondition, ConditionCompiler, is_light},
        context::QueryContext,
        expr::Expr,
        optimize::{
            PassSet, cost,
            feedback::FeedbackJoin,
            filters::compile_filter,
            prefilters,
            pushdown::{self, PushdownInput},
            storage::StorageJoins,
        },
        order::{SortKey, compile_order},
        path::ExpandColumns,
        select::{resolve_selection, select_columns},
        state::{CompileState, Scope},
        validate::{ValidateError, validate_expand_columns, validate_filter, validate_project},
    },
};
use tracing::{debug, warn};

const RUNNING_CALLS: &str = "running_calls";

///
/// Shape
///
/// What the statement returns.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Shape {
    Rows,
    Count,
}

/// Compile `plan`, reporting the outcome to the context's sink.
pub(crate) fn compile_plan(
    plan: &CallsQuery,
    ctx: &QueryContext<'_>,
    shape: Shape,
) -> Result<CompiledQuery, CompileError> {
    let table = effective_table(plan);

    match build(plan, ctx, table, shape) {
        Ok((compiled, passes, ctes)) => {
            let params = compiled.params.len();
            debug!(
                table = table.label(),
                count = shape == Shape::Count,
                ctes,
                params,
                ?passes,
                operator = "CompileCalls",
                "compiled calls query"
            );
            ctx.sink.record(CompileEvent::Compiled {
                table,
                passes,
                ctes,
                params,
            });

            Ok(compiled)
        }
        Err(err) => {
            warn!(
                table = table.label(),
                reason = err.reason(),
                error = %err,
                operator = "CompileCalls",
                "rejected calls query"
            );
            ctx.sink.record(CompileEvent::Rejected {
                reason: err.reason(),
            });

            Err(err)
        }
    }
}

// Running calls on the complete table come from the starts union; the
// merged table already holds them.
const fn effective_table(plan: &CallsQuery) -> TableKind {
    match (plan.table, plan.toggles.include_running) {
        (TableKind::Complete, true) => TableKind::StartsUnion,
        (table, _) => table,
    }
}

fn build(
    plan: &CallsQuery,
    ctx: &QueryContext<'_>,
    table: TableKind,
    shape: Shape,
) -> Result<(CompiledQuery, PassSet, usize), CompileError> {
    validate_project(&plan.project_id)?;
    validate_filter(&plan.filter, ctx.config.max_array_filter_len)?;
    validate_expand_columns(&plan.expand_columns, ctx.fields)?;

    let scope = Scope {
        fields: ctx.fields,
        config: ctx.config,
        expand: ExpandColumns::new(&plan.expand_columns),
        include_deleted: plan.toggles.include_deleted,
    };
    let mut state = CompileState::new(ctx.config, &plan.project_id);
    let request = Request::prepare(plan, &scope, shape)?;
    let variant = table.variant();

    let body = if table == TableKind::StartsUnion {
        state.passes.running = true;
        running_body(&request, variant, &scope, &mut state)?
    } else {
        table_body(&request, variant, &scope, &mut state)?
    };

    let mut ctes = state.object_refs.take();
    ctes.extend(body.ctes);

    let mut statement = match shape {
        Shape::Count => count_select(body.select),
        Shape::Rows if plan.toggles.include_costs => {
            state.passes.costs = true;
            let all_calls = carry_cost_columns(body.select, &request, variant, &scope, &body.keys);
            debug!(
                table = table.label(),
                order_keys = body.keys.len(),
                operator = "CostAugmentation",
                "wrapping statement in cost chain"
            );
            ctes.extend(cost::cost_ctes(all_calls.render(), &state.project));
            let outputs: Vec<&str> = request.fields.iter().map(|field| field.column).collect();
            cost::final_select(&outputs, &body.keys)
        }
        Shape::Rows => body.select,
    };

    let cte_count = ctes.len();
    statement.ctes = ctes;
    let compiled = CompiledQuery {
        sql: statement.render(),
        params: state.params.finish(),
    };

    Ok((compiled, state.passes, cte_count))
}

///
/// Request
///
/// Builder state resolved against the registry: the output fields and the
/// top-level conjuncts split by weight.
///

struct Request<'p> {
    plan: &'p CallsQuery,
    shape: Shape,
    fields: Vec<&'static FieldDescriptor>,
    light: Vec<Expr>,
    heavy: Vec<Expr>,
}

impl<'p> Request<'p> {
    fn prepare(plan: &'p CallsQuery, scope: &Scope<'_>, shape: Shape) -> Result<Self, CompileError> {
        let fields = match shape {
            Shape::Rows => selection(plan, scope)?,
            Shape::Count => resolve_selection(&["id".to_string()], scope.fields)?,
        };

        let mut light = Vec::new();
        let mut heavy = Vec::new();
        for expr in plan.conditions.iter().cloned().flat_map(Expr::into_conjuncts) {
            if is_light(&expr, scope)? {
                light.push(expr);
            } else {
                heavy.push(expr);
            }
        }

        Ok(Self {
            plan,
            shape,
            fields,
            light,
            heavy,
        })
    }

    const fn is_rows(&self) -> bool {
        matches!(self.shape, Shape::Rows)
    }

    fn conditions(&self) -> impl Iterator<Item = &Expr> {
        self.light.iter().chain(&self.heavy)
    }
}

// Requested fields plus whatever the toggles need.
fn selection(
    plan: &CallsQuery,
    scope: &Scope<'_>,
) -> Result<Vec<&'static FieldDescriptor>, ValidateError> {
    let mut fields = resolve_selection(&plan.fields, scope.fields)?;
    let toggles = plan.toggles;
    let implied = [
        ("storage_size_bytes", toggles.include_storage_size),
        ("total_storage_size_bytes", toggles.include_total_storage_size),
        ("summary", toggles.include_costs),
    ];

    for (name, on) in implied {
        if !on || fields.iter().any(|field| field.name == name) {
            continue;
        }
        let field = scope
            .fields
            .get(name)
            .ok_or_else(|| ValidateError::UnknownField {
                field: name.to_string(),
            })?;
        fields.push(field);
    }

    Ok(fields)
}

///
/// Body
///
/// The main SELECT before cost or count wrapping.
///

struct Body {
    select: SelectQuery,
    ctes: Vec<Cte>,
    keys: Vec<SortKey>,
}

// ----------------------------------------------------------------------
// Merged / complete
// ----------------------------------------------------------------------

fn table_body(
    request: &Request<'_>,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<Body, CompileError> {
    let plan = request.plan;
    let columns = select_columns(&request.fields, variant, scope, state)?;
    let terms = if request.is_rows() {
        compile_order(&plan.order, variant, scope, state)?
    } else {
        Vec::new()
    };
    let keys: Vec<SortKey> = terms.iter().flat_map(|term| term.keys.clone()).collect();

    let hardcoded = compile_filter(&plan.filter, variant, scope, state)?;
    let light = compile_all(&request.light, variant, scope, state)?;
    let heavy = compile_all(&request.heavy, variant, scope, state)?;
    let light_prefilters = prefilters(&request.light, variant, scope, state);
    let heavy_prefilters = prefilters(&request.heavy, variant, scope, state);
    let live = live_call_filters(variant, scope.fields, scope.include_deleted, &mut state.params);

    let pushdown_plan = PushdownInput {
        selects_heavy: request.fields.iter().any(|field| field.is_heavy()),
        has_light_conditions: !light.is_empty(),
        has_heavy_conditions: !heavy.is_empty(),
        has_hardcoded_filter: !plan.filter.is_empty(),
        order_is_light: terms.iter().all(|term| term.light),
    }
    .plan()
    .filter(|_| request.is_rows());

    let mut ctes = Vec::new();
    let mut main = SelectQuery::from_source(variant.table_name());
    main.columns = columns;
    main.where_.push(project_filter(variant, state));

    let mut paginated = false;
    if let Some(pushdown_plan) = pushdown_plan {
        state.passes.pushdown = true;
        paginated = pushdown_plan.paginate;
        debug!(
            table = variant.kind().label(),
            light_conditions = light.len(),
            paginate = paginated,
            operator = "PredicatePushdown",
            "pushing light predicates into filtered_calls"
        );

        let mut narrow = SelectQuery::from_source(variant.table_name());
        narrow.where_.push(project_filter(variant, state));
        narrow.where_.extend(hardcoded.pre);
        narrow.having.extend(hardcoded.post);
        place_all(&mut narrow, &light);
        narrow.where_.extend(light_prefilters);
        place_live(&mut narrow, variant, &live);
        narrow.group_by = variant.group_by_clause();
        if paginated {
            narrow.order_by = keys.iter().map(SortKey::render).collect();
            narrow.limit = plan.limit;
            narrow.offset = plan.offset;
        }

        ctes.push(pushdown::filtered_calls(variant, narrow));
        main.where_.push(pushdown::id_membership(variant));
    } else {
        main.where_.extend(hardcoded.pre);
        main.having.extend(hardcoded.post);
        place_all(&mut main, &light);
        main.where_.extend(light_prefilters);
    }

    place_all(&mut main, &heavy);
    main.where_.extend(heavy_prefilters);
    place_live(&mut main, variant, &live);
    main.group_by = variant.group_by_clause();
    main.joins = joins(variant, state);
    main.order_by = keys.iter().map(SortKey::render).collect();
    if request.is_rows() && !paginated {
        main.limit = plan.limit;
        main.offset = plan.offset;
    }

    Ok(Body {
        select: main,
        ctes,
        keys,
    })
}

// ----------------------------------------------------------------------
// Starts union
// ----------------------------------------------------------------------

// `running_calls` holds the ids selected from each row source; the main
// query reads full rows for those ids from the derived `calls_running`.
fn running_body(
    request: &Request<'_>,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<Body, CompileError> {
    let plan = request.plan;

    let mut branches = Vec::new();
    for source in RunningCalls::sources() {
        branches.push(running_branch(request, source, scope, state)?.render());
    }
    debug!(
        branches = branches.len(),
        operator = "StartsUnion",
        "unioning complete and in-flight call ids"
    );
    let running = Cte::new(RUNNING_CALLS, union_all(&branches));

    let columns = select_columns(&request.fields, variant, scope, state)?;
    let keys: Vec<SortKey> = if request.is_rows() {
        compile_order(&plan.order, variant, scope, state)?
            .into_iter()
            .flat_map(|term| term.keys)
            .collect()
    } else {
        Vec::new()
    };

    let mut main = SelectQuery::from_source(format!(
        "(\n{}\n) AS {}",
        union_all(&running_rows(scope, state)),
        variant.table_name()
    ));
    main.columns = columns;
    main.joins = joins(variant, state);
    main.order_by = keys.iter().map(SortKey::render).collect();
    if request.is_rows() {
        main.limit = plan.limit;
        main.offset = plan.offset;
    }

    Ok(Body {
        select: main,
        ctes: vec![running],
        keys,
    })
}

// Ids from one row source, filtered, ordered and limited on their own.
// Each branch gets its own joins.
fn running_branch(
    request: &Request<'_>,
    source: &FlatCalls,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<SelectQuery, CompileError> {
    let plan = request.plan;
    state.feedback = FeedbackJoin::default();
    state.storage = StorageJoins::default();

    let conditions: Vec<Expr> = request.conditions().cloned().collect();
    let keys: Vec<String> = if request.is_rows() {
        compile_order(&plan.order, source, scope, state)?
            .iter()
            .flat_map(|term| term.keys.iter().map(SortKey::render))
            .collect()
    } else {
        Vec::new()
    };
    let hardcoded = compile_filter(&plan.filter, source, scope, state)?;
    let compiled = compile_all(&conditions, source, scope, state)?;
    let prefiltered = prefilters(&conditions, source, scope, state);
    let live = live_call_filters(source, scope.fields, scope.include_deleted, &mut state.params);

    let mut select = SelectQuery::from_source(source.table_name());
    select.columns = vec![format!("{} AS id", source.column_ref("id"))];
    select.where_.push(project_filter(source, state));
    select.where_.extend(hardcoded.pre);
    place_all(&mut select, &compiled);
    select.where_.extend(prefiltered);
    place_live(&mut select, source, &live);
    select.where_.extend(not_completed(source, state));
    select.joins = joins(source, state);
    state.feedback = FeedbackJoin::default();
    state.storage = StorageJoins::default();

    if request.is_rows() {
        select.order_by = keys;
        select.limit = plan
            .limit
            .map(|limit| limit.saturating_add(plan.offset.unwrap_or(0)));
    }

    Ok(select)
}

// Full physical rows for the selected ids; in-flight rows read their
// end-of-call columns as sentinels.
fn running_rows(scope: &Scope<'_>, state: &CompileState) -> Vec<String> {
    RunningCalls::sources()
        .into_iter()
        .map(|source| {
            let mut select = SelectQuery::from_source(source.table_name());
            select.columns = scope
                .fields
                .physical()
                .map(|field| format!("{} AS {}", source.field_column(field), alias(field.column)))
                .collect();
            select.where_ = vec![
                project_filter(source, state),
                format!(
                    "{} IN (SELECT id FROM {RUNNING_CALLS})",
                    source.column_ref("id")
                ),
            ];
            select.where_.extend(not_completed(source, state));
            select.render()
        })
        .collect()
}

// Start rows of calls that already finished are shadowed by their complete row.
fn not_completed(source: &FlatCalls, state: &CompileState) -> Option<String> {
    let complete = &FlatCalls::COMPLETE;
    if source.table_name() == complete.table_name() {
        return None;
    }

    Some(format!(
        "{} NOT IN (SELECT {} FROM {} WHERE {} = {})",
        source.column_ref("id"),
        complete.column_ref("id"),
        complete.table_name(),
        complete.column_ref("project_id"),
        state.project,
    ))
}

// ----------------------------------------------------------------------
// Shared pieces
// ----------------------------------------------------------------------

fn project_filter(variant: &dyn TableVariant, state: &CompileState) -> String {
    format!("{} = {}", variant.column_ref("project_id"), state.project)
}

fn compile_all(
    conditions: &[Expr],
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Result<Vec<CompiledCondition>, CompileError> {
    conditions
        .iter()
        .map(|expr| ConditionCompiler::new(scope, variant, state).compile(expr))
        .collect()
}

// Conditions over reconciled values run after grouping.
fn place_all(select: &mut SelectQuery, conditions: &[CompiledCondition]) {
    for condition in conditions {
        if condition.aggregated {
            select.having.push(condition.sql.clone());
        } else {
            select.where_.push(condition.sql.clone());
        }
    }
}

fn place_live(select: &mut SelectQuery, variant: &dyn TableVariant, live: &[String]) {
    match variant.placement() {
        Placement::Where => select.where_.extend_from_slice(live),
        Placement::Having => select.having.extend_from_slice(live),
    }
}

fn joins(variant: &dyn TableVariant, state: &mut CompileState) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(join) = state
        .feedback
        .join_clause(variant, &state.project, &mut state.params)
    {
        out.push(join);
    }
    out.extend(state.storage.joins(variant, &state.project));

    out
}

// `all_calls` must expose what the cost chain reads plus the sort keys.
fn carry_cost_columns(
    mut select: SelectQuery,
    request: &Request<'_>,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    keys: &[SortKey],
) -> SelectQuery {
    if !request.fields.iter().any(|field| field.name == "started_at")
        && let Some(started_at) = scope.fields.get("started_at")
    {
        select
            .columns
            .push(format!("{} AS started_at", variant.field_expr(started_at)));
    }
    for (index, key) in keys.iter().enumerate() {
        select
            .columns
            .push(format!("{} AS {}", key.expr, cost::order_key(index)));
    }

    select
}

fn count_select(mut inner: SelectQuery) -> SelectQuery {
    let ctes = inner.take_ctes();
    let mut outer = SelectQuery::from_source(format!("(\n{}\n)", inner.render()));
    outer.ctes = ctes;
    outer.columns = vec!["count() AS count".to_string()];

    outer
}
