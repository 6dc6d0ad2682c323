//! Module: query::condition
//! Responsibility: compile an `Expr` tree into one boolean SQL fragment.
//! Does not own: clause placement or pre-filter generation.
//! Boundary: every literal is bound through the shared `ParamBuilder`.

use crate::{
    error::CompileError,
    model::{FieldDescriptor, TableVariant, field::ColumnType},
    param::{ParamBuilder, ParamType},
    query::{
        expr::{CastTo, Expr},
        json::{json_is_absent, json_is_present, json_value},
        path::{ObjectRefPath, ResolveError, ResolvedField, resolve},
        select::field_value,
        state::{CompileState, Scope},
        validate::ValidateError,
    },
    value::Value,
};

///
/// CmpOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    pub(crate) const fn wire_name(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }

    /// Operator after swapping operands.
    pub(crate) const fn flip(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
        }
    }

    /// Logical complement, where one exists as a single comparison.
    pub(crate) const fn negate(self) -> Option<Self> {
        match self {
            Self::Eq => None,
            Self::Gt => Some(Self::Lte),
            Self::Gte => Some(Self::Lt),
            Self::Lt => Some(Self::Gte),
            Self::Lte => Some(Self::Gt),
        }
    }

    /// Split a comparison node into its operator and operands.
    pub(crate) fn of(expr: &Expr) -> Option<(Self, &Expr, &Expr)> {
        let (op, lhs, rhs) = match expr {
            Expr::Eq(l, r) => (Self::Eq, l, r),
            Expr::Gt(l, r) => (Self::Gt, l, r),
            Expr::Gte(l, r) => (Self::Gte, l, r),
            Expr::Lt(l, r) => (Self::Lt, l, r),
            Expr::Lte(l, r) => (Self::Lte, l, r),
            _ => return None,
        };

        Some((op, lhs.as_ref(), rhs.as_ref()))
    }
}

/// `(path, literal, op)` with the field on the left, for `field op literal`
/// or `literal op field`.
pub(crate) fn field_literal<'e>(
    op: CmpOp,
    lhs: &'e Expr,
    rhs: &'e Expr,
) -> Option<(&'e str, &'e Value, CmpOp)> {
    match (lhs, rhs) {
        (Expr::GetField(path), Expr::Literal(value)) => Some((path, value, op)),
        (Expr::Literal(value), Expr::GetField(path)) => Some((path, value, op.flip())),
        _ => None,
    }
}

///
/// LeafOp
///
/// Operation applied to one extracted value against literal operands.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum LeafOp<'v> {
    Compare(CmpOp, &'v Value),
    In(&'v [Value]),
    Contains {
        substr: &'v str,
        case_insensitive: bool,
    },
    Exists,
}

impl LeafOp<'_> {
    const fn wire_name(&self) -> &'static str {
        match self {
            Self::Compare(op, _) => op.wire_name(),
            Self::In(_) => "$in",
            Self::Contains { .. } => "$contains",
            Self::Exists => "$convert",
        }
    }
}

///
/// CompiledCondition
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CompiledCondition {
    pub(crate) sql: String,
    /// Reads native columns only.
    pub(crate) light: bool,
    /// References reconciled (aggregated) values; must be placed after GROUP BY.
    pub(crate) aggregated: bool,
}

impl CompiledCondition {
    const fn constant(sql: String) -> Self {
        Self {
            sql,
            light: true,
            aggregated: false,
        }
    }
}

///
/// Operand
///

#[derive(Debug)]
struct Operand {
    kind: OperandKind,
    light: bool,
    aggregated: bool,
}

#[derive(Debug)]
enum OperandKind {
    Column {
        field: &'static FieldDescriptor,
        sql: String,
    },
    /// Text extracted from a JSON document.
    Json { sql: String, label: String },
    ObjectRef {
        path: ObjectRefPath,
        cast: Option<CastTo>,
        label: String,
    },
    Cast {
        source: String,
        to: CastTo,
        field: Option<&'static FieldDescriptor>,
        label: String,
    },
    Literal(Value),
}

impl OperandKind {
    /// Plain SQL value, where the operand has one.
    fn value_sql(&self) -> Option<String> {
        match self {
            Self::Column { sql, .. } | Self::Json { sql, .. } => Some(sql.clone()),
            Self::Cast { source, to, .. } => Some(cast_expr(source, *to)),
            Self::ObjectRef { .. } | Self::Literal(_) => None,
        }
    }
}

///
/// ConditionCompiler
///
/// Compiles conditions against one table variant.
///

pub(crate) struct ConditionCompiler<'s, 'a> {
    scope: &'s Scope<'a>,
    variant: &'s dyn TableVariant,
    state: &'s mut CompileState,
}

impl<'s, 'a> ConditionCompiler<'s, 'a> {
    pub(crate) fn new(
        scope: &'s Scope<'a>,
        variant: &'s dyn TableVariant,
        state: &'s mut CompileState,
    ) -> Self {
        Self {
            scope,
            variant,
            state,
        }
    }

    pub(crate) fn compile(&mut self, expr: &Expr) -> Result<CompiledCondition, CompileError> {
        match expr {
            Expr::And(parts) => self.combine(parts, " AND ", "1"),
            Expr::Or(parts) => self.combine(parts, " OR ", "0"),
            Expr::Not(inner) => {
                let inner = self.compile(inner)?;
                Ok(CompiledCondition {
                    sql: format!("NOT ({})", inner.sql),
                    ..inner
                })
            }
            Expr::In(input, items) => self.membership(input, items),
            Expr::Contains {
                input,
                substr,
                case_insensitive,
            } => self.contains(input, substr, *case_insensitive),
            Expr::Convert {
                input,
                to: CastTo::Exists,
            } => {
                let operand = self.operand(input)?;
                self.leaf(operand, &LeafOp::Exists)
            }
            Expr::GetField(_) | Expr::Literal(_) | Expr::Convert { .. } => Err(
                ResolveError::unsupported("condition", "expression is not a predicate").into(),
            ),
            _ => {
                let Some((op, lhs, rhs)) = CmpOp::of(expr) else {
                    return Err(ResolveError::unsupported("condition", "unknown node").into());
                };
                self.compare(op, lhs, rhs)
            }
        }
    }

    fn combine(
        &mut self,
        parts: &[Expr],
        sep: &str,
        empty: &str,
    ) -> Result<CompiledCondition, CompileError> {
        if parts.is_empty() {
            return Ok(CompiledCondition::constant(empty.to_string()));
        }

        let mut sql = Vec::with_capacity(parts.len());
        let mut light = true;
        let mut aggregated = false;
        for part in parts {
            let part = self.compile(part)?;
            light &= part.light;
            aggregated |= part.aggregated;
            sql.push(part.sql);
        }

        let sql = if sql.len() == 1 {
            sql.remove(0)
        } else {
            format!("({})", sql.join(sep))
        };

        Ok(CompiledCondition {
            sql,
            light,
            aggregated,
        })
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    fn compare(
        &mut self,
        op: CmpOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<CompiledCondition, CompileError> {
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;

        match (lhs.kind, rhs.kind) {
            (OperandKind::Literal(_), OperandKind::Literal(_)) => {
                Err(ResolveError::unsupported(op.wire_name(), "both operands are literals").into())
            }
            (kind, OperandKind::Literal(value)) => {
                let operand = Operand { kind, ..lhs };
                self.leaf(operand, &LeafOp::Compare(op, &value))
            }
            (OperandKind::Literal(value), kind) => {
                let operand = Operand { kind, ..rhs };
                self.leaf(operand, &LeafOp::Compare(op.flip(), &value))
            }
            (left, right) => {
                let (Some(l), Some(r)) = (left.value_sql(), right.value_sql()) else {
                    return Err(ResolveError::unsupported(
                        op.wire_name(),
                        "object reference paths compare only against literals",
                    )
                    .into());
                };
                Ok(CompiledCondition {
                    sql: format!("{l} {} {r}", op.symbol()),
                    light: lhs.light && rhs.light,
                    aggregated: lhs.aggregated || rhs.aggregated,
                })
            }
        }
    }

    fn membership(&mut self, input: &Expr, items: &[Expr]) -> Result<CompiledCondition, CompileError> {
        let operand = self.operand(input)?;
        let values = items
            .iter()
            .map(|item| match item {
                Expr::Literal(value) if !value.is_null() => Ok(value.clone()),
                _ => Err(ResolveError::unsupported(
                    "$in",
                    "list items must be non-null literals",
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.leaf(operand, &LeafOp::In(&values))
    }

    fn contains(
        &mut self,
        input: &Expr,
        substr: &Expr,
        case_insensitive: bool,
    ) -> Result<CompiledCondition, CompileError> {
        let operand = self.operand(input)?;
        let Expr::Literal(Value::Text(substr)) = substr else {
            return Err(ResolveError::unsupported("$contains", "substring must be a text literal").into());
        };

        self.leaf(
            operand,
            &LeafOp::Contains {
                substr,
                case_insensitive,
            },
        )
    }

    fn leaf(&mut self, operand: Operand, op: &LeafOp<'_>) -> Result<CompiledCondition, CompileError> {
        let params = &mut self.state.params;
        let sql = match operand.kind {
            OperandKind::Column { field, sql } => {
                column_predicate(self.variant, field, &sql, op, params)?
            }
            OperandKind::Json { sql, label } => json_predicate(&sql, None, op, &label, params)?,
            OperandKind::Cast {
                source,
                to,
                field,
                label,
            } => match (to, field) {
                (CastTo::Exists, Some(field)) => {
                    exists_predicate(self.variant.null_check(field, true, params), op)?
                }
                _ => json_predicate(&source, Some(to), op, &label, params)?,
            },
            OperandKind::ObjectRef { path, cast, label } => {
                let call_doc = self.variant.field_expr(path.root);
                let state = &mut *self.state;
                state.passes.object_refs = true;
                state.object_refs.condition(
                    &call_doc,
                    &path,
                    cast,
                    op,
                    &label,
                    &mut state.params,
                    &state.project,
                )?
            }
            OperandKind::Literal(_) => {
                return Err(ResolveError::unsupported(op.wire_name(), "literal operand").into());
            }
        };

        Ok(CompiledCondition {
            sql,
            light: operand.light,
            aggregated: operand.aggregated,
        })
    }

    // ------------------------------------------------------------------
    // Operands
    // ------------------------------------------------------------------

    fn operand(&mut self, expr: &Expr) -> Result<Operand, CompileError> {
        let operand = match expr {
            Expr::Literal(value) => Operand {
                kind: OperandKind::Literal(value.clone()),
                light: true,
                aggregated: false,
            },
            Expr::GetField(path) => self.field_operand(path)?,
            Expr::Convert { input, to } => {
                let inner = self.operand(input)?;
                let kind = match inner.kind {
                    OperandKind::Literal(_) => {
                        return Err(ResolveError::unsupported("$convert", "literal input").into());
                    }
                    OperandKind::ObjectRef {
                        path,
                        cast: None,
                        label,
                    } => OperandKind::ObjectRef {
                        path,
                        cast: Some(*to),
                        label,
                    },
                    OperandKind::ObjectRef { .. } => {
                        return Err(ResolveError::unsupported("$convert", "nested conversion").into());
                    }
                    OperandKind::Column { field, sql } => OperandKind::Cast {
                        source: text_of_column(field, &sql),
                        to: *to,
                        field: Some(field),
                        label: field.name.to_string(),
                    },
                    OperandKind::Json { sql, label } => OperandKind::Cast {
                        source: sql,
                        to: *to,
                        field: None,
                        label,
                    },
                    OperandKind::Cast {
                        source,
                        to: prev,
                        label,
                        ..
                    } => OperandKind::Cast {
                        source: format!("toString({})", cast_expr(&source, prev)),
                        to: *to,
                        field: None,
                        label,
                    },
                };
                Operand { kind, ..inner }
            }
            _ => {
                return Err(
                    ResolveError::unsupported("operand", "conditions cannot be used as values").into(),
                );
            }
        };

        Ok(Operand {
            aggregated: operand.aggregated && self.variant.is_aggregated(),
            ..operand
        })
    }

    fn field_operand(&mut self, path: &str) -> Result<Operand, CompileError> {
        let resolved = resolve(path, self.scope.fields, &self.scope.expand)?;
        let aggregated = self.variant.is_aggregated();
        let params = &mut self.state.params;

        let operand = match resolved {
            ResolvedField::Column(field) => {
                if !field.filterable {
                    return Err(ValidateError::FieldNotFilterable {
                        field: field.name.to_string(),
                    }
                    .into());
                }
                let sql = field_value(field, self.variant, self.scope, self.state)?;
                Operand {
                    aggregated: field.requires_aggregation() || field.synthetic_kind().is_some(),
                    kind: OperandKind::Column { field, sql },
                    light: true,
                }
            }
            ResolvedField::Json { field, path: json } => Operand {
                kind: OperandKind::Json {
                    sql: json_value(&self.variant.field_expr(field), &json, params),
                    label: path.to_string(),
                },
                light: false,
                aggregated,
            },
            ResolvedField::Feedback(feedback) => {
                let state = &mut *self.state;
                state.passes.feedback_join = true;
                Operand {
                    kind: OperandKind::Json {
                        sql: state
                            .feedback
                            .payload_value(self.variant, &feedback, &mut state.params),
                        label: path.to_string(),
                    },
                    light: false,
                    aggregated,
                }
            }
            ResolvedField::ObjectRef(reference) => Operand {
                kind: OperandKind::ObjectRef {
                    path: reference,
                    cast: None,
                    label: path.to_string(),
                },
                light: false,
                aggregated,
            },
        };

        Ok(operand)
    }
}

/// Whether every field referenced by `expr` is light; resolves (and so
/// validates) every path on the way.
pub(crate) fn is_light(expr: &Expr, scope: &Scope<'_>) -> Result<bool, CompileError> {
    Ok(match expr {
        Expr::GetField(path) => resolve(path, scope.fields, &scope.expand)?.is_light(),
        Expr::Literal(_) => true,
        Expr::Not(inner) => is_light(inner, scope)?,
        Expr::Convert { input, .. } => is_light(input, scope)?,
        Expr::Contains { input, substr, .. } => is_light(input, scope)? && is_light(substr, scope)?,
        Expr::In(input, items) => {
            let mut light = is_light(input, scope)?;
            for item in items {
                light &= is_light(item, scope)?;
            }
            light
        }
        Expr::And(parts) | Expr::Or(parts) => {
            let mut light = true;
            for part in parts {
                light &= is_light(part, scope)?;
            }
            light
        }
        Expr::Eq(l, r) | Expr::Gt(l, r) | Expr::Gte(l, r) | Expr::Lt(l, r) | Expr::Lte(l, r) => {
            is_light(l, scope)? && is_light(r, scope)?
        }
    })
}

// ----------------------------------------------------------------------
// Leaf rendering
// ----------------------------------------------------------------------

fn text_of_column(field: &FieldDescriptor, sql: &str) -> String {
    match field.column_type {
        ColumnType::Text | ColumnType::Json => sql.to_string(),
        _ => format!("toString({sql})"),
    }
}

fn cast_expr(value: &str, to: CastTo) -> String {
    match to {
        CastTo::Double => format!("toFloat64OrNull({value})"),
        CastTo::Int => format!("toInt64OrNull({value})"),
        CastTo::Bool => format!("accurateCastOrNull({value}, 'Bool')"),
        CastTo::String => format!("toString({value})"),
        CastTo::Exists => json_is_present(value),
    }
}

fn bind(params: &mut ParamBuilder, value: &Value, ty: ParamType) -> String {
    params.add(value.clone(), ty)
}

fn bind_list(params: &mut ParamBuilder, values: &[Value], ty: ParamType) -> String {
    params.add(Value::List(values.to_vec()), ParamType::array_of(ty))
}

fn position(value: &str, substr: &str, case_insensitive: bool, params: &mut ParamBuilder) -> String {
    let needle = params.add(substr, ParamType::String);
    if case_insensitive {
        format!("positionCaseInsensitive({value}, {needle}) > 0")
    } else {
        format!("position({value}, {needle}) > 0")
    }
}

fn invalid_literal(label: &str, expected: &'static str, found: &Value) -> ResolveError {
    ResolveError::InvalidLiteral {
        field: label.to_string(),
        expected,
        found: found.kind_name(),
    }
}

/// Element type shared by every item of an `$in` list.
fn list_kind(label: &str, values: &[Value]) -> Result<Option<ParamType>, ResolveError> {
    let Some(first) = values.first() else {
        return Ok(None);
    };
    let kind = |value: &Value| match value {
        Value::Text(_) => Some(ParamType::String),
        Value::Int(_) | Value::Float(_) => Some(ParamType::Float64),
        Value::Bool(_) => Some(ParamType::Bool),
        Value::Null | Value::List(_) => None,
    };

    let expected = kind(first).ok_or_else(|| invalid_literal(label, "scalar", first))?;
    for value in values {
        if kind(value).as_ref() != Some(&expected) {
            return Err(invalid_literal(label, "homogeneous list", value));
        }
    }

    Ok(Some(expected))
}

fn exists_predicate(exists: String, op: &LeafOp<'_>) -> Result<String, ResolveError> {
    match op {
        LeafOp::Exists | LeafOp::Compare(CmpOp::Eq, Value::Bool(true)) => Ok(exists),
        LeafOp::Compare(CmpOp::Eq, Value::Bool(false)) => Ok(format!("NOT ({exists})")),
        _ => Err(ResolveError::unsupported(
            op.wire_name(),
            "existence checks compare only for equality with a boolean",
        )),
    }
}

/// Predicate over a JSON-extracted text value, optionally converted first.
pub(crate) fn json_predicate(
    value: &str,
    cast: Option<CastTo>,
    op: &LeafOp<'_>,
    label: &str,
    params: &mut ParamBuilder,
) -> Result<String, ResolveError> {
    match cast {
        None => raw_json_predicate(value, op, label, params),
        Some(CastTo::Exists) => exists_predicate(json_is_present(value), op),
        Some(to) => typed_predicate(&cast_expr(value, to), to, op, label, params),
    }
}

fn raw_json_predicate(
    value: &str,
    op: &LeafOp<'_>,
    label: &str,
    params: &mut ParamBuilder,
) -> Result<String, ResolveError> {
    match op {
        LeafOp::Compare(CmpOp::Eq, Value::Null) => Ok(json_is_absent(value)),
        LeafOp::Compare(op, literal) => {
            let symbol = op.symbol();
            match literal {
                Value::Text(_) => Ok(format!(
                    "{value} {symbol} {}",
                    bind(params, literal, ParamType::String)
                )),
                Value::Int(_) | Value::Float(_) => Ok(format!(
                    "toFloat64OrNull({value}) {symbol} {}",
                    bind(params, literal, ParamType::Float64)
                )),
                Value::Bool(_) => Ok(format!(
                    "accurateCastOrNull({value}, 'Bool') {symbol} {}",
                    bind(params, literal, ParamType::Bool)
                )),
                Value::Null | Value::List(_) => Err(invalid_literal(label, "scalar", literal)),
            }
        }
        LeafOp::In(values) => match list_kind(label, values)? {
            None => Ok("0".to_string()),
            Some(ParamType::String) => Ok(format!(
                "{value} IN {}",
                bind_list(params, values, ParamType::String)
            )),
            Some(ParamType::Bool) => Ok(format!(
                "accurateCastOrNull({value}, 'Bool') IN {}",
                bind_list(params, values, ParamType::Bool)
            )),
            Some(_) => Ok(format!(
                "toFloat64OrNull({value}) IN {}",
                bind_list(params, values, ParamType::Float64)
            )),
        },
        LeafOp::Contains {
            substr,
            case_insensitive,
        } => Ok(position(value, substr, *case_insensitive, params)),
        LeafOp::Exists => Ok(json_is_present(value)),
    }
}

fn typed_predicate(
    expr: &str,
    to: CastTo,
    op: &LeafOp<'_>,
    label: &str,
    params: &mut ParamBuilder,
) -> Result<String, ResolveError> {
    let literal_type = |literal: &Value| -> Result<ParamType, ResolveError> {
        match (to, literal) {
            (CastTo::Double, Value::Int(_) | Value::Float(_)) | (CastTo::Int, Value::Float(_)) => {
                Ok(ParamType::Float64)
            }
            (CastTo::Int, Value::Int(_)) => Ok(ParamType::Int64),
            (CastTo::Bool, Value::Bool(_)) => Ok(ParamType::Bool),
            (CastTo::String, Value::Text(_)) => Ok(ParamType::String),
            _ => Err(invalid_literal(label, to.label(), literal)),
        }
    };

    match op {
        LeafOp::Compare(CmpOp::Eq, Value::Null) => Ok(format!("{expr} IS NULL")),
        LeafOp::Compare(op, literal) => {
            let ty = literal_type(literal)?;
            Ok(format!("{expr} {} {}", op.symbol(), bind(params, literal, ty)))
        }
        LeafOp::In(values) => {
            let Some(first) = values.first() else {
                return Ok("0".to_string());
            };
            let ty = literal_type(first)?;
            for value in *values {
                if literal_type(value)? != ty {
                    return Err(invalid_literal(label, "homogeneous list", value));
                }
            }
            Ok(format!("{expr} IN {}", bind_list(params, values, ty)))
        }
        LeafOp::Contains {
            substr,
            case_insensitive,
        } if to == CastTo::String => Ok(position(expr, substr, *case_insensitive, params)),
        LeafOp::Contains { .. } => Err(ResolveError::unsupported(
            "$contains",
            format!("cannot search a value converted to {}", to.label()),
        )),
        LeafOp::Exists => Ok(format!("{expr} IS NOT NULL")),
    }
}

/// Predicate over a native or synthetic column.
fn column_predicate(
    variant: &dyn TableVariant,
    field: &FieldDescriptor,
    sql: &str,
    op: &LeafOp<'_>,
    params: &mut ParamBuilder,
) -> Result<String, ResolveError> {
    let label = field.name;
    match op {
        LeafOp::Compare(CmpOp::Eq, Value::Null) | LeafOp::Exists => {
            let negate = matches!(op, LeafOp::Exists);
            if field.synthetic_kind().is_some() {
                let test = if negate { "IS NOT NULL" } else { "IS NULL" };
                Ok(format!("{sql} {test}"))
            } else {
                Ok(variant.null_check(field, negate, params))
            }
        }
        LeafOp::Compare(op, literal) => {
            let symbol = op.symbol();
            let rhs = match (field.column_type, literal) {
                (ColumnType::Text, Value::Text(_)) => bind(params, literal, ParamType::String),
                (ColumnType::DateTime, Value::Int(_) | Value::Float(_)) => format!(
                    "toDateTime64({}, 6)",
                    bind(params, literal, ParamType::Float64)
                ),
                (ColumnType::DateTime, Value::Text(_)) => format!(
                    "parseDateTime64BestEffort({}, 6)",
                    bind(params, literal, ParamType::String)
                ),
                (ColumnType::Int, Value::Int(_)) => bind(params, literal, ParamType::Int64),
                (ColumnType::Int, Value::Float(_)) => bind(params, literal, ParamType::Float64),
                (ColumnType::TextArray | ColumnType::Json, _) => {
                    return Err(ResolveError::unsupported(
                        op.wire_name(),
                        format!("'{label}' cannot be compared"),
                    ));
                }
                (ColumnType::Text, _) => return Err(invalid_literal(label, "text", literal)),
                (ColumnType::DateTime, _) => {
                    return Err(invalid_literal(label, "epoch seconds or datetime text", literal));
                }
                (ColumnType::Int, _) => return Err(invalid_literal(label, "number", literal)),
            };
            Ok(format!("{sql} {symbol} {rhs}"))
        }
        LeafOp::In(values) => {
            if values.is_empty() {
                return Ok("0".to_string());
            }
            let (ty, expected) = match field.column_type {
                ColumnType::Text | ColumnType::TextArray => (ParamType::String, "text"),
                ColumnType::Int => (ParamType::Int64, "integer"),
                ColumnType::DateTime | ColumnType::Json => {
                    return Err(ResolveError::unsupported(
                        "$in",
                        format!("'{label}' does not support membership tests"),
                    ));
                }
            };
            for value in *values {
                let ok = match ty {
                    ParamType::String => matches!(value, Value::Text(_)),
                    _ => matches!(value, Value::Int(_)),
                };
                if !ok {
                    return Err(invalid_literal(label, expected, value));
                }
            }
            let list = bind_list(params, values, ty);
            if field.column_type == ColumnType::TextArray {
                Ok(format!("hasAny({sql}, {list})"))
            } else {
                Ok(format!("{sql} IN {list}"))
            }
        }
        LeafOp::Contains {
            substr,
            case_insensitive,
        } => match field.column_type {
            ColumnType::Text => Ok(position(sql, substr, *case_insensitive, params)),
            _ => Err(ResolveError::unsupported(
                "$contains",
                format!("'{label}' is not a text field"),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CompileConfig,
        model::{FieldRegistry, TableKind},
        query::{expr::field, path::ExpandColumns},
    };

    fn compile_on(kind: TableKind, expr: &Expr) -> Result<(CompiledCondition, CompileState), CompileError> {
        let config = CompileConfig::default();
        let scope = Scope {
            fields: FieldRegistry::calls(),
            config: &config,
            expand: ExpandColumns::default(),
            include_deleted: false,
        };
        let mut state = CompileState::new(&config, "proj");
        let compiled = ConditionCompiler::new(&scope, kind.variant(), &mut state).compile(expr)?;

        Ok((compiled, state))
    }

    fn compile(expr: &Expr) -> CompiledCondition {
        compile_on(TableKind::Merged, expr).expect("condition compiles").0
    }

    #[test]
    fn native_equality_binds_literal() {
        let (compiled, state) =
            compile_on(TableKind::Merged, &field("op_name").eq("predict")).expect("compiles");

        assert_eq!(compiled.sql, "any(calls_merged.op_name) = {pb_1:String}");
        assert!(compiled.light);
        assert!(compiled.aggregated);
        assert_eq!(
            state.params.finish().get("pb_1"),
            Some(&Value::Text("predict".to_string()))
        );
    }

    #[test]
    fn grouping_key_conditions_are_not_aggregated() {
        let compiled = compile(&field("id").in_list(["a", "b"]));

        assert_eq!(compiled.sql, "calls_merged.id IN {pb_1:Array(String)}");
        assert!(!compiled.aggregated);
    }

    #[test]
    fn literal_on_the_left_flips_the_operator() {
        let expr = Expr::Gt(
            Box::new(Expr::literal(5)),
            Box::new(Expr::get_field("wb_run_step")),
        );

        assert_eq!(compile(&expr).sql, "any(calls_merged.wb_run_step) < {pb_1:Int64}");
    }

    #[test]
    fn json_leaves_coerce_by_literal_kind() {
        assert_eq!(
            compile(&field("inputs.param.val").eq("hello")).sql,
            "JSON_VALUE(any(calls_merged.inputs_dump), {pb_1:String}) = {pb_2:String}"
        );
        assert_eq!(
            compile(&field("output.score").gt(0.5)).sql,
            "toFloat64OrNull(JSON_VALUE(any(calls_merged.output_dump), {pb_1:String})) > {pb_2:Float64}"
        );
        assert_eq!(
            compile(&field("attributes.flag").eq(true)).sql,
            "accurateCastOrNull(JSON_VALUE(any(calls_merged.attributes_dump), {pb_1:String}), 'Bool') = {pb_2:Bool}"
        );

        let json = compile(&field("inputs.x").eq("a"));
        assert!(!json.light);
        assert!(json.aggregated);
    }

    #[test]
    fn null_literal_compiles_to_variant_null_check() {
        assert_eq!(
            compile(&field("ended_at").is_null()).sql,
            "any(calls_merged.ended_at) IS NULL"
        );

        let (flat, state) =
            compile_on(TableKind::Complete, &field("ended_at").is_null()).expect("compiles");
        assert_eq!(flat.sql, "calls_complete.ended_at = {pb_1:DateTime64(6)}");
        assert!(!flat.aggregated);
        assert_eq!(state.params.len(), 2);

        assert_eq!(
            compile(&field("inputs.x").is_null()).sql,
            "JSON_VALUE(any(calls_merged.inputs_dump), {pb_1:String}) IN ('', 'null')"
        );
    }

    #[test]
    fn datetime_literals_pick_epoch_or_text_parsing() {
        assert_eq!(
            compile(&field("started_at").gte(1_700_000_000)).sql,
            "any(calls_merged.started_at) >= toDateTime64({pb_1:Float64}, 6)"
        );
        assert_eq!(
            compile(&field("started_at").lt("2024-01-01")).sql,
            "any(calls_merged.started_at) < parseDateTime64BestEffort({pb_1:String}, 6)"
        );
    }

    #[test]
    fn conversions_wrap_the_extracted_value() {
        assert_eq!(
            compile(&field("output.n").convert(CastTo::Int).gte(3)).sql,
            "toInt64OrNull(JSON_VALUE(any(calls_merged.output_dump), {pb_1:String})) >= {pb_2:Int64}"
        );
        assert_eq!(
            compile(&field("output.n").convert(CastTo::Exists).into_expr()).sql,
            "JSON_VALUE(any(calls_merged.output_dump), {pb_1:String}) NOT IN ('', 'null')"
        );
        assert_eq!(
            compile(&field("exception").convert(CastTo::Exists).eq(false)).sql,
            "NOT (any(calls_merged.exception) IS NOT NULL)"
        );
    }

    #[test]
    fn logical_nodes_parenthesize_and_propagate_flags() {
        let expr = field("op_name")
            .eq("a")
            .or(Expr::not(field("inputs.x").contains_ci("y")));
        let compiled = compile(&expr);

        assert_eq!(
            compiled.sql,
            "(any(calls_merged.op_name) = {pb_1:String} OR NOT (positionCaseInsensitive(JSON_VALUE(any(calls_merged.inputs_dump), {pb_2:String}), {pb_3:String}) > 0))"
        );
        assert!(!compiled.light);
    }

    #[test]
    fn synthetic_status_is_light_and_filterable() {
        let compiled = compile(&field("summary.weave.status").eq("error"));

        assert!(compiled.light);
        assert!(compiled.sql.starts_with("multiIf("));
        assert!(compiled.sql.ends_with("= {pb_1:String}"));
    }

    #[test]
    fn disallowed_and_malformed_conditions_are_rejected() {
        let not_filterable = compile_on(TableKind::Merged, &field("storage_size_bytes").gt(1));
        assert!(matches!(
            not_filterable,
            Err(CompileError::Validate(ValidateError::FieldNotFilterable { .. }))
        ));

        let unknown = compile_on(TableKind::Merged, &field("nope").eq(1));
        assert!(matches!(
            unknown,
            Err(CompileError::Resolve(ResolveError::UnknownField { .. }))
        ));

        let literal_pair = Expr::Eq(Box::new(Expr::literal(1)), Box::new(Expr::literal(1)));
        let err = compile_on(TableKind::Merged, &literal_pair).expect_err("rejected");
        assert_eq!(err.class(), crate::error::ErrorClass::Unsupported);

        let bad_literal = compile_on(TableKind::Merged, &field("op_name").eq(3));
        assert!(matches!(
            bad_literal,
            Err(CompileError::Resolve(ResolveError::InvalidLiteral { .. }))
        ));
    }

    #[test]
    fn empty_membership_is_false() {
        let expr = Expr::In(Box::new(Expr::get_field("op_name")), Vec::new());

        assert_eq!(compile(&expr).sql, "0");
    }

    #[test]
    fn ref_arrays_use_has_any() {
        assert_eq!(
            compile(&field("input_refs").in_list(["weave:///p/object/a:1"])).sql,
            "hasAny(array_concat_agg(calls_merged.input_refs), {pb_1:Array(String)})"
        );
    }
}
