//! Datetime range pruning on the id-derived sort key.
//!
//! Every physical row carries `sortable_datetime`, the creation instant
//! embedded in the call id. A call starts within the safety margin of that
//! instant, so an epoch bound on `started_at` (or an upper bound on
//! `ended_at`, which never precedes `started_at`) widened by the margin is a
//! safe bound on the sort key.

use crate::{
    model::TableVariant,
    param::ParamType,
    query::{
        condition::{CmpOp, field_literal},
        expr::Expr,
        optimize::superset_predicate,
        state::{CompileState, Scope},
    },
};
use time::{
    OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description,
};

const SORT_KEY_COLUMN: &str = "sortable_datetime";
const SORT_KEY_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

///
/// Bound
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Bound {
    Lower,
    Upper,
}

/// Superset sort-key predicate for `condition`, if any part of it qualifies.
pub(crate) fn sort_key_prefilter(
    condition: &Expr,
    variant: &dyn TableVariant,
    scope: &Scope<'_>,
    state: &mut CompileState,
) -> Option<String> {
    let margin = scope.config.datetime_margin_secs;
    let params = &mut state.params;
    let column = variant.column_ref(SORT_KEY_COLUMN);

    superset_predicate(condition, false, &mut |leaf, negated| {
        let (bound, epoch) = leaf_bound(leaf, negated)?;
        let (symbol, shifted) = match bound {
            Bound::Lower => (">=", epoch - margin_f64(margin)),
            Bound::Upper => ("<=", epoch + margin_f64(margin)),
        };
        let text = format_sort_key(shifted)?;

        Some(format!(
            "{column} {symbol} {}",
            params.add(text, ParamType::String)
        ))
    })
}

// Bound implied on the sort key by one comparison leaf, with its epoch.
fn leaf_bound(leaf: &Expr, negated: bool) -> Option<(Bound, f64)> {
    let (op, lhs, rhs) = CmpOp::of(leaf)?;
    let (path, literal, op) = field_literal(op, lhs, rhs)?;
    let epoch = literal.as_f64()?;
    let op = if negated { op.negate()? } else { op };

    let bound = match op {
        CmpOp::Gt | CmpOp::Gte => Bound::Lower,
        CmpOp::Lt | CmpOp::Lte => Bound::Upper,
        CmpOp::Eq => return None,
    };

    match (path, bound) {
        ("started_at", _) | ("ended_at", Bound::Upper) => Some((bound, epoch)),
        _ => None,
    }
}

#[expect(clippy::cast_precision_loss)]
const fn margin_f64(secs: i64) -> f64 {
    secs as f64
}

/// `YYYY-MM-DD HH:MM:SS.ffffff` (UTC) for epoch seconds.
#[expect(clippy::cast_possible_truncation)]
pub(crate) fn format_sort_key(epoch_secs: f64) -> Option<String> {
    if !epoch_secs.is_finite() {
        return None;
    }
    let micros = (epoch_secs * 1_000_000.0).round() as i128;
    let instant = OffsetDateTime::from_unix_timestamp_nanos(micros * 1_000).ok()?;

    format_timestamp(instant)
}

/// `instant` in UTC as `YYYY-MM-DD HH:MM:SS.ffffff`.
pub(crate) fn format_timestamp(instant: OffsetDateTime) -> Option<String> {
    instant
        .checked_to_offset(UtcOffset::UTC)?
        .format(SORT_KEY_FORMAT)
        .ok()
}
