//! Predicate pushdown into the `filtered_calls` CTE.
//!
//! When heavy columns are selected, the light part of the filter narrows
//! the id set first so JSON dumps are only read for surviving calls.

use crate::{
    model::TableVariant,
    query::assemble::{Cte, SelectQuery},
};

pub(crate) const FILTERED_CALLS: &str = "filtered_calls";

///
/// PushdownPlan
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PushdownPlan {
    /// ORDER BY and LIMIT/OFFSET run inside the CTE.
    pub(crate) paginate: bool,
}

///
/// PushdownInput
///
/// Shape of the request as seen by the pushdown decision.
///

#[derive(Clone, Copy, Debug, Default)]
#[expect(clippy::struct_excessive_bools)]
pub(crate) struct PushdownInput {
    pub(crate) selects_heavy: bool,
    pub(crate) has_light_conditions: bool,
    pub(crate) has_heavy_conditions: bool,
    pub(crate) has_hardcoded_filter: bool,
    pub(crate) order_is_light: bool,
}

impl PushdownInput {
    pub(crate) const fn plan(self) -> Option<PushdownPlan> {
        if !self.selects_heavy || !(self.has_light_conditions || self.has_hardcoded_filter) {
            return None;
        }

        Some(PushdownPlan {
            paginate: !self.has_heavy_conditions && self.order_is_light,
        })
    }
}

/// `id` restriction placed on the main query.
pub(crate) fn id_membership(variant: &dyn TableVariant) -> String {
    format!(
        "{} IN (SELECT id FROM {FILTERED_CALLS})",
        variant.column_ref("id")
    )
}

/// Wrap a light-only select as the `filtered_calls` CTE, projecting ids.
pub(crate) fn filtered_calls(variant: &dyn TableVariant, mut select: SelectQuery) -> Cte {
    select.columns = vec![format!("{} AS id", variant.column_ref("id"))];

    Cte::new(FILTERED_CALLS, select.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableKind;

    fn input() -> PushdownInput {
        PushdownInput {
            selects_heavy: true,
            has_light_conditions: true,
            order_is_light: true,
            ..PushdownInput::default()
        }
    }

    #[test]
    fn needs_heavy_selection_and_a_light_predicate() {
        assert_eq!(input().plan(), Some(PushdownPlan { paginate: true }));
        assert_eq!(
            PushdownInput {
                selects_heavy: false,
                ..input()
            }
            .plan(),
            None
        );
        assert_eq!(
            PushdownInput {
                has_light_conditions: false,
                ..input()
            }
            .plan(),
            None
        );
        assert!(
            PushdownInput {
                has_light_conditions: false,
                has_hardcoded_filter: true,
                ..input()
            }
            .plan()
            .is_some()
        );
    }

    #[test]
    fn pagination_stays_outside_when_anything_is_heavy() {
        let heavy_condition = PushdownInput {
            has_heavy_conditions: true,
            ..input()
        };
        let heavy_order = PushdownInput {
            order_is_light: false,
            ..input()
        };

        assert_eq!(heavy_condition.plan(), Some(PushdownPlan { paginate: false }));
        assert_eq!(heavy_order.plan(), Some(PushdownPlan { paginate: false }));
    }

    #[test]
    fn cte_projects_ids_only() {
        let variant = TableKind::Merged.variant();
        let mut select = SelectQuery::from_source("calls_merged");
        select.columns = vec!["ignored".to_string()];
        select.where_ = vec!["calls_merged.project_id = {pb_0:String}".to_string()];
        select.group_by = variant.group_by_clause();

        let cte = filtered_calls(variant, select);
        assert_eq!(cte.name, "filtered_calls");
        assert_eq!(
            cte.body,
            "SELECT calls_merged.id AS id\nFROM calls_merged\nWHERE calls_merged.project_id = {pb_0:String}\nGROUP BY (calls_merged.project_id, calls_merged.id)"
        );
        assert_eq!(
            id_membership(variant),
            "calls_merged.id IN (SELECT id FROM filtered_calls)"
        );
    }
}
