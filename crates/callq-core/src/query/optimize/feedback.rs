//! Feedback join: pivots the feedback table so each referenced feedback type
//! becomes one payload column keyed by the call's internal ref.

use crate::{
    model::TableVariant,
    param::{ParamBuilder, ParamType},
    query::{json::json_value, path::FeedbackPath},
};
use std::fmt::Write as _;

pub(crate) const FEEDBACK_ALIAS: &str = "feedback";

///
/// FeedbackJoin
///
/// Feedback types referenced so far, in first-use order. Slot `n` maps to
/// the pivot column `payload_dump_n`.
///

#[derive(Debug, Default)]
pub(crate) struct FeedbackJoin {
    types: Vec<String>,
}

impl FeedbackJoin {
    pub(crate) const fn is_used(&self) -> bool {
        !self.types.is_empty()
    }

    fn slot(&mut self, feedback_type: &str) -> usize {
        if let Some(index) = self.types.iter().position(|t| t == feedback_type) {
            return index;
        }
        self.types.push(feedback_type.to_string());
        self.types.len() - 1
    }

    /// Text value at the feedback payload path for the current call.
    pub(crate) fn payload_value(
        &mut self,
        variant: &dyn TableVariant,
        path: &FeedbackPath,
        params: &mut ParamBuilder,
    ) -> String {
        let slot = self.slot(&path.feedback_type);
        let column = variant.aggregate_any(format!("{FEEDBACK_ALIAS}.payload_dump_{slot}"));

        json_value(&column, &path.path, params)
    }

    /// LEFT JOIN of the pivoted feedback rows, if any type was referenced.
    pub(crate) fn join_clause(
        &self,
        variant: &dyn TableVariant,
        project: &str,
        params: &mut ParamBuilder,
    ) -> Option<String> {
        if !self.is_used() {
            return None;
        }

        let mut pivot = String::from("SELECT feedback.weave_ref AS weave_ref");
        for (slot, feedback_type) in self.types.iter().enumerate() {
            let ty = params.add(feedback_type.as_str(), ParamType::String);
            let _ = write!(
                pivot,
                ", argMaxIf(feedback.payload_dump, feedback.created_at, feedback.feedback_type = {ty}) AS payload_dump_{slot}"
            );
        }
        let _ = write!(
            pivot,
            " FROM feedback WHERE feedback.project_id = {project} GROUP BY feedback.weave_ref"
        );

        Some(format!(
            "LEFT JOIN ({pivot}) AS {FEEDBACK_ALIAS} ON {FEEDBACK_ALIAS}.weave_ref = {}",
            call_ref(variant)
        ))
    }
}

/// Internal ref string feedback rows use to point at a call.
pub(crate) fn call_ref(variant: &dyn TableVariant) -> String {
    format!(
        "concat('weave-trace-internal:///', {}, '/call/', {})",
        variant.column_ref("project_id"),
        variant.column_ref("id")
    )
}
