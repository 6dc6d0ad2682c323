//! Storage-size joins: per-call and per-trace byte totals from the stats
//! tables.

use crate::{
    model::{FieldDescriptor, FieldRegistry, SyntheticKind, TableVariant},
    param::ParamBuilder,
    query::path::ResolveError,
};

const DOC_SIZES: [&str; 4] = [
    "attributes_size_bytes",
    "inputs_size_bytes",
    "output_size_bytes",
    "summary_size_bytes",
];

///
/// StorageJoins
///

#[derive(Debug, Default)]
pub(crate) struct StorageJoins {
    size: bool,
    total: bool,
}

impl StorageJoins {
    pub(crate) const fn is_used(&self) -> bool {
        self.size || self.total
    }

    /// Value expression for a storage field; records the join it needs.
    pub(crate) fn value(
        &mut self,
        kind: SyntheticKind,
        variant: &dyn TableVariant,
        registry: &FieldRegistry,
        params: &mut ParamBuilder,
    ) -> Result<String, ResolveError> {
        let aggregated = variant.is_aggregated();
        match kind {
            SyntheticKind::StorageSize => {
                self.size = true;
                Ok(if aggregated {
                    variant.aggregate_any("storage_size_tbl.storage_size_bytes".to_string())
                } else {
                    "storage_rollup.storage_size_bytes".to_string()
                })
            }
            SyntheticKind::TotalStorageSize => {
                self.total = true;
                let parent = registry.get("parent_id").ok_or_else(|| ResolveError::UnknownField {
                    path: "parent_id".to_string(),
                })?;
                let is_root = variant.null_check(parent, false, params);
                let total = if aggregated {
                    variant.aggregate_any("rolled_up_cms.total_storage_size_bytes".to_string())
                } else {
                    "storage_rollup.total_storage_size_bytes".to_string()
                };
                Ok(format!("if({is_root}, {total}, NULL)"))
            }
            SyntheticKind::Status | SyntheticKind::LatencyMs => Err(ResolveError::unsupported(
                "storage",
                "not a storage field",
            )),
        }
    }

    /// LEFT JOINs required by the storage values handed out so far.
    pub(crate) fn joins(&self, variant: &dyn TableVariant, project: &str) -> Vec<String> {
        let mut out = Vec::new();
        if !self.is_used() {
            return out;
        }

        if !variant.is_aggregated() {
            out.push(format!(
                "LEFT JOIN (SELECT calls_complete_stats.id AS id, \
                 calls_complete_stats.storage_size_bytes AS storage_size_bytes, \
                 calls_complete_stats.total_storage_size_bytes AS total_storage_size_bytes \
                 FROM calls_complete_stats WHERE calls_complete_stats.project_id = {project}) \
                 AS storage_rollup ON {} = storage_rollup.id",
                variant.column_ref("id")
            ));
            return out;
        }

        if self.size {
            out.push(format!(
                "LEFT JOIN (SELECT calls_merged_stats.id AS id, {} AS storage_size_bytes \
                 FROM calls_merged_stats WHERE calls_merged_stats.project_id = {project} \
                 GROUP BY calls_merged_stats.id) AS storage_size_tbl ON {} = storage_size_tbl.id",
                size_sum(),
                variant.column_ref("id")
            ));
        }
        if self.total {
            out.push(format!(
                "LEFT JOIN (SELECT calls_merged_stats.trace_id AS trace_id, {} AS total_storage_size_bytes \
                 FROM calls_merged_stats WHERE calls_merged_stats.project_id = {project} \
                 GROUP BY calls_merged_stats.trace_id) AS rolled_up_cms ON {} = rolled_up_cms.trace_id",
                size_sum(),
                variant.column_ref("trace_id")
            ));
        }

        out
    }
}

/// Storage fields need a stats join, so they never count as light.
pub(crate) const fn is_storage_field(field: &FieldDescriptor) -> bool {
    matches!(
        field.synthetic_kind(),
        Some(SyntheticKind::StorageSize | SyntheticKind::TotalStorageSize)
    )
}

fn size_sum() -> String {
    let parts: Vec<String> = DOC_SIZES
        .iter()
        .map(|column| format!("COALESCE(calls_merged_stats.{column}, 0)"))
        .collect();

    format!("sum({})", parts.join(" + "))
}
