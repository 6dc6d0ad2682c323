//! Batch mutation statements.
//!
//! Deletes are soft: they stamp `deleted_at` and leave the rows in place.
//! An empty id list yields `CompiledQuery::noop()` instead of a statement.

use crate::{
    config::CompileConfig,
    error::CompileError,
    model::TableKind,
    param::{ParamBuilder, ParamType},
    query::{
        builder::CompiledQuery,
        validate::{validate_len, validate_project},
    },
    value::Value,
};
use tracing::debug;

/// Soft-delete `call_ids` in `project_id` on behalf of `wb_user_id`.
///
/// The merged table receives one delete part per call; the complete table
/// (and the starts union, whose finished rows live there) is updated in
/// place.
pub fn soft_delete_calls(
    project_id: &str,
    call_ids: &[String],
    wb_user_id: &str,
    table: TableKind,
    config: &CompileConfig,
) -> Result<CompiledQuery, CompileError> {
    validate_project(project_id)?;
    validate_len("call_ids", call_ids.len(), config.max_array_filter_len)?;
    if call_ids.is_empty() {
        return Ok(CompiledQuery::noop());
    }

    let mut params = ParamBuilder::new(config.param_prefix.clone());
    let project = params.add(project_id, ParamType::String);
    let ids = params.add(
        Value::from(call_ids.to_vec()),
        ParamType::array_of(ParamType::String),
    );
    let user = params.add(wb_user_id, ParamType::String);

    let sql = match table {
        TableKind::Merged => format!(
            "INSERT INTO call_parts (project_id, id, wb_user_id, deleted_at)\n\
             SELECT {project}, call_id, {user}, now64(6)\n\
             FROM (SELECT arrayJoin({ids}) AS call_id)"
        ),
        TableKind::Complete | TableKind::StartsUnion => format!(
            "ALTER TABLE calls_complete\n\
             UPDATE deleted_at = now64(6), wb_user_id = {user}\n\
             WHERE calls_complete.project_id = {project} AND calls_complete.id IN {ids}"
        ),
    };
    debug!(
        table = table.label(),
        calls = call_ids.len(),
        operator = "SoftDeleteCalls",
        "built soft delete"
    );

    Ok(CompiledQuery {
        sql,
        params: params.finish(),
    })
}
