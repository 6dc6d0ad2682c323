use crate::{
    config::CompileConfig,
    model::FieldRegistry,
    param::{ParamBuilder, ParamType},
    query::{
        optimize::{
            PassSet, feedback::FeedbackJoin, object_ref::ObjectRefCtes, storage::StorageJoins,
        },
        path::ExpandColumns,
    },
};

///
/// Scope
///
/// Read-only inputs shared by every stage of one compile.
///

#[derive(Debug)]
pub(crate) struct Scope<'a> {
    pub(crate) fields: &'a FieldRegistry,
    pub(crate) config: &'a CompileConfig,
    pub(crate) expand: ExpandColumns,
    pub(crate) include_deleted: bool,
}

///
/// CompileState
///
/// Mutable accumulators threaded through one compile: parameters, generated
/// CTEs and joins, and the record of which passes fired.
///

#[derive(Debug)]
pub(crate) struct CompileState {
    pub(crate) params: ParamBuilder,
    /// Placeholder bound to the project id.
    pub(crate) project: String,
    pub(crate) object_refs: ObjectRefCtes,
    pub(crate) feedback: FeedbackJoin,
    pub(crate) storage: StorageJoins,
    pub(crate) passes: PassSet,
}

impl CompileState {
    /// The project id is always the first bound parameter.
    pub(crate) fn new(config: &CompileConfig, project_id: &str) -> Self {
        let mut params = ParamBuilder::new(config.param_prefix.clone());
        let project = params.add(project_id, ParamType::String);

        Self {
            params,
            project,
            object_refs: ObjectRefCtes::new(config.max_object_ref_ctes),
            feedback: FeedbackJoin::default(),
            storage: StorageJoins::default(),
            passes: PassSet::default(),
        }
    }
}
