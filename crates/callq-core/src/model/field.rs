//! Module: model::field
//! Responsibility: static classification of every queryable call field.
//! Does not own: path resolution or SQL rendering.
//! Boundary: the registry is injected into the compiler and never mutated.

use crate::{model::sentinel::SentinelKind, param::ParamType};

///
/// StorageKind
///
/// Native columns are "light" and can be filtered early; JSON blobs are
/// "heavy" and require extraction. Synthetic fields are computed from
/// native columns or joins.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageKind {
    Native,
    JsonBlob,
    Synthetic(SyntheticKind),
}

///
/// SyntheticKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyntheticKind {
    /// `'error'`, `'running'` or `'success'`, derived from exception/ended_at.
    Status,
    /// Milliseconds between started_at and ended_at.
    LatencyMs,
    /// Bytes stored for the call's own documents.
    StorageSize,
    /// Bytes stored for the whole trace; only reported on trace roots.
    TotalStorageSize,
}

///
/// AggregateKind
///
/// How the merged table reconciles multiple physical rows of one call.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateKind {
    /// Grouping key; never wrapped.
    None,
    /// `any(...)`: exactly one physical part carries a value.
    Any,
    /// `argMaxMerge(...)`: versioned value, latest write wins.
    LatestVersion,
    /// `array_concat_agg(...)`: arrays split across parts.
    ArrayConcat,
}

///
/// ColumnType
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    Text,
    DateTime,
    Int,
    TextArray,
    Json,
}

impl ColumnType {
    #[must_use]
    pub fn param_type(self) -> ParamType {
        match self {
            Self::Text | Self::Json => ParamType::String,
            Self::DateTime => ParamType::DateTime64,
            Self::Int => ParamType::Int64,
            Self::TextArray => ParamType::array_of(ParamType::String),
        }
    }
}

///
/// FieldDescriptor
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub column: &'static str,
    pub storage: StorageKind,
    pub column_type: ColumnType,
    pub aggregate: AggregateKind,
    pub sentinel: SentinelKind,
    pub orderable: bool,
    pub filterable: bool,
    /// Written by the call-start part (merged rows of other parts hold NULL).
    pub on_start_part: bool,
}

impl FieldDescriptor {
    const fn native(
        name: &'static str,
        column_type: ColumnType,
        aggregate: AggregateKind,
        sentinel: SentinelKind,
    ) -> Self {
        Self {
            name,
            column: name,
            storage: StorageKind::Native,
            column_type,
            aggregate,
            sentinel,
            orderable: true,
            filterable: true,
            on_start_part: true,
        }
    }

    const fn json(name: &'static str, column: &'static str, on_start_part: bool) -> Self {
        Self {
            name,
            column,
            storage: StorageKind::JsonBlob,
            column_type: ColumnType::Json,
            aggregate: AggregateKind::Any,
            sentinel: SentinelKind::None,
            orderable: true,
            filterable: true,
            on_start_part,
        }
    }

    const fn synthetic(name: &'static str, kind: SyntheticKind, filterable: bool) -> Self {
        Self {
            name,
            column: name,
            storage: StorageKind::Synthetic(kind),
            column_type: ColumnType::Int,
            aggregate: AggregateKind::None,
            sentinel: SentinelKind::None,
            orderable: true,
            filterable,
            on_start_part: false,
        }
    }

    const fn end_part(mut self) -> Self {
        self.on_start_part = false;
        self
    }

    const fn unordered(mut self) -> Self {
        self.orderable = false;
        self
    }

    const fn typed(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    #[must_use]
    pub const fn is_heavy(&self) -> bool {
        matches!(self.storage, StorageKind::JsonBlob)
    }

    #[must_use]
    pub const fn requires_aggregation(&self) -> bool {
        !matches!(self.aggregate, AggregateKind::None)
    }

    #[must_use]
    pub const fn synthetic_kind(&self) -> Option<SyntheticKind> {
        match self.storage {
            StorageKind::Synthetic(kind) => Some(kind),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_timestamp(&self) -> bool {
        matches!(self.column_type, ColumnType::DateTime)
    }
}

///
/// FieldRegistry
///
/// Lookup table over a static descriptor slice. Alternate registries can be
/// built for tests; the compiler only ever sees the one it is handed.
///

#[derive(Debug)]
pub struct FieldRegistry {
    fields: &'static [FieldDescriptor],
}

impl FieldRegistry {
    #[must_use]
    pub const fn new(fields: &'static [FieldDescriptor]) -> Self {
        Self { fields }
    }

    /// The registry describing the calls schema.
    #[must_use]
    pub const fn calls() -> &'static Self {
        &CALLS
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.fields.iter()
    }

    /// Native, non-synthetic fields: the physical column set of one call row.
    pub fn physical(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.fields
            .iter()
            .filter(|field| !matches!(field.storage, StorageKind::Synthetic(_)))
    }
}

// ----------------------------------------------------------------------
// Calls schema
// ----------------------------------------------------------------------

use AggregateKind as A;
use ColumnType as T;
use SentinelKind as S;

static CALL_FIELDS: [FieldDescriptor; 26] = [
    FieldDescriptor::native("id", T::Text, A::None, S::None),
    FieldDescriptor::native("project_id", T::Text, A::None, S::None),
    FieldDescriptor::native("op_name", T::Text, A::Any, S::String),
    FieldDescriptor::native("display_name", T::Text, A::LatestVersion, S::String),
    FieldDescriptor::native("trace_id", T::Text, A::Any, S::None),
    FieldDescriptor::native("parent_id", T::Text, A::Any, S::String),
    FieldDescriptor::native("thread_id", T::Text, A::Any, S::String),
    FieldDescriptor::native("turn_id", T::Text, A::Any, S::String),
    FieldDescriptor::native("started_at", T::DateTime, A::Any, S::Datetime),
    FieldDescriptor::native("ended_at", T::DateTime, A::Any, S::Datetime).end_part(),
    FieldDescriptor::native("exception", T::Text, A::Any, S::String).end_part(),
    FieldDescriptor::native("wb_user_id", T::Text, A::Any, S::String),
    FieldDescriptor::native("wb_run_id", T::Text, A::Any, S::String),
    FieldDescriptor::native("wb_run_step", T::Int, A::Any, S::Int),
    FieldDescriptor::native("wb_run_step_end", T::Int, A::Any, S::Int).end_part(),
    FieldDescriptor::native("deleted_at", T::DateTime, A::Any, S::Datetime).end_part(),
    FieldDescriptor::json("inputs", "inputs_dump", true),
    FieldDescriptor::json("output", "output_dump", false),
    FieldDescriptor::json("attributes", "attributes_dump", true),
    FieldDescriptor::json("summary", "summary_dump", false),
    FieldDescriptor::native("input_refs", T::TextArray, A::ArrayConcat, S::None).unordered(),
    FieldDescriptor::native("output_refs", T::TextArray, A::ArrayConcat, S::None)
        .unordered()
        .end_part(),
    FieldDescriptor::synthetic("summary.weave.status", SyntheticKind::Status, true).typed(T::Text),
    FieldDescriptor::synthetic("summary.weave.latency_ms", SyntheticKind::LatencyMs, true),
    FieldDescriptor::synthetic("storage_size_bytes", SyntheticKind::StorageSize, false),
    FieldDescriptor::synthetic(
        "total_storage_size_bytes",
        SyntheticKind::TotalStorageSize,
        false,
    ),
];

static CALLS: FieldRegistry = FieldRegistry::new(&CALL_FIELDS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_classifies_light_and_heavy() {
        let registry = FieldRegistry::calls();

        assert!(!registry.get("op_name").expect("op_name").is_heavy());
        assert!(registry.get("inputs").expect("inputs").is_heavy());
        assert_eq!(registry.get("inputs").expect("inputs").column, "inputs_dump");
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn grouping_keys_need_no_aggregation() {
        let registry = FieldRegistry::calls();

        assert!(!registry.get("id").expect("id").requires_aggregation());
        assert!(!registry.get("project_id").expect("project_id").requires_aggregation());
        assert!(registry.get("started_at").expect("started_at").requires_aggregation());
        assert_eq!(
            registry.get("display_name").expect("display_name").aggregate,
            AggregateKind::LatestVersion
        );
    }

    #[test]
    fn storage_aggregates_are_synthetic_and_unfilterable() {
        let registry = FieldRegistry::calls();

        for name in ["storage_size_bytes", "total_storage_size_bytes"] {
            let field = registry.get(name).expect("storage field");
            assert!(field.synthetic_kind().is_some());
            assert!(!field.filterable, "{name} must not be filterable");
            assert!(field.orderable);
        }
    }

    #[test]
    fn physical_columns_exclude_synthetic_fields() {
        let registry = FieldRegistry::calls();
        let physical: Vec<_> = registry.physical().map(|field| field.name).collect();

        assert!(physical.contains(&"output_refs"));
        assert!(!physical.contains(&"summary.weave.status"));
        assert_eq!(physical.len(), 22);
    }
}
