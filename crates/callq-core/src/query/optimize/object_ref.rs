//! Module: query::optimize::object_ref
//! Responsibility: conditions on paths that pass through reference strings.
//! Does not own: deciding which paths are references (see `query::path`).
//! Boundary: emits one CTE per hop, deduplicated by structural fingerprint.
//!
//! A reference is matched either by its full URI or by its trailing
//! `name:digest` (or bare row digest) segment, so objects and table rows are
//! both reachable.

use crate::{
    error::CompileError,
    param::ParamBuilder,
    query::{
        assemble::Cte,
        condition::{LeafOp, json_predicate},
        expr::CastTo,
        json::json_value,
        path::{JsonPath, ObjectRefPath},
        validate::ValidateError,
    },
    value::Value,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const TARGETS: &str = "ref_targets";
const TARGET_DOC: &str = "ref_targets.val_dump";

///
/// ObjectRefCtes
///

#[derive(Debug)]
pub(crate) struct ObjectRefCtes {
    ctes: Vec<Cte>,
    by_fingerprint: HashMap<[u8; 32], String>,
    max: usize,
}

impl ObjectRefCtes {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            ctes: Vec::new(),
            by_fingerprint: HashMap::new(),
            max,
        }
    }

    /// Generated CTEs in dependency order.
    pub(crate) fn take(&mut self) -> Vec<Cte> {
        self.by_fingerprint.clear();
        std::mem::take(&mut self.ctes)
    }

    /// Call-level membership predicate for `op` applied at the end of `path`.
    #[expect(clippy::too_many_arguments)]
    pub(crate) fn condition(
        &mut self,
        call_doc: &str,
        path: &ObjectRefPath,
        cast: Option<CastTo>,
        op: &LeafOp<'_>,
        label: &str,
        params: &mut ParamBuilder,
        project: &str,
    ) -> Result<String, CompileError> {
        let Some((first, rest)) = path.hops.split_first() else {
            return Err(ValidateError::InvalidExpandColumn {
                column: label.to_string(),
            }
            .into());
        };

        // innermost: objects satisfying the leaf predicate
        let leaf_value = json_value(TARGET_DOC, &path.leaf, params);
        let leaf_sql = json_predicate(&leaf_value, cast, op, label, params)?;
        let mut fingerprint = leaf_fingerprint(&path.leaf, cast, op);
        let mut target = self.ensure(fingerprint, &leaf_sql, project)?;

        // outward: objects whose hop value points into the previous set
        for hop in rest.iter().rev() {
            fingerprint = hop_fingerprint(hop, &fingerprint);
            let value = json_value(TARGET_DOC, hop, params);
            target = self.ensure(fingerprint, &ref_membership(&value, &target), project)?;
        }

        let value = json_value(call_doc, first, params);

        Ok(ref_membership(&value, &target))
    }

    fn ensure(
        &mut self,
        fingerprint: [u8; 32],
        predicate: &str,
        project: &str,
    ) -> Result<String, ValidateError> {
        if let Some(name) = self.by_fingerprint.get(&fingerprint) {
            return Ok(name.clone());
        }
        if self.ctes.len() >= self.max {
            return Err(ValidateError::TooManyObjectRefCtes { max: self.max });
        }

        let name = format!("obj_ref_{}", self.ctes.len());
        self.ctes.push(Cte::new(&name, targets_body(project, predicate)));
        self.by_fingerprint.insert(fingerprint, name.clone());

        Ok(name)
    }
}

/// True when the text `value` references an object in `cte`.
fn ref_membership(value: &str, cte: &str) -> String {
    format!(
        "({value} IN (SELECT ref FROM {cte}) OR \
         arrayElement(splitByChar('/', {value}), -1) IN (SELECT short_ref FROM {cte}))"
    )
}

fn targets_body(project: &str, predicate: &str) -> String {
    format!(
        "SELECT {TARGETS}.ref AS ref, {TARGETS}.short_ref AS short_ref FROM (\
         SELECT concat('weave:///', object_versions.project_id, '/object/', object_versions.object_id, ':', object_versions.digest) AS ref, \
         concat(object_versions.object_id, ':', object_versions.digest) AS short_ref, \
         object_versions.val_dump AS val_dump \
         FROM object_versions WHERE object_versions.project_id = {project} \
         UNION ALL \
         SELECT concat('weave:///', table_rows.project_id, '/table/row/', table_rows.digest) AS ref, \
         table_rows.digest AS short_ref, \
         table_rows.val_dump AS val_dump \
         FROM table_rows WHERE table_rows.project_id = {project}\
         ) AS {TARGETS} WHERE {predicate}"
    )
}

// ----------------------------------------------------------------------
// Fingerprints
// ----------------------------------------------------------------------

fn leaf_fingerprint(leaf: &JsonPath, cast: Option<CastTo>, op: &LeafOp<'_>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"objref:leaf:v1");
    write_path(&mut hasher, leaf);
    match cast {
        None => write_tag(&mut hasher, 0x00),
        Some(to) => {
            write_tag(&mut hasher, 0x01);
            write_str(&mut hasher, to.label());
        }
    }
    match op {
        LeafOp::Compare(cmp, value) => {
            write_tag(&mut hasher, 0x10);
            write_str(&mut hasher, cmp.symbol());
            write_value(&mut hasher, value);
        }
        LeafOp::In(values) => {
            write_tag(&mut hasher, 0x11);
            write_u32(&mut hasher, values.len());
            for value in *values {
                write_value(&mut hasher, value);
            }
        }
        LeafOp::Contains {
            substr,
            case_insensitive,
        } => {
            write_tag(&mut hasher, 0x12);
            write_tag(&mut hasher, u8::from(*case_insensitive));
            write_str(&mut hasher, substr);
        }
        LeafOp::Exists => write_tag(&mut hasher, 0x13),
    }

    finish(hasher)
}

fn hop_fingerprint(hop: &JsonPath, inner: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"objref:hop:v1");
    write_path(&mut hasher, hop);
    hasher.update(inner);

    finish(hasher)
}

fn finish(hasher: Sha256) -> [u8; 32] {
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn write_path(hasher: &mut Sha256, path: &JsonPath) {
    write_u32(hasher, path.keys().len());
    for key in path.keys() {
        write_str(hasher, key);
    }
}

fn write_value(hasher: &mut Sha256, value: &Value) {
    write_str(hasher, &value.canonical_key());
}

#[expect(clippy::cast_possible_truncation)]
fn write_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u32).to_be_bytes());
    hasher.update(value.as_bytes());
}

#[expect(clippy::cast_possible_truncation)]
fn write_u32(hasher: &mut Sha256, value: usize) {
    hasher.update((value as u32).to_be_bytes());
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::FieldRegistry,
        param::ParamType,
        query::{condition::CmpOp, path::ExpandColumns, path::ResolvedField, path::resolve},
    };

    fn ref_path(path: &str, expand: &[&str]) -> ObjectRefPath {
        match resolve(path, FieldRegistry::calls(), &ExpandColumns::new(expand)) {
            Ok(ResolvedField::ObjectRef(path)) => path,
            other => panic!("expected reference path, got {other:?}"),
        }
    }

    fn setup() -> (ObjectRefCtes, ParamBuilder, String) {
        let mut params = ParamBuilder::new("pb");
        let project = params.add("proj", ParamType::String);
        (ObjectRefCtes::new(10), params, project)
    }

    #[test]
    fn single_hop_builds_one_cte() {
        let (mut ctes, mut params, project) = setup();
        let path = ref_path("inputs.model.temperature", &["inputs.model"]);
        let literal = Value::Float(0.7);
        let sql = ctes
            .condition(
                "any(calls_merged.inputs_dump)",
                &path,
                None,
                &LeafOp::Compare(CmpOp::Gt, &literal),
                "inputs.model.temperature",
                &mut params,
                &project,
            )
            .expect("condition compiles");

        assert!(sql.starts_with("(JSON_VALUE(any(calls_merged.inputs_dump), "));
        assert!(sql.contains("IN (SELECT ref FROM obj_ref_0)"));
        assert!(sql.contains("arrayElement(splitByChar('/', "));

        let generated = ctes.take();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].name, "obj_ref_0");
        assert!(generated[0].body.contains("FROM object_versions WHERE object_versions.project_id = {pb_0:String}"));
        assert!(generated[0].body.contains("FROM table_rows WHERE table_rows.project_id = {pb_0:String}"));
        assert!(generated[0].body.contains("toFloat64OrNull(JSON_VALUE(ref_targets.val_dump, "));
    }

    #[test]
    fn multi_hop_chains_from_leaf_outward() {
        let (mut ctes, mut params, project) = setup();
        let path = ref_path("inputs.model.config.name", &["inputs.model", "inputs.model.config"]);
        let literal = Value::from("gpt");
        ctes.condition(
            "calls_complete.inputs_dump",
            &path,
            None,
            &LeafOp::Compare(CmpOp::Eq, &literal),
            "inputs.model.config.name",
            &mut params,
            &project,
        )
        .expect("condition compiles");

        let generated = ctes.take();
        assert_eq!(generated.len(), 2);
        assert!(generated[1].body.contains("IN (SELECT ref FROM obj_ref_0)"));
        assert!(!generated[0].body.contains("obj_ref_"));
    }

    #[test]
    fn identical_conditions_share_ctes() {
        let (mut ctes, mut params, project) = setup();
        let path = ref_path("output.ref.x", &["output.ref"]);
        let literal = Value::from(1);
        for _ in 0..2 {
            ctes.condition(
                "calls_complete.output_dump",
                &path,
                None,
                &LeafOp::Compare(CmpOp::Eq, &literal),
                "output.ref.x",
                &mut params,
                &project,
            )
            .expect("condition compiles");
        }
        let other = Value::from(2);
        ctes.condition(
            "calls_complete.output_dump",
            &path,
            None,
            &LeafOp::Compare(CmpOp::Eq, &other),
            "output.ref.x",
            &mut params,
            &project,
        )
        .expect("condition compiles");

        assert_eq!(ctes.take().len(), 2);
    }

    #[test]
    fn cte_cap_is_enforced() {
        let mut params = ParamBuilder::new("pb");
        let project = params.add("proj", ParamType::String);
        let mut ctes = ObjectRefCtes::new(1);
        let path = ref_path("inputs.a.b.c", &["inputs.a", "inputs.a.b"]);
        let literal = Value::from("x");

        let err = ctes
            .condition(
                "calls_complete.inputs_dump",
                &path,
                None,
                &LeafOp::Compare(CmpOp::Eq, &literal),
                "inputs.a.b.c",
                &mut params,
                &project,
            )
            .expect_err("cap exceeded");

        assert!(matches!(
            err,
            CompileError::Validate(ValidateError::TooManyObjectRefCtes { max: 1 })
        ));
    }
}
