//! Module: param
//! Responsibility: bind-parameter allocation and placeholder rendering.
//! Does not own: choosing parameter types for fields (see `model::field`).
//! Boundary: every literal that reaches SQL text goes through a `ParamBuilder`.

use crate::value::Value;
use derive_more::{Deref, IntoIterator};
use serde::Serialize;
use std::{collections::HashMap, fmt};

///
/// ParamType
///
/// ClickHouse type annotation written into `{name:Type}` placeholders.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum ParamType {
    String,
    Int64,
    UInt64,
    Float64,
    Bool,
    DateTime64,
    Array(Box<Self>),
}

impl ParamType {
    #[must_use]
    pub fn array_of(inner: Self) -> Self {
        Self::Array(Box::new(inner))
    }

    /// Infer a parameter type from a literal.
    ///
    /// Lists take the type of their first element (String when empty).
    #[must_use]
    pub fn for_value(value: &Value) -> Self {
        match value {
            Value::Null | Value::Text(_) => Self::String,
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int64,
            Value::Float(_) => Self::Float64,
            Value::List(items) => {
                Self::array_of(items.first().map_or(Self::String, Self::for_value))
            }
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Int64 => write!(f, "Int64"),
            Self::UInt64 => write!(f, "UInt64"),
            Self::Float64 => write!(f, "Float64"),
            Self::Bool => write!(f, "Bool"),
            Self::DateTime64 => write!(f, "DateTime64(6)"),
            Self::Array(inner) => write!(f, "Array({inner})"),
        }
    }
}

///
/// PlaceholderStyle
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PlaceholderStyle {
    /// `{name:Type}` (ClickHouse server-side binding).
    #[default]
    ClickHouse,
    /// `:name` (SQLite named binding; types are not annotated).
    Sqlite,
}

///
/// BoundParam
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoundParam {
    pub name: String,
    pub value: Value,
    pub ty: ParamType,
}

///
/// BoundParams
///
/// Parameters in allocation order. Names are unique.
///

#[derive(Clone, Debug, Default, Deref, IntoIterator, PartialEq, Serialize)]
pub struct BoundParams(Vec<BoundParam>);

impl BoundParams {
    /// Look up the value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|param| param.name == name)
            .map(|param| &param.value)
    }

    /// Name of the first parameter bound to `value`, if any.
    #[must_use]
    pub fn name_of(&self, value: &Value) -> Option<&str> {
        self.0
            .iter()
            .find(|param| &param.value == value)
            .map(|param| param.name.as_str())
    }

    /// Plain name → value map for drivers that take JSON parameters.
    #[must_use]
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.0
            .iter()
            .map(|param| {
                let value = serde_json::to_value(&param.value).unwrap_or(serde_json::Value::Null);
                (param.name.clone(), value)
            })
            .collect()
    }
}

///
/// ParamBuilder
///
/// Allocates sequential `<prefix>_<n>` names. `add` reuses an existing name
/// for an identical `(value, type)` pair; `add_unique` always allocates.
/// Allocation never fails.
///

#[derive(Debug)]
pub struct ParamBuilder {
    prefix: String,
    style: PlaceholderStyle,
    params: Vec<BoundParam>,
    dedup: HashMap<(String, ParamType), usize>,
}

impl ParamBuilder {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_style(prefix, PlaceholderStyle::ClickHouse)
    }

    #[must_use]
    pub fn with_style(prefix: impl Into<String>, style: PlaceholderStyle) -> Self {
        Self {
            prefix: prefix.into(),
            style,
            params: Vec::new(),
            dedup: HashMap::new(),
        }
    }

    /// Bind `value` and return its placeholder, reusing an identical binding.
    pub fn add(&mut self, value: impl Into<Value>, ty: ParamType) -> String {
        let value = value.into();
        let key = (value.canonical_key(), ty);
        if let Some(&index) = self.dedup.get(&key) {
            return self.placeholder(index);
        }

        let index = self.push(value, key.1.clone());
        self.dedup.insert(key, index);

        self.placeholder(index)
    }

    /// Bind `value` under a fresh name even if an identical binding exists.
    pub fn add_unique(&mut self, value: impl Into<Value>, ty: ParamType) -> String {
        let index = self.push(value.into(), ty);

        self.placeholder(index)
    }

    /// Bind every element separately; used by dialects without array binding.
    pub fn add_each(&mut self, values: &[Value], ty: &ParamType) -> Vec<String> {
        values
            .iter()
            .map(|value| self.add(value.clone(), ty.clone()))
            .collect()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[must_use]
    pub fn finish(self) -> BoundParams {
        BoundParams(self.params)
    }

    fn push(&mut self, value: Value, ty: ParamType) -> usize {
        let index = self.params.len();
        self.params.push(BoundParam {
            name: format!("{}_{index}", self.prefix),
            value,
            ty,
        });

        index
    }

    fn placeholder(&self, index: usize) -> String {
        let param = &self.params[index];
        match self.style {
            PlaceholderStyle::ClickHouse => format!("{{{}:{}}}", param.name, param.ty),
            PlaceholderStyle::Sqlite => format!(":{}", param.name),
        }
    }
}
