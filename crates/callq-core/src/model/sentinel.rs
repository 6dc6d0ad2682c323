//! Module: model::sentinel
//! Responsibility: mapping "absent" to and from table-specific storage.
//! Does not own: rendering null checks (see `model::table`).
//! Boundary: flat tables store typed sentinels; the merged table stores NULL.

use crate::{param::ParamType, value::Value};

/// Sentinel stored in flat tables for an absent datetime.
pub const DATETIME_SENTINEL: &str = "1970-01-01 00:00:00.000000";

/// Sentinel stored in flat tables for an absent integer.
pub const INT_SENTINEL: i64 = -1;

///
/// SentinelKind
///
/// Which sentinel a field uses when its table has no true NULLs.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SentinelKind {
    None,
    String,
    Datetime,
    Int,
}

impl SentinelKind {
    /// The stored placeholder for "absent", or `None` when the field is never absent.
    #[must_use]
    pub fn sentinel(self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::String => Some(Value::Text(String::new())),
            Self::Datetime => Some(Value::Text(DATETIME_SENTINEL.to_string())),
            Self::Int => Some(Value::Int(INT_SENTINEL)),
        }
    }

    #[must_use]
    pub const fn param_type(self) -> ParamType {
        match self {
            Self::None | Self::String => ParamType::String,
            Self::Datetime => ParamType::DateTime64,
            Self::Int => ParamType::Int64,
        }
    }

    /// Encode an optional value for a sentinel-bearing table.
    #[must_use]
    pub fn to_storage(self, value: Option<Value>) -> Value {
        match value {
            Some(Value::Null) | None => self.sentinel().unwrap_or(Value::Null),
            Some(value) => value,
        }
    }

    /// Decode a stored value; sentinels and NULL become `None`.
    #[must_use]
    pub fn from_storage(self, stored: Value) -> Option<Value> {
        if stored.is_null() {
            return None;
        }
        match self.sentinel() {
            Some(sentinel) if sentinel == stored => None,
            _ => Some(stored),
        }
    }
}
