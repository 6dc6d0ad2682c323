use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

///
/// Value
///
/// Literal carried by conditions, hardcoded filters and bound parameters.
/// Serialized untagged so the wire form is plain JSON.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Self>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::List(_) => "list",
        }
    }

    /// Canonical, type-tagged rendering used for deduplication keys.
    ///
    /// Two values share a key iff they are the same variant with equal
    /// payload; floats compare by bit pattern.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Null => out.push('n'),
            Self::Bool(v) => {
                let _ = write!(out, "b:{v}");
            }
            Self::Int(v) => {
                let _ = write!(out, "i:{v}");
            }
            Self::Float(v) => {
                let _ = write!(out, "f:{:016x}", v.to_bits());
            }
            Self::Text(v) => {
                let _ = write!(out, "t{}:{v}", v.len());
            }
            Self::List(items) => {
                let _ = write!(out, "l{}[", items.len());
                for item in items {
                    item.write_canonical(out);
                    out.push(';');
                }
                out.push(']');
            }
        }
    }
}

// ----------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_wire_form_round_trips_through_json() {
        let value: Value = serde_json::from_str(r#"[1, 2.5, "x", true, null]"#).expect("parse");
        assert_eq!(
            value,
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Text("x".to_string()),
                Value::Bool(true),
                Value::Null,
            ])
        );
    }

    #[test]
    fn canonical_key_distinguishes_variants() {
        assert_ne!(Value::Int(1).canonical_key(), Value::Float(1.0).canonical_key());
        assert_ne!(
            Value::Text("1".to_string()).canonical_key(),
            Value::Int(1).canonical_key()
        );
        assert_eq!(
            Value::from(vec!["a", "b"]).canonical_key(),
            Value::from(vec!["a", "b"]).canonical_key()
        );
    }

    #[test]
    fn canonical_key_is_not_confused_by_separators_in_text() {
        let joined = Value::from(vec!["a;t1:b"]);
        let split = Value::from(vec!["a", "b"]);
        assert_ne!(joined.canonical_key(), split.canonical_key());
    }
}
