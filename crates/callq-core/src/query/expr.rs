use crate::value::Value;
use serde::{Deserialize, Serialize};

///
/// Expr
///
/// Immutable filter-expression node. The serde form is the wire format
/// accepted from clients, e.g. `{"$eq": [{"$getField": "op_name"}, {"$literal": "x"}]}`.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Expr {
    #[serde(rename = "$eq")]
    Eq(Box<Self>, Box<Self>),

    #[serde(rename = "$gt")]
    Gt(Box<Self>, Box<Self>),

    #[serde(rename = "$gte")]
    Gte(Box<Self>, Box<Self>),

    #[serde(rename = "$lt")]
    Lt(Box<Self>, Box<Self>),

    #[serde(rename = "$lte")]
    Lte(Box<Self>, Box<Self>),

    #[serde(rename = "$in")]
    In(Box<Self>, Vec<Self>),

    #[serde(rename = "$contains")]
    Contains {
        input: Box<Self>,
        substr: Box<Self>,
        #[serde(default)]
        case_insensitive: bool,
    },

    #[serde(rename = "$and")]
    And(Vec<Self>),

    #[serde(rename = "$or")]
    Or(Vec<Self>),

    #[serde(rename = "$not")]
    Not(Box<Self>),

    #[serde(rename = "$convert")]
    Convert { input: Box<Self>, to: CastTo },

    #[serde(rename = "$getField")]
    GetField(String),

    #[serde(rename = "$literal")]
    Literal(Value),
}

impl Expr {
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub fn get_field(path: impl Into<String>) -> Self {
        Self::GetField(path.into())
    }

    #[must_use]
    pub fn not(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    /// AND-combine, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut parts = self.into_conjuncts();
        parts.extend(other.into_conjuncts());
        Self::And(parts)
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Top-level conjuncts; nested `And`s are flattened.
    #[must_use]
    pub fn into_conjuncts(self) -> Vec<Self> {
        match self {
            Self::And(parts) => parts.into_iter().flat_map(Self::into_conjuncts).collect(),
            other => vec![other],
        }
    }

    /// Parse the JSON wire form.
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

///
/// CastTo
///
/// Explicit coercion applied by `Convert` before a comparison.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CastTo {
    Double,
    Int,
    Bool,
    String,
    Exists,
}

impl CastTo {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Exists => "exists",
        }
    }
}

///
/// FieldRef
///
/// Method-based condition builder over one operand (a field, optionally
/// converted). Produces `Expr` nodes; performs no validation.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    operand: Expr,
}

/// Start a condition on the field at `path`.
#[must_use]
pub fn field(path: impl Into<String>) -> FieldRef {
    FieldRef {
        operand: Expr::GetField(path.into()),
    }
}

impl FieldRef {
    /// Wrap the operand in an explicit conversion.
    #[must_use]
    pub fn convert(self, to: CastTo) -> Self {
        Self {
            operand: Expr::Convert {
                input: Box::new(self.operand),
                to,
            },
        }
    }

    #[must_use]
    pub fn into_expr(self) -> Expr {
        self.operand
    }

    // ------------------------------------------------------------------
    // Comparison conditions
    // ------------------------------------------------------------------

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Expr {
        Expr::Eq(Box::new(self.operand), Box::new(Expr::literal(value)))
    }

    #[must_use]
    pub fn is_null(self) -> Expr {
        self.eq(Value::Null)
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Expr {
        Expr::Gt(Box::new(self.operand), Box::new(Expr::literal(value)))
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Expr {
        Expr::Gte(Box::new(self.operand), Box::new(Expr::literal(value)))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Expr {
        Expr::Lt(Box::new(self.operand), Box::new(Expr::literal(value)))
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Expr {
        Expr::Lte(Box::new(self.operand), Box::new(Expr::literal(value)))
    }

    /// Membership test against a fixed list.
    #[must_use]
    pub fn in_list<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::In(
            Box::new(self.operand),
            values.into_iter().map(Expr::literal).collect(),
        )
    }

    // ------------------------------------------------------------------
    // Text conditions
    // ------------------------------------------------------------------

    #[must_use]
    pub fn contains(self, substr: impl Into<Value>) -> Expr {
        self.contains_with(substr, false)
    }

    #[must_use]
    pub fn contains_ci(self, substr: impl Into<Value>) -> Expr {
        self.contains_with(substr, true)
    }

    fn contains_with(self, substr: impl Into<Value>, case_insensitive: bool) -> Expr {
        Expr::Contains {
            input: Box::new(self.operand),
            substr: Box::new(Expr::literal(substr)),
            case_insensitive,
        }
    }
}
