//! The attribute value model.
//!
//! An attribute is either unset ([`AttributeValue::Null`]), not yet known
//! ([`AttributeValue::Unknown`], only ever in a plan), a single scalar, or a
//! set of scalars of one kind. Absence of a set is `Null`, never an empty set.

use std::{collections::BTreeSet, fmt::Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// JSON marker for a value that is only known after an upstream computation.
pub const UNKNOWN_MARKER: &str = "$unknown";

pub(crate) static NULL: AttributeValue = AttributeValue::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Int64,
    Bool,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Int64 => write!(f, "int64"),
            ValueKind::Bool => write!(f, "bool"),
        }
    }
}

/// A single value. The derived ordering is used for set elements, so that
/// per-element operations come out in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    String(String),
    Int64(i64),
    Bool(bool),
}

impl Scalar {
    pub fn kind(&self) -> ValueKind {
        match self {
            Scalar::String(_) => ValueKind::String,
            Scalar::Int64(_) => ValueKind::Int64,
            Scalar::Bool(_) => ValueKind::Bool,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::Int64(i) => Value::from(*i),
            Scalar::Bool(b) => Value::Bool(*b),
        }
    }

    fn from_json(value: &Value) -> Option<Scalar> {
        match value {
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n.as_i64().map(Scalar::Int64),
            _ => None,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "{:?}", s),
            Scalar::Int64(i) => write!(f, "{}", i),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}
impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}
impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int64(value)
    }
}
impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Equality is value equality: a `Scalar` never equals a `Set`, even a
/// singleton one, and `Null` only equals `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeValue {
    #[default]
    Null,
    Unknown,
    Scalar(Scalar),
    Set(ValueKind, BTreeSet<Scalar>),
}

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        AttributeValue::Scalar(Scalar::String(s.into()))
    }

    pub fn int(i: i64) -> Self {
        AttributeValue::Scalar(Scalar::Int64(i))
    }

    pub fn bool(b: bool) -> Self {
        AttributeValue::Scalar(Scalar::Bool(b))
    }

    /// A set of `kind`. An empty set is `Null`.
    pub fn set(kind: ValueKind, elements: BTreeSet<Scalar>) -> Self {
        if elements.is_empty() {
            AttributeValue::Null
        } else {
            AttributeValue::Set(kind, elements)
        }
    }

    /// A set of strings. Duplicates collapse.
    pub fn string_set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::set(
            ValueKind::String,
            values.into_iter().map(|s| Scalar::String(s.into())).collect(),
        )
    }

    pub fn is_empty_set(&self) -> bool {
        matches!(self, AttributeValue::Set(_, elements) if elements.is_empty())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AttributeValue::Unknown)
    }

    /// Set elements, or nothing for any other value.
    pub fn elements(&self) -> impl Iterator<Item = &Scalar> {
        let set = match self {
            AttributeValue::Set(_, elements) => Some(elements),
            _ => None,
        };
        set.into_iter().flatten()
    }

    /// Decode a JSON value into an attribute value of the given shape.
    pub fn from_json(
        attribute: &str,
        kind: ValueKind,
        multi_valued: bool,
        value: &Value,
    ) -> Result<AttributeValue, ValidationError> {
        let invalid = || ValidationError::InvalidValue {
            attribute: attribute.to_string(),
            expected: if multi_valued {
                format!("a set of {}", kind)
            } else {
                kind.to_string()
            },
            found: value.to_string(),
        };
        if value.is_null() {
            return Ok(AttributeValue::Null);
        }
        if is_unknown_marker(value) {
            return Ok(AttributeValue::Unknown);
        }
        let scalar_of_kind = |v: &Value| Scalar::from_json(v).filter(|s| s.kind() == kind);
        match (multi_valued, value) {
            (true, Value::Array(items)) => items
                .iter()
                .map(|item| scalar_of_kind(item).ok_or_else(invalid))
                .collect::<Result<BTreeSet<_>, _>>()
                .map(|elements| AttributeValue::set(kind, elements)),
            (false, v) => scalar_of_kind(v)
                .map(AttributeValue::Scalar)
                .ok_or_else(invalid),
            (true, _) => Err(invalid()),
        }
    }

    /// Decode a JSON value without a schema rule, inferring the kind from the
    /// value itself. Used for attributes that do not apply to the variant, so
    /// that validation rejects them by name rather than by shape. JSON with no
    /// scalar form, such as floats or objects, is kept as its text.
    pub fn infer_from_json(value: &Value) -> AttributeValue {
        if value.is_null() {
            return AttributeValue::Null;
        }
        if is_unknown_marker(value) {
            return AttributeValue::Unknown;
        }
        let as_text = |v: &Value| Scalar::String(v.to_string());
        match value {
            Value::Array(items) => {
                let scalars: Option<BTreeSet<Scalar>> =
                    items.iter().map(Scalar::from_json).collect();
                match scalars {
                    Some(elements)
                        if elements
                            .iter()
                            .all(|e| elements.first().map(Scalar::kind) == Some(e.kind())) =>
                    {
                        let kind = elements
                            .first()
                            .map(Scalar::kind)
                            .unwrap_or(ValueKind::String);
                        AttributeValue::set(kind, elements)
                    }
                    _ => AttributeValue::set(ValueKind::String, items.iter().map(as_text).collect()),
                }
            }
            other => {
                AttributeValue::Scalar(Scalar::from_json(other).unwrap_or_else(|| as_text(other)))
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Unknown => serde_json::json!({ UNKNOWN_MARKER: true }),
            AttributeValue::Scalar(s) => s.to_json(),
            AttributeValue::Set(_, elements) => {
                Value::Array(elements.iter().map(Scalar::to_json).collect())
            }
        }
    }

    /// Whether this value fits an attribute declared with `kind` and
    /// `multi_valued`. `Null` and `Unknown` fit anything.
    pub fn has_shape(&self, kind: ValueKind, multi_valued: bool) -> bool {
        match self {
            AttributeValue::Null | AttributeValue::Unknown => true,
            AttributeValue::Scalar(s) => !multi_valued && s.kind() == kind,
            AttributeValue::Set(k, elements) => {
                multi_valued && *k == kind && elements.iter().all(|e| e.kind() == kind)
            }
        }
    }
}

impl From<Scalar> for AttributeValue {
    fn from(value: Scalar) -> Self {
        AttributeValue::Scalar(value)
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Unknown => write!(f, "(known after apply)"),
            AttributeValue::Scalar(s) => write!(f, "{}", s),
            AttributeValue::Set(_, elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn is_unknown_marker(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get(UNKNOWN_MARKER) == Some(&Value::Bool(true)),
        _ => false,
    }
}
