//! Patch operations and their application to an instance.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    instance::VariantInstance,
    value::{AttributeValue, Scalar},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Replace,
    Remove,
}

/// What an operation targets: a whole attribute, or one element of a
/// multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributePath {
    Attribute(String),
    Element(String, Scalar),
}

impl AttributePath {
    pub fn attribute(&self) -> &str {
        match self {
            AttributePath::Attribute(name) | AttributePath::Element(name, _) => name,
        }
    }
}

impl Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributePath::Attribute(name) => write!(f, "{}", name),
            AttributePath::Element(name, element) => write!(f, "{}[{}]", name, element),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub path: AttributePath,
    pub value: Option<AttributeValue>,
}

impl Operation {
    pub fn replace(attribute: impl Into<String>, value: AttributeValue) -> Self {
        Operation {
            kind: OperationKind::Replace,
            path: AttributePath::Attribute(attribute.into()),
            value: Some(value),
        }
    }

    pub fn remove(attribute: impl Into<String>) -> Self {
        Operation {
            kind: OperationKind::Remove,
            path: AttributePath::Attribute(attribute.into()),
            value: None,
        }
    }

    pub fn add_element(attribute: impl Into<String>, element: Scalar) -> Self {
        Operation {
            kind: OperationKind::Add,
            value: Some(AttributeValue::Scalar(element.clone())),
            path: AttributePath::Element(attribute.into(), element),
        }
    }

    pub fn remove_element(attribute: impl Into<String>, element: Scalar) -> Self {
        Operation {
            kind: OperationKind::Remove,
            path: AttributePath::Element(attribute.into(), element),
            value: None,
        }
    }

    /// The payload shape handed to a store:
    /// `{"op": "add", "attribute": "extension_argument", "values": ["b=2"]}`.
    pub fn to_wire(&self) -> WireOperation {
        let values = match (&self.path, &self.value) {
            (AttributePath::Element(_, element), _) => Some(vec![element.to_json()]),
            (AttributePath::Attribute(_), Some(AttributeValue::Set(_, elements))) => {
                Some(elements.iter().map(Scalar::to_json).collect())
            }
            (AttributePath::Attribute(_), Some(AttributeValue::Scalar(s))) => Some(vec![s.to_json()]),
            (AttributePath::Attribute(_), _) => None,
        };
        WireOperation {
            op: self.kind,
            attribute: self.path.attribute().to_string(),
            values,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.path, &self.value) {
            (OperationKind::Add, AttributePath::Element(name, element), _) => {
                write!(f, "+ {} {}", name, element)
            }
            (OperationKind::Remove, AttributePath::Element(name, element), _) => {
                write!(f, "- {} {}", name, element)
            }
            (OperationKind::Remove, path, _) => write!(f, "- {}", path),
            (_, path, Some(value)) => write!(f, "~ {} = {}", path, value),
            (_, path, None) => write!(f, "~ {}", path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOperation {
    pub op: OperationKind,
    pub attribute: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub values: Option<Vec<Value>>,
}

impl VariantInstance {
    /// The instance that results from applying `ops`, in order.
    ///
    /// Removing the last element of a set leaves the attribute unset, which is
    /// how the server represents an empty multi-valued attribute.
    pub fn apply(&self, ops: &[Operation]) -> VariantInstance {
        ops.iter().fold(self.clone(), |instance, op| {
            let name = op.path.attribute().to_string();
            let current = instance.get(&name).clone();
            let next = match (&op.kind, &op.path) {
                (OperationKind::Remove, AttributePath::Attribute(_)) => AttributeValue::Null,
                (OperationKind::Remove, AttributePath::Element(_, element)) => match current {
                    AttributeValue::Set(kind, mut elements) => {
                        elements.remove(element);
                        if elements.is_empty() {
                            AttributeValue::Null
                        } else {
                            AttributeValue::Set(kind, elements)
                        }
                    }
                    other => other,
                },
                (_, AttributePath::Element(_, element)) => match current {
                    AttributeValue::Set(kind, mut elements) => {
                        elements.insert(element.clone());
                        AttributeValue::Set(kind, elements)
                    }
                    _ => AttributeValue::Set(element.kind(), [element.clone()].into()),
                },
                (_, AttributePath::Attribute(_)) => op.value.clone().unwrap_or_default(),
            };
            instance.with_attribute(name, next)
        })
    }
}
