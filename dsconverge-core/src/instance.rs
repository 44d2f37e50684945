use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{
    error::ValidationError,
    schema::ObjectSchema,
    value::{AttributeValue, NULL},
};

/// One configuration object: which variant it is, its identifier and its
/// attribute values.
///
/// Instances are never mutated in place. The `with_*` methods consume the
/// instance and return a new one; everything that reconciles produces a fresh
/// instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInstance {
    discriminator: String,
    id: String,
    attributes: BTreeMap<String, AttributeValue>,
}

impl VariantInstance {
    pub fn new(discriminator: impl Into<String>, id: impl Into<String>) -> Self {
        VariantInstance {
            discriminator: discriminator.into(),
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set (or, with [`AttributeValue::Null`], unset) one attribute. An empty
    /// set unsets it too.
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        let name = name.into();
        if value.is_null() || value.is_empty_set() {
            self.attributes.remove(&name);
        } else {
            self.attributes.insert(name, value);
        }
        self
    }

    pub fn with_attributes<I, N>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (N, AttributeValue)>,
        N: Into<String>,
    {
        attributes
            .into_iter()
            .fold(self, |acc, (name, value)| acc.with_attribute(name, value))
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The value of an attribute; absent attributes are `Null`.
    pub fn get(&self, name: &str) -> &AttributeValue {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    /// All non-Null attributes, ordered by name.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the attributes for which `keep` holds.
    pub fn retain(mut self, mut keep: impl FnMut(&str, &AttributeValue) -> bool) -> Self {
        self.attributes.retain(|k, v| keep(k, v));
        self
    }

    /// Decode the `{"type", "id", "attributes"}` document shape used by plan
    /// files, the managed state and the local store.
    pub fn from_json(schema: &ObjectSchema, value: &Value) -> Result<Self, ValidationError> {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::InvalidValue {
                    attribute: name.to_string(),
                    expected: "a string".to_string(),
                    found: value.get(name).cloned().unwrap_or(Value::Null).to_string(),
                })
        };
        let discriminator = field("type")?;
        let id = field("id")?;
        let attributes = match value.get("attributes") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(ValidationError::InvalidValue {
                    attribute: "attributes".to_string(),
                    expected: "an object".to_string(),
                    found: other.to_string(),
                })
            }
        };
        Self::from_json_attributes(schema, discriminator, id, &attributes)
    }

    pub fn from_json_attributes(
        schema: &ObjectSchema,
        discriminator: &str,
        id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<Self, ValidationError> {
        let mut instance = VariantInstance::new(discriminator, id);
        for (name, json) in attributes {
            let value = match schema.rule(discriminator, name)? {
                Some(rule) => AttributeValue::from_json(name, rule.kind, rule.multi_valued, json)?,
                None => AttributeValue::infer_from_json(json),
            };
            instance = instance.with_attribute(name.clone(), value);
        }
        Ok(instance)
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "type": self.discriminator,
            "id": self.id,
            "attributes": self.attributes_to_json(),
        })
    }

    pub fn attributes_to_json(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}
