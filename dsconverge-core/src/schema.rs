//! Per object type tables of variants and attribute rules.
//!
//! An object type is a discriminated union whose discriminator is only known
//! at runtime. Instead of one hand-written branch per variant, the schema
//! says which attributes each variant accepts, and [`validate`] performs the
//! exhaustiveness check on data.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{
    error::ValidationError,
    instance::VariantInstance,
    value::{AttributeValue, ValueKind},
    version::Version,
    version_gate,
};

/// How an object type comes under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created when absent, deleted on destroy.
    Creatable,
    /// A singleton that always exists on the server. "Create" reads it and
    /// "delete" stops managing it.
    AdoptOnly,
}

impl Lifecycle {
    pub fn can_create(self) -> bool {
        matches!(self, Lifecycle::Creatable)
    }
}

/// A discriminator value of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub min_version: Option<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRule {
    pub name: String,
    pub kind: ValueKind,
    pub multi_valued: bool,
    /// Must be present to create the object.
    pub required: bool,
    /// The server fills this in; only diffed when the plan pins a value.
    pub server_computed: bool,
    /// Accepted by the server but never returned.
    pub obscured: bool,
    pub min_version: Option<Version>,
    /// Value the server assumes when the attribute is unset.
    pub default: Option<AttributeValue>,
    /// Variants accepting this attribute. Empty means all of them.
    pub valid_discriminators: BTreeSet<String>,
}

impl AttributeRule {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        AttributeRule {
            name: name.into(),
            kind,
            multi_valued: false,
            required: false,
            server_computed: false,
            obscured: false,
            min_version: None,
            default: None,
            valid_discriminators: BTreeSet::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Int64)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Bool)
    }

    pub fn string_set(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::String).multi_valued()
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn server_computed(mut self) -> Self {
        self.server_computed = true;
        self
    }

    pub fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    pub fn min_version(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn default_value(mut self, value: AttributeValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn only_for<I, S>(mut self, discriminators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_discriminators = discriminators.into_iter().map(Into::into).collect();
        self
    }

    pub fn applies_to(&self, discriminator: &str) -> bool {
        self.valid_discriminators.is_empty() || self.valid_discriminators.contains(discriminator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("object type '{0}' declares no variants")]
    NoVariants(String),
    #[error("object type '{object_type}' declares variant '{variant}' twice")]
    DuplicateVariant { object_type: String, variant: String },
    #[error("object type '{object_type}' declares attribute '{attribute}' twice")]
    DuplicateAttribute {
        object_type: String,
        attribute: String,
    },
    #[error(
        "attribute '{attribute}' of object type '{object_type}' refers to \
         undeclared variant '{discriminator}'"
    )]
    UndeclaredDiscriminator {
        object_type: String,
        attribute: String,
        discriminator: String,
    },
    #[error("object type '{0}' is declared twice")]
    DuplicateObjectType(String),
}

/// The schema of one object type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSchema {
    object_type: String,
    lifecycle: Lifecycle,
    variants: BTreeMap<String, Variant>,
    /// In declaration order; operations are emitted in this order.
    attributes: Vec<AttributeRule>,
    index: BTreeMap<String, usize>,
}

impl ObjectSchema {
    pub fn builder(object_type: impl Into<String>, lifecycle: Lifecycle) -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            object_type: object_type.into(),
            lifecycle,
            variants: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn variant(&self, discriminator: &str) -> Result<&Variant, ValidationError> {
        self.variants
            .get(discriminator)
            .ok_or_else(|| ValidationError::UnknownVariant {
                object_type: self.object_type.clone(),
                discriminator: discriminator.to_string(),
            })
    }

    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.values()
    }

    /// The rules that apply to `discriminator`, in declaration order.
    pub fn rules_for(
        &self,
        discriminator: &str,
    ) -> Result<impl Iterator<Item = &AttributeRule> + '_, ValidationError> {
        let discriminator = self.variant(discriminator)?.name.as_str();
        Ok(self
            .attributes
            .iter()
            .filter(move |rule| rule.applies_to(discriminator)))
    }

    /// Names of the attributes legal for `discriminator`, in declaration order.
    pub fn legal_attributes(&self, discriminator: &str) -> Result<Vec<&str>, ValidationError> {
        Ok(self
            .rules_for(discriminator)?
            .map(|rule| rule.name.as_str())
            .collect())
    }

    /// The rule for `attribute` under `discriminator`, or `None` when the
    /// attribute does not apply to that variant (or is not declared at all).
    pub fn rule(
        &self,
        discriminator: &str,
        attribute: &str,
    ) -> Result<Option<&AttributeRule>, ValidationError> {
        self.variant(discriminator)?;
        Ok(self
            .declared_rule(attribute)
            .filter(|rule| rule.applies_to(discriminator)))
    }

    /// The rule for `attribute` regardless of variant.
    pub fn declared_rule(&self, attribute: &str) -> Option<&AttributeRule> {
        self.index.get(attribute).map(|&i| &self.attributes[i])
    }
}

pub struct ObjectSchemaBuilder {
    object_type: String,
    lifecycle: Lifecycle,
    variants: Vec<Variant>,
    attributes: Vec<AttributeRule>,
}

impl ObjectSchemaBuilder {
    pub fn variant(mut self, name: impl Into<String>) -> Self {
        self.variants.push(Variant {
            name: name.into(),
            min_version: None,
        });
        self
    }

    pub fn variant_since(mut self, name: impl Into<String>, min_version: Version) -> Self {
        self.variants.push(Variant {
            name: name.into(),
            min_version: Some(min_version),
        });
        self
    }

    pub fn attribute(mut self, rule: AttributeRule) -> Self {
        self.attributes.push(rule);
        self
    }

    pub fn build(self) -> Result<ObjectSchema, SchemaError> {
        let object_type = self.object_type;
        if self.variants.is_empty() {
            return Err(SchemaError::NoVariants(object_type));
        }
        let mut variants = BTreeMap::new();
        for variant in self.variants {
            if variants.contains_key(&variant.name) {
                return Err(SchemaError::DuplicateVariant {
                    object_type,
                    variant: variant.name,
                });
            }
            variants.insert(variant.name.clone(), variant);
        }
        let mut index = BTreeMap::new();
        for (i, rule) in self.attributes.iter().enumerate() {
            if index.insert(rule.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateAttribute {
                    object_type,
                    attribute: rule.name.clone(),
                });
            }
            if let Some(undeclared) = rule
                .valid_discriminators
                .iter()
                .find(|d| !variants.contains_key(*d))
            {
                return Err(SchemaError::UndeclaredDiscriminator {
                    object_type,
                    attribute: rule.name.clone(),
                    discriminator: undeclared.clone(),
                });
            }
        }
        Ok(ObjectSchema {
            object_type,
            lifecycle: self.lifecycle,
            variants,
            attributes: self.attributes,
            index,
        })
    }
}

/// Check a desired instance against the schema and the server version.
///
/// Runs before any remote call. The order is fixed: the discriminator, then
/// the legality and shape of every set attribute, then the variant's version,
/// then each attribute's version. An attribute that is both illegal and too
/// new is therefore always reported as illegal.
pub fn validate(
    schema: &ObjectSchema,
    desired: &VariantInstance,
    server_version: &Version,
) -> Result<(), ValidationError> {
    let discriminator = desired.discriminator();
    let variant = schema.variant(discriminator)?;

    let mut present = Vec::new();
    for (name, value) in desired.attributes() {
        if value.is_null() {
            continue;
        }
        let rule = schema.rule(discriminator, name)?.ok_or_else(|| {
            ValidationError::AttributeNotApplicableToVariant {
                attribute: name.to_string(),
                discriminator: discriminator.to_string(),
            }
        })?;
        if !value.has_shape(rule.kind, rule.multi_valued) {
            return Err(ValidationError::InvalidValue {
                attribute: name.to_string(),
                expected: if rule.multi_valued {
                    format!("a set of {}", rule.kind)
                } else {
                    rule.kind.to_string()
                },
                found: value.to_string(),
            });
        }
        present.push((rule, value));
    }

    version_gate::check_variant(server_version, variant)?;
    for (rule, value) in present {
        version_gate::check(server_version, rule, value)?;
    }
    Ok(())
}

/// Attributes required for creation that the desired instance does not set.
pub fn check_required(
    schema: &ObjectSchema,
    desired: &VariantInstance,
) -> Result<(), ValidationError> {
    let discriminator = desired.discriminator();
    let missing = schema.rules_for(discriminator)?.find(|rule| {
        rule.required
            && matches!(
                desired.get(&rule.name),
                AttributeValue::Null | AttributeValue::Unknown
            )
    });
    match missing {
        Some(rule) => Err(ValidationError::MissingRequiredAttribute {
            attribute: rule.name.clone(),
            discriminator: discriminator.to_string(),
        }),
        None => Ok(()),
    }
}
