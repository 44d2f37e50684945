use std::{collections::BTreeSet, path::Path};

use anyhow::{bail, Context, Result};
use dsconverge_core::{Catalog, ObjectSchema, VariantInstance, Version};
use serde_json::{Map, Value};

/// The root of a plan file: the objects the server should have.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanFile {
    /// The server version the plan is written for.
    #[serde(default)]
    pub server_version: Option<Version>,
    pub objects: Vec<PlannedObject>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlannedObject {
    pub object_type: String,
    pub id: String,
    #[serde(rename = "type")]
    pub discriminator: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<PlanFile> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read plan file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Could not parse plan file {}", path.display()))
    }

    /// Decode every object against its schema. An object may appear only
    /// once.
    pub fn desired<'a>(&self, catalog: &'a Catalog) -> Result<Vec<(&'a ObjectSchema, VariantInstance)>> {
        let mut seen = BTreeSet::new();
        self.objects
            .iter()
            .map(|object| {
                if !seen.insert((object.object_type.as_str(), object.id.as_str())) {
                    bail!("{} '{}' is planned more than once", object.object_type, object.id);
                }
                let schema = catalog.get(&object.object_type)?;
                let instance = VariantInstance::from_json_attributes(
                    schema,
                    &object.discriminator,
                    &object.id,
                    &object.attributes,
                )
                .with_context(|| format!("in {} '{}'", object.object_type, object.id))?;
                Ok((schema, instance))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsconverge_core::{catalog, AttributeValue};
    use serde_json::json;

    fn plan(value: Value) -> PlanFile {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_desired() {
        let catalog = catalog::builtin().unwrap();
        let plan = plan(json!({
            "serverVersion": "9.2.0.1",
            "objects": [
                {
                    "objectType": "key-manager-provider",
                    "id": "HSM",
                    "type": "pkcs11",
                    "attributes": {
                        "enabled": true,
                        "key_store_pin": {"$unknown": true}
                    }
                },
                {
                    "objectType": "root-dn",
                    "id": "Root DN",
                    "type": "root-dn"
                }
            ]
        }));
        assert_eq!(plan.server_version, Some(Version::new(9, 2, 0, 1)));
        let desired = plan.desired(&catalog).unwrap();
        assert_eq!(desired.len(), 2);
        assert_eq!(desired[0].0.object_type(), "key-manager-provider");
        assert_eq!(desired[0].1.get("key_store_pin"), &AttributeValue::Unknown);
        assert_eq!(desired[1].1.attributes().count(), 0);
    }

    #[test]
    fn test_duplicate_object() {
        let catalog = catalog::builtin().unwrap();
        let object = json!({"objectType": "root-dn", "id": "Root DN", "type": "root-dn"});
        let plan = plan(json!({"objects": [object.clone(), object]}));
        assert!(plan.desired(&catalog).is_err());
    }

    #[test]
    fn test_unknown_object_type() {
        let catalog = catalog::builtin().unwrap();
        let plan = plan(json!({"objects": [{"objectType": "nope", "id": "x", "type": "y"}]}));
        assert!(plan.desired(&catalog).is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(serde_json::from_value::<PlanFile>(json!({"objects": [], "extra": 1})).is_err());
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"{"objects": []}"#).unwrap();
        assert_eq!(PlanFile::load(&path).unwrap().objects, vec![]);
        assert!(PlanFile::load(&dir.path().join("missing.json")).is_err());
    }
}
