//! A directory server that keeps its configuration in a local event log.
//!
//! It behaves like the real thing where the engine can tell: obscured
//! attributes are stored but read back as unset, server-computed attributes
//! receive their defaults on creation, singletons cannot be created or
//! deleted, and a patch is applied completely or not at all.

use std::path::Path;

use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use dsconverge_core::{
    catalog::Catalog, AttributeValue, Lifecycle, ObjectSchema, Operation, RemoteStore,
    StoreError, VariantInstance, Version,
};

use crate::journal::Journal;

const SERVER_TYPE: &str = "dsconvergeServer";

pub struct LocalServer {
    catalog: Catalog,
    journal: Mutex<Journal>,
}

impl LocalServer {
    /// Create a new server document at `path` running `version`, with the
    /// singleton objects already in place.
    pub fn init<P: AsRef<Path>>(path: P, catalog: Catalog, version: &Version) -> anyhow::Result<Self> {
        let mut objects = Map::new();
        for singleton in singletons() {
            let schema = catalog.get(&singleton.object_type)?;
            let instance = VariantInstance::from_json_attributes(
                schema,
                &singleton.discriminator,
                &singleton.id,
                &singleton.attributes,
            )?;
            let instance = with_computed_defaults(schema, instance)?;
            objects
                .entry(schema.object_type().to_string())
                .or_insert_with(|| json!({}))
                .as_object_mut()
                .context("objects of a type must be a JSON object")?
                .insert(singleton.id.clone(), instance.to_json());
        }
        let document = json!({
            "_type": SERVER_TYPE,
            "version": version.to_string(),
            "objects": objects,
        });
        let journal = Journal::create(path, document)?;
        info!(path = %journal.path().display(), %version, "initialized server");
        Ok(LocalServer {
            catalog,
            journal: Mutex::new(journal),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, catalog: Catalog) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let journal = Journal::open(path).with_context(|| {
            format!(
                "Could not open server document {}; create one with `dsconverge init-server`",
                path.display()
            )
        })?;
        match journal.document().get("_type").and_then(Value::as_str) {
            Some(SERVER_TYPE) => {}
            other => bail!(
                "unexpected _type in {}: expected '{}', got {:?}",
                path.display(),
                SERVER_TYPE,
                other
            ),
        }
        Ok(LocalServer {
            catalog,
            journal: Mutex::new(journal),
        })
    }

    /// The version the server reports.
    pub async fn version(&self) -> anyhow::Result<Version> {
        let journal = self.journal.lock().await;
        let version = journal
            .document()
            .get("version")
            .and_then(Value::as_str)
            .context("server document has no version")?;
        Ok(version.parse()?)
    }

    fn schema(&self, object_type: &str) -> Result<&ObjectSchema, StoreError> {
        self.catalog.get(object_type).map_err(rejected)
    }

    fn read(
        &self,
        journal: &Journal,
        object_type: &str,
        id: &str,
    ) -> Result<Option<VariantInstance>, StoreError> {
        let schema = self.schema(object_type)?;
        match journal.document()["objects"].get(object_type).and_then(|objects| objects.get(id)) {
            None => Ok(None),
            Some(stored) => VariantInstance::from_json(schema, stored)
                .map(Some)
                .map_err(rejected),
        }
    }

    fn write(
        &self,
        journal: &mut Journal,
        object_type: &str,
        id: &str,
        instance: Option<&VariantInstance>,
        mut meta: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut document = journal.document().clone();
        let objects = document["objects"]
            .as_object_mut()
            .context("server document has no objects")?
            .entry(object_type.to_string())
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .context("objects of a type must be a JSON object")?;
        match instance {
            Some(instance) => {
                objects.insert(id.to_string(), instance.to_json());
            }
            None => {
                objects.remove(id);
            }
        }
        meta.insert("objectType".to_string(), json!(object_type));
        meta.insert("id".to_string(), json!(id));
        journal.record(document, Value::Object(meta))?;
        Ok(())
    }

    /// What a client gets to see of `instance`.
    fn echo(&self, schema: &ObjectSchema, instance: VariantInstance) -> VariantInstance {
        instance.retain(|name, _| !schema.declared_rule(name).is_some_and(|rule| rule.obscured))
    }
}

#[async_trait]
impl RemoteStore for LocalServer {
    async fn get(&self, object_type: &str, id: &str) -> Result<VariantInstance, StoreError> {
        let journal = self.journal.lock().await;
        let schema = self.schema(object_type)?;
        debug!(object_type, id, "get");
        self.read(&journal, object_type, id)?
            .map(|instance| self.echo(schema, instance))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(
        &self,
        object_type: &str,
        instance: &VariantInstance,
    ) -> Result<VariantInstance, StoreError> {
        let mut journal = self.journal.lock().await;
        let schema = self.schema(object_type)?;
        if schema.lifecycle() == Lifecycle::AdoptOnly {
            return Err(anyhow!("objects of type '{}' cannot be created", object_type).into());
        }
        let id = instance.id();
        if self.read(&journal, object_type, id)?.is_some() {
            return Err(anyhow!("{} '{}' already exists", object_type, id).into());
        }
        check_applicable(schema, instance.discriminator(), instance.attributes().map(|(n, _)| n))?;
        let stored = with_computed_defaults(schema, instance.clone()).map_err(rejected)?;
        self.write(&mut journal, object_type, id, Some(&stored), event("create"))?;
        debug!(object_type, id, "created");
        Ok(self.echo(schema, stored))
    }

    async fn patch(
        &self,
        object_type: &str,
        id: &str,
        ops: &[Operation],
    ) -> Result<VariantInstance, StoreError> {
        let mut journal = self.journal.lock().await;
        let schema = self.schema(object_type)?;
        let current = self
            .read(&journal, object_type, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        check_applicable(
            schema,
            current.discriminator(),
            ops.iter().map(|op| op.path.attribute()),
        )?;
        let patched = current.apply(ops);
        let mut meta = event("patch");
        meta.insert(
            "operations".to_string(),
            serde_json::to_value(ops.iter().map(Operation::to_wire).collect::<Vec<_>>())
                .context("could not record operations")?,
        );
        self.write(&mut journal, object_type, id, Some(&patched), meta)?;
        debug!(object_type, id, operations = ops.len(), "patched");
        Ok(self.echo(schema, patched))
    }

    async fn delete(&self, object_type: &str, id: &str) -> Result<(), StoreError> {
        let mut journal = self.journal.lock().await;
        let schema = self.schema(object_type)?;
        if schema.lifecycle() == Lifecycle::AdoptOnly {
            return Err(anyhow!("objects of type '{}' cannot be deleted", object_type).into());
        }
        if self.read(&journal, object_type, id)?.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.write(&mut journal, object_type, id, None, event("delete"))?;
        debug!(object_type, id, "deleted");
        Ok(())
    }
}

fn event(name: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("event".to_string(), json!(name));
    meta
}

fn rejected(e: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Other(anyhow::Error::new(e).context("rejected by server"))
}

fn check_applicable<'a>(
    schema: &ObjectSchema,
    discriminator: &str,
    attributes: impl IntoIterator<Item = &'a str>,
) -> Result<(), StoreError> {
    for attribute in attributes {
        if schema.rule(discriminator, attribute).map_err(rejected)?.is_none() {
            return Err(anyhow!(
                "attribute '{}' is not valid for '{}' objects",
                attribute,
                discriminator
            )
            .into());
        }
    }
    Ok(())
}

/// Fill unset server-computed attributes with their defaults.
fn with_computed_defaults(
    schema: &ObjectSchema,
    instance: VariantInstance,
) -> Result<VariantInstance, dsconverge_core::ValidationError> {
    let defaults: Vec<(String, AttributeValue)> = schema
        .rules_for(instance.discriminator())?
        .filter(|rule| rule.server_computed && instance.get(&rule.name).is_null())
        .filter_map(|rule| rule.default.clone().map(|d| (rule.name.clone(), d)))
        .collect();
    Ok(instance.with_attributes(defaults))
}

struct Singleton {
    object_type: String,
    discriminator: String,
    id: String,
    attributes: Map<String, Value>,
}

fn singleton(object_type: &str, discriminator: &str, id: &str, attributes: Value) -> Singleton {
    Singleton {
        object_type: object_type.to_string(),
        discriminator: discriminator.to_string(),
        id: id.to_string(),
        attributes: match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    }
}

/// The objects every server starts with.
fn singletons() -> Vec<Singleton> {
    vec![
        singleton(
            "work-queue",
            "high-throughput",
            "Work Queue",
            json!({
                "num_queues": 2,
                "max_work_queue_capacity": 1000,
                "monitor_queue_time": true,
                "max_queue_time": "0 ms",
            }),
        ),
        singleton(
            "root-dn",
            "root-dn",
            "Root DN",
            json!({
                "default_root_privilege_name": [
                    "backend-backup",
                    "backend-restore",
                    "bypass-acl",
                    "config-read",
                    "config-write",
                ],
            }),
        ),
        singleton(
            "consent-service",
            "consent-service",
            "Consent Service",
            json!({ "enabled": false }),
        ),
    ]
}
