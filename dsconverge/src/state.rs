use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use dsconverge_core::{ObjectSchema, VariantInstance};
use dsconverge_store_local::Journal;
use serde::Deserialize;
use serde::Deserializer;
use serde_json::Value;

const STATE_TYPE: &str = "dsconvergeState";

/// The root of a state file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct State {
    /// Last converged instance of every managed object, keyed by
    /// `<object type>/<id>`.
    objects: BTreeMap<String, Value>,

    #[serde(deserialize_with = "type_is_dsconverge_state")]
    _type: String,
}

fn type_is_dsconverge_state<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == STATE_TYPE {
        Ok(s)
    } else {
        Err(serde::de::Error::custom(format!(
            "unexpected _type in dsconverge state: expected '{}', got '{}'",
            STATE_TYPE, s
        )))
    }
}

fn key(object_type: &str, id: &str) -> String {
    format!("{}/{}", object_type, id)
}

/// The objects under management, persisted as an event log.
pub struct ManagedState {
    journal: Journal,
    state: State,
}

impl ManagedState {
    /// Open the state file, starting an empty one if there is none.
    pub fn open(path: &Path) -> Result<ManagedState> {
        let journal = Journal::open_or_create(path, || {
            serde_json::json!({ "_type": STATE_TYPE, "objects": {} })
        })?;
        let state = serde_json::from_value(journal.document().clone())
            .with_context(|| format!("Could not read state file {}", path.display()))?;
        Ok(ManagedState { journal, state })
    }

    /// The instance recorded by the last successful reconciliation.
    pub fn get(&self, schema: &ObjectSchema, id: &str) -> Result<Option<VariantInstance>> {
        let Some(value) = self.state.objects.get(&key(schema.object_type(), id)) else {
            return Ok(None);
        };
        let instance = VariantInstance::from_json(schema, value).with_context(|| {
            format!(
                "Could not read the state of {} '{}'",
                schema.object_type(),
                id
            )
        })?;
        Ok(Some(instance))
    }

    pub fn contains(&self, object_type: &str, id: &str) -> bool {
        self.state.objects.contains_key(&key(object_type, id))
    }

    /// `(object type, id)` of every managed object.
    pub fn managed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.state.objects.keys().filter_map(|k| k.split_once('/'))
    }

    pub fn record(&mut self, object_type: &str, instance: &VariantInstance, event: &str) -> Result<()> {
        let mut state = self.state.clone();
        state
            .objects
            .insert(key(object_type, instance.id()), instance.to_json());
        self.save(state, object_type, instance.id(), event)
    }

    pub fn forget(&mut self, object_type: &str, id: &str, event: &str) -> Result<()> {
        let mut state = self.state.clone();
        state.objects.remove(&key(object_type, id));
        self.save(state, object_type, id, event)
    }

    fn save(&mut self, state: State, object_type: &str, id: &str, event: &str) -> Result<()> {
        self.journal.record(
            serde_json::to_value(&state)?,
            serde_json::json!({ "event": event, "objectType": object_type, "id": id }),
        )?;
        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsconverge_core::{catalog, AttributeValue};

    #[test]
    fn test_state_type_checked() {
        let ok = serde_json::json!({"_type": "dsconvergeState", "objects": {}});
        serde_json::from_value::<State>(ok).unwrap();
        let wrong = serde_json::json!({"_type": "dsconvergeServer", "objects": {}});
        assert!(serde_json::from_value::<State>(wrong).is_err());
    }

    #[test]
    fn test_record_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let catalog = catalog::builtin().unwrap();
        let schema = catalog.get("password-storage-scheme").unwrap();
        let clear = VariantInstance::new("clear", "Clear/Legacy")
            .with_attribute("enabled", AttributeValue::bool(true));

        let mut state = ManagedState::open(&path).unwrap();
        assert_eq!(state.get(schema, "Clear/Legacy").unwrap(), None);
        state.record(schema.object_type(), &clear, "apply").unwrap();
        drop(state);

        let mut state = ManagedState::open(&path).unwrap();
        assert_eq!(state.get(schema, "Clear/Legacy").unwrap(), Some(clear));
        assert_eq!(
            state.managed().collect::<Vec<_>>(),
            vec![("password-storage-scheme", "Clear/Legacy")]
        );
        state
            .forget(schema.object_type(), "Clear/Legacy", "destroy")
            .unwrap();
        assert!(!state.contains(schema.object_type(), "Clear/Legacy"));
    }

    #[test]
    fn test_refuses_server_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        Journal::create(
            &path,
            serde_json::json!({"_type": "dsconvergeServer", "version": "9.2.0.0", "objects": {}}),
        )
        .unwrap();
        assert!(ManagedState::open(&path).is_err());
    }
}
