//! The object types this engine knows how to manage.

use std::collections::BTreeMap;

use crate::{
    error::ValidationError,
    schema::{AttributeRule, Lifecycle, ObjectSchema, SchemaError},
    value::AttributeValue,
    version::Version,
};

/// Object schemas by type name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    schemas: BTreeMap<String, ObjectSchema>,
}

impl Catalog {
    pub fn new(schemas: impl IntoIterator<Item = ObjectSchema>) -> Result<Self, SchemaError> {
        let mut catalog = Catalog::default();
        for schema in schemas {
            catalog.insert(schema)?;
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, schema: ObjectSchema) -> Result<(), SchemaError> {
        let object_type = schema.object_type().to_string();
        if self.schemas.contains_key(&object_type) {
            return Err(SchemaError::DuplicateObjectType(object_type));
        }
        self.schemas.insert(object_type, schema);
        Ok(())
    }

    pub fn get(&self, object_type: &str) -> Result<&ObjectSchema, ValidationError> {
        self.schemas
            .get(object_type)
            .ok_or_else(|| ValidationError::UnknownObjectType {
                object_type: object_type.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.schemas.values()
    }
}

/// The built-in catalog.
pub fn builtin() -> Result<Catalog, SchemaError> {
    Catalog::new([
        password_storage_scheme()?,
        key_manager_provider()?,
        work_queue()?,
        root_dn()?,
        consent_service()?,
    ])
}

fn password_storage_scheme() -> Result<ObjectSchema, SchemaError> {
    const SALTED: [&str; 3] = ["salted-sha256", "pbkdf2", "argon2"];
    ObjectSchema::builder("password-storage-scheme", Lifecycle::Creatable)
        .variant("clear")
        .variant("salted-sha256")
        .variant("pbkdf2")
        .variant_since("argon2", Version::new(9, 1, 0, 0))
        .variant("third-party")
        .attribute(AttributeRule::string("description"))
        .attribute(AttributeRule::bool("enabled").required())
        .attribute(AttributeRule::int("salt_length_bytes").only_for(SALTED))
        .attribute(AttributeRule::int("iteration_count").only_for(["pbkdf2", "argon2"]))
        .attribute(AttributeRule::int("parallelism_factor").only_for(["argon2"]))
        .attribute(AttributeRule::int("memory_usage_kb").only_for(["argon2"]))
        .attribute(
            AttributeRule::int("derived_key_length_bytes")
                .only_for(["pbkdf2", "argon2"])
                .min_version(Version::new(9, 2, 0, 0)),
        )
        .attribute(
            AttributeRule::bool("max_password_length_enforced")
                .only_for(SALTED)
                .min_version(Version::new(9, 2, 0, 0))
                .default_value(AttributeValue::bool(false)),
        )
        .attribute(
            AttributeRule::string("extension_class")
                .only_for(["third-party"])
                .required(),
        )
        .attribute(AttributeRule::string_set("extension_argument").only_for(["third-party"]))
        .build()
}

fn key_manager_provider() -> Result<ObjectSchema, SchemaError> {
    ObjectSchema::builder("key-manager-provider", Lifecycle::Creatable)
        .variant("file-based")
        .variant("pkcs11")
        .variant("third-party")
        .attribute(AttributeRule::string("description"))
        .attribute(AttributeRule::bool("enabled").required())
        .attribute(
            AttributeRule::string("key_store_file")
                .only_for(["file-based"])
                .required(),
        )
        .attribute(AttributeRule::string("key_store_type").only_for(["file-based"]))
        .attribute(
            AttributeRule::string("key_store_pin")
                .only_for(["file-based", "pkcs11"])
                .obscured(),
        )
        .attribute(AttributeRule::string("key_store_pin_file").only_for(["file-based", "pkcs11"]))
        .attribute(
            AttributeRule::string("key_store_pin_environment_variable")
                .only_for(["file-based", "pkcs11"]),
        )
        .attribute(AttributeRule::string("private_key_pin").only_for(["file-based"]).obscured())
        .attribute(AttributeRule::string("pkcs11_provider_class").only_for(["pkcs11"]))
        .attribute(AttributeRule::string("pkcs11_provider_configuration_file").only_for(["pkcs11"]))
        .attribute(AttributeRule::string("pkcs11_key_store_type").only_for(["pkcs11"]))
        .attribute(
            AttributeRule::string("pkcs11_max_cache_duration")
                .only_for(["pkcs11"])
                .min_version(Version::new(9, 2, 0, 1)),
        )
        .attribute(
            AttributeRule::string("extension_class")
                .only_for(["third-party"])
                .required(),
        )
        .attribute(AttributeRule::string_set("extension_argument").only_for(["third-party"]))
        .build()
}

fn work_queue() -> Result<ObjectSchema, SchemaError> {
    ObjectSchema::builder("work-queue", Lifecycle::AdoptOnly)
        .variant("high-throughput")
        .attribute(
            AttributeRule::int("num_worker_threads")
                .server_computed()
                .default_value(AttributeValue::int(0)),
        )
        .attribute(
            AttributeRule::int("num_write_worker_threads")
                .server_computed()
                .default_value(AttributeValue::int(0)),
        )
        .attribute(AttributeRule::int("num_administrative_session_worker_threads"))
        .attribute(AttributeRule::int("num_queues"))
        .attribute(AttributeRule::int("max_work_queue_capacity"))
        .attribute(AttributeRule::bool("monitor_queue_time"))
        .attribute(AttributeRule::string("max_queue_time"))
        .attribute(
            AttributeRule::int("expensive_operation_check_interval")
                .min_version(Version::new(9, 1, 0, 0)),
        )
        .build()
}

fn root_dn() -> Result<ObjectSchema, SchemaError> {
    ObjectSchema::builder("root-dn", Lifecycle::AdoptOnly)
        .variant("root-dn")
        .attribute(AttributeRule::string_set("default_root_privilege_name"))
        .build()
}

fn consent_service() -> Result<ObjectSchema, SchemaError> {
    ObjectSchema::builder("consent-service", Lifecycle::AdoptOnly)
        .variant("consent-service")
        .attribute(AttributeRule::bool("enabled"))
        .attribute(AttributeRule::string("base_dn"))
        .attribute(AttributeRule::string("bind_dn"))
        .attribute(AttributeRule::string_set("consent_record_identity_mapper"))
        .attribute(AttributeRule::string_set("service_account_dn"))
        .attribute(AttributeRule::string("unprivileged_consent_scope"))
        .attribute(AttributeRule::string("privileged_consent_scope"))
        .attribute(
            AttributeRule::int("search_size_limit")
                .min_version(Version::new(9, 2, 0, 0))
                .default_value(AttributeValue::int(100)),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_builds() {
        let catalog = builtin().unwrap();
        let types: Vec<_> = catalog.iter().map(|s| s.object_type()).collect();
        assert_eq!(
            types,
            vec![
                "consent-service",
                "key-manager-provider",
                "password-storage-scheme",
                "root-dn",
                "work-queue"
            ]
        );
    }

    #[test]
    fn test_unknown_object_type() {
        let catalog = builtin().unwrap();
        assert_eq!(
            catalog.get("certificate-mapper").unwrap_err(),
            ValidationError::UnknownObjectType {
                object_type: "certificate-mapper".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_object_type() {
        let schema = root_dn().unwrap();
        assert_eq!(
            Catalog::new([schema.clone(), schema]).unwrap_err(),
            SchemaError::DuplicateObjectType("root-dn".to_string())
        );
    }

    #[test]
    fn test_lifecycles() {
        let catalog = builtin().unwrap();
        for (object_type, lifecycle) in [
            ("password-storage-scheme", Lifecycle::Creatable),
            ("key-manager-provider", Lifecycle::Creatable),
            ("work-queue", Lifecycle::AdoptOnly),
            ("root-dn", Lifecycle::AdoptOnly),
            ("consent-service", Lifecycle::AdoptOnly),
        ] {
            assert_eq!(catalog.get(object_type).unwrap().lifecycle(), lifecycle);
        }
    }

    #[test]
    fn test_secrets_are_obscured() {
        let catalog = builtin().unwrap();
        let schema = catalog.get("key-manager-provider").unwrap();
        let rule = schema.rule("pkcs11", "key_store_pin").unwrap().unwrap();
        assert!(rule.obscured);
        assert!(schema.rule("third-party", "key_store_pin").unwrap().is_none());
    }
}
