//! Secrets the store accepts but never returns.
//!
//! After every round trip the observed instance is patched with the value
//! this side believes the server holds, so that an unchanged secret does not
//! show up as a difference on every cycle. The engine cannot observe an
//! obscured attribute that was changed on the server by someone else; such
//! drift goes unnoticed.

use crate::{
    error::ValidationError,
    instance::VariantInstance,
    schema::ObjectSchema,
    value::{AttributeValue, NULL},
};

/// The value to record for an obscured attribute after a round trip: the
/// desired value if the plan knows it (it has just been sent, or was already
/// in place), otherwise whatever was known before.
pub fn resolve_obscured(desired: &AttributeValue, last_known: &AttributeValue) -> AttributeValue {
    match (desired, last_known) {
        (AttributeValue::Unknown, AttributeValue::Unknown) => AttributeValue::Null,
        (AttributeValue::Unknown, known) => known.clone(),
        (desired, _) => desired.clone(),
    }
}

/// Fold a store response into a new observed instance, replacing whatever
/// the store echoed for obscured attributes.
pub fn absorb(
    schema: &ObjectSchema,
    desired: &VariantInstance,
    observed: VariantInstance,
    last_known: Option<&VariantInstance>,
) -> Result<VariantInstance, ValidationError> {
    let discriminator = observed.discriminator().to_string();
    let resolved: Vec<_> = schema
        .rules_for(&discriminator)?
        .filter(|rule| rule.obscured)
        .map(|rule| {
            let previous = last_known
                .map(|instance| instance.get(&rule.name))
                .unwrap_or(&NULL);
            (
                rule.name.clone(),
                resolve_obscured(desired.get(&rule.name), previous),
            )
        })
        .collect();
    Ok(observed.with_attributes(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog, differ::Differ};

    fn pkcs11(pin: AttributeValue) -> VariantInstance {
        VariantInstance::new("pkcs11", "HSM")
            .with_attribute("enabled", AttributeValue::bool(true))
            .with_attribute("pkcs11_provider_class", AttributeValue::string("sun.security.pkcs11.SunPKCS11"))
            .with_attribute("key_store_pin", pin)
    }

    #[test]
    fn test_resolve() {
        let secret = AttributeValue::string("secret");
        assert_eq!(resolve_obscured(&AttributeValue::Unknown, &secret), secret);
        assert_eq!(
            resolve_obscured(&AttributeValue::string("new"), &secret),
            AttributeValue::string("new")
        );
        assert_eq!(
            resolve_obscured(&AttributeValue::Null, &secret),
            AttributeValue::Null
        );
        assert_eq!(
            resolve_obscured(&AttributeValue::Unknown, &AttributeValue::Unknown),
            AttributeValue::Null
        );
    }

    #[test]
    fn test_secret_kept_when_unknown() {
        let catalog = catalog::builtin().unwrap();
        let schema = catalog.get("key-manager-provider").unwrap();
        let desired = pkcs11(AttributeValue::Unknown);
        let last_known = pkcs11(AttributeValue::string("secret"));
        // the server hides the pin
        let read = pkcs11(AttributeValue::Null);

        let observed = absorb(schema, &desired, read, Some(&last_known)).unwrap();
        assert_eq!(observed.get("key_store_pin"), &AttributeValue::string("secret"));

        let ops = Differ::new(schema)
            .diff_with_last_known(&desired, &observed, Some(&last_known))
            .unwrap();
        assert!(ops.iter().all(|op| op.path.attribute() != "key_store_pin"));
    }

    #[test]
    fn test_repeated_cycles_stay_quiet() {
        let catalog = catalog::builtin().unwrap();
        let schema = catalog.get("key-manager-provider").unwrap();
        let differ = Differ::new(schema);
        let desired = pkcs11(AttributeValue::Unknown);
        let mut last_known = pkcs11(AttributeValue::string("secret"));
        for echoed in [
            AttributeValue::Null,
            AttributeValue::string("******"),
            AttributeValue::string("something else"),
        ] {
            let read = pkcs11(echoed);
            let observed = absorb(schema, &desired, read, Some(&last_known)).unwrap();
            let ops = differ
                .diff_with_last_known(&desired, &observed, Some(&last_known))
                .unwrap();
            assert_eq!(ops, vec![]);
            last_known = observed;
        }
        assert_eq!(last_known.get("key_store_pin"), &AttributeValue::string("secret"));
    }

    #[test]
    fn test_non_obscured_untouched() {
        let catalog = catalog::builtin().unwrap();
        let schema = catalog.get("key-manager-provider").unwrap();
        let desired = pkcs11(AttributeValue::string("pin")).with_attribute("enabled", AttributeValue::bool(false));
        let read = pkcs11(AttributeValue::Null);
        let observed = absorb(schema, &desired, read, None).unwrap();
        assert_eq!(observed.get("enabled"), &AttributeValue::bool(true));
        assert_eq!(observed.get("key_store_pin"), &AttributeValue::string("pin"));
    }
}
