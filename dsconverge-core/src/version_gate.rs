use crate::{
    error::ValidationError,
    schema::{AttributeRule, Variant},
    value::AttributeValue,
    version::Version,
};

/// Reject `value` for `rule` when the server is too old to know the
/// attribute.
///
/// Only values that would actually be sent count: `Null` and the rule's
/// default are fine on any server. `Unknown` counts as present, since it will
/// be a concrete value by the time it is applied.
pub fn check(
    server_version: &Version,
    rule: &AttributeRule,
    value: &AttributeValue,
) -> Result<(), ValidationError> {
    let Some(min_version) = rule.min_version else {
        return Ok(());
    };
    if *server_version >= min_version || value.is_null() || rule.default.as_ref() == Some(value) {
        return Ok(());
    }
    Err(ValidationError::UnsupportedOnServerVersion {
        attribute: rule.name.clone(),
        min_version,
        server_version: *server_version,
    })
}

pub fn check_variant(server_version: &Version, variant: &Variant) -> Result<(), ValidationError> {
    match variant.min_version {
        Some(min_version) if *server_version < min_version => {
            Err(ValidationError::VariantUnsupportedOnServerVersion {
                discriminator: variant.name.clone(),
                min_version,
                server_version: *server_version,
            })
        }
        _ => Ok(()),
    }
}
