//! Computes the operations that move an observed instance to a desired one.
//!
//! The result is minimal: scalars are replaced or removed, sets are patched
//! element by element. Operations come out in the schema's attribute
//! declaration order, then in element order, so that the same inputs always
//! produce the same patch.

use std::collections::BTreeSet;

use crate::{
    error::{ConsistencyError, Result},
    instance::VariantInstance,
    operation::Operation,
    schema::{AttributeRule, ObjectSchema},
    value::{AttributeValue, NULL},
};

pub struct Differ<'a> {
    schema: &'a ObjectSchema,
}

impl<'a> Differ<'a> {
    pub fn new(schema: &'a ObjectSchema) -> Self {
        Differ { schema }
    }

    /// Operations turning `observed` into `desired`.
    ///
    /// Obscured attributes are skipped: the server never echoes them, so the
    /// observed side says nothing about them.
    pub fn diff(
        &self,
        desired: &VariantInstance,
        observed: &VariantInstance,
    ) -> Result<Vec<Operation>> {
        self.diff_attributes(desired, observed, None)
    }

    /// Like [`Differ::diff`], but obscured attributes are compared with the
    /// value this side last sent (`last_known`) instead of the server's echo.
    /// A secret that is `Unknown` in the plan, or equal to what was sent
    /// before, produces no operation.
    pub fn diff_with_last_known(
        &self,
        desired: &VariantInstance,
        observed: &VariantInstance,
        last_known: Option<&VariantInstance>,
    ) -> Result<Vec<Operation>> {
        let empty;
        let last_known = match last_known {
            Some(instance) => instance,
            None => {
                empty = VariantInstance::new(desired.discriminator(), desired.id());
                &empty
            }
        };
        self.diff_attributes(desired, observed, Some(last_known))
    }

    fn diff_attributes(
        &self,
        desired: &VariantInstance,
        observed: &VariantInstance,
        last_known: Option<&VariantInstance>,
    ) -> Result<Vec<Operation>> {
        if desired.discriminator() != observed.discriminator() || desired.id() != observed.id() {
            return Err(ConsistencyError::MismatchedVariant {
                desired_discriminator: desired.discriminator().to_string(),
                desired_id: desired.id().to_string(),
                observed_discriminator: observed.discriminator().to_string(),
                observed_id: observed.id().to_string(),
            }
            .into());
        }
        if let Some((name, _)) = observed.attributes().find(|(_, v)| v.is_unknown()) {
            return Err(ConsistencyError::UnknownObserved {
                attribute: name.to_string(),
            }
            .into());
        }

        let mut ops = Vec::new();
        for rule in self.schema.rules_for(desired.discriminator())? {
            let want = desired.get(&rule.name);
            if want.is_unknown() {
                continue;
            }
            if rule.obscured {
                if let Some(last_known) = last_known {
                    let have = match last_known.get(&rule.name) {
                        AttributeValue::Unknown => &NULL,
                        v => v,
                    };
                    diff_value(rule, want, have, &mut ops);
                }
                continue;
            }
            if rule.server_computed && want.is_null() {
                continue;
            }
            diff_value(rule, want, observed.get(&rule.name), &mut ops);
        }
        Ok(ops)
    }
}

fn diff_value(
    rule: &AttributeRule,
    want: &AttributeValue,
    have: &AttributeValue,
    ops: &mut Vec<Operation>,
) {
    let name = &rule.name;
    match (want, have) {
        (AttributeValue::Set(..) | AttributeValue::Null, AttributeValue::Set(..))
        | (AttributeValue::Set(..), AttributeValue::Null) => {
            let wanted: BTreeSet<_> = want.elements().collect();
            let had: BTreeSet<_> = have.elements().collect();
            for element in wanted.union(&had) {
                match (wanted.contains(element), had.contains(element)) {
                    (true, false) => ops.push(Operation::add_element(name, (*element).clone())),
                    (false, true) => ops.push(Operation::remove_element(name, (*element).clone())),
                    _ => {}
                }
            }
        }
        (AttributeValue::Null, AttributeValue::Null) => {}
        (AttributeValue::Null, _) => ops.push(Operation::remove(name)),
        (w, h) if w == h => {}
        (w, _) => ops.push(Operation::replace(name, w.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog,
        error::Error,
        schema::{AttributeRule, Lifecycle},
        value::Scalar,
    };

    fn schemes() -> ObjectSchema {
        catalog::builtin()
            .unwrap()
            .get("password-storage-scheme")
            .unwrap()
            .clone()
    }

    fn third_party(args: &[&str]) -> VariantInstance {
        VariantInstance::new("third-party", "Custom")
            .with_attribute("enabled", AttributeValue::bool(true))
            .with_attribute("extension_class", AttributeValue::string("com.example.Scheme"))
            .with_attribute("extension_argument", AttributeValue::string_set(args.iter().copied()))
    }

    #[test]
    fn test_scenario_replace_scalar() {
        let schema = schemes();
        let desired =
            VariantInstance::new("clear", "Clear").with_attribute("enabled", AttributeValue::bool(true));
        let observed = VariantInstance::new("clear", "Clear")
            .with_attribute("enabled", AttributeValue::bool(false));
        let ops = Differ::new(&schema).diff(&desired, &observed).unwrap();
        assert_eq!(ops, vec![Operation::replace("enabled", AttributeValue::bool(true))]);
    }

    #[test]
    fn test_scenario_add_set_element() {
        let schema = schemes();
        let ops = Differ::new(&schema)
            .diff(&third_party(&["a=1", "b=2"]), &third_party(&["a=1"]))
            .unwrap();
        assert_eq!(
            ops,
            vec![Operation::add_element("extension_argument", Scalar::from("b=2"))]
        );
        assert_eq!(ops[0].value, Some(AttributeValue::string("b=2")));
    }

    #[test]
    fn test_identical_instances_produce_no_operations() {
        let schema = schemes();
        let differ = Differ::new(&schema);
        for instance in [
            third_party(&["a=1", "b=2"]),
            third_party(&[]),
            VariantInstance::new("clear", "Clear"),
            VariantInstance::new("pbkdf2", "PBKDF2")
                .with_attribute("enabled", AttributeValue::bool(true))
                .with_attribute("iteration_count", AttributeValue::int(10000))
                .with_attribute("description", AttributeValue::string("d")),
        ] {
            assert_eq!(differ.diff(&instance, &instance).unwrap(), vec![]);
            assert_eq!(
                differ
                    .diff_with_last_known(&instance, &instance, Some(&instance))
                    .unwrap(),
                vec![]
            );
        }
    }

    #[test]
    fn test_null_removes_scalar() {
        let schema = schemes();
        let desired =
            VariantInstance::new("clear", "Clear").with_attribute("enabled", AttributeValue::bool(true));
        let observed = desired
            .clone()
            .with_attribute("description", AttributeValue::string("old"));
        let ops = Differ::new(&schema).diff(&desired, &observed).unwrap();
        assert_eq!(ops, vec![Operation::remove("description")]);
    }

    #[test]
    fn test_null_set_removes_each_element() {
        let schema = schemes();
        let desired = third_party(&["a=1"]).with_attribute("extension_argument", AttributeValue::Null);
        let observed = third_party(&["a=1", "b=2"]);
        let ops = Differ::new(&schema).diff(&desired, &observed).unwrap();
        assert_eq!(
            ops,
            vec![
                Operation::remove_element("extension_argument", Scalar::from("a=1")),
                Operation::remove_element("extension_argument", Scalar::from("b=2")),
            ]
        );
        assert!(ops.iter().all(|op| op.value.is_none()));
    }

    #[test]
    fn test_set_changes_in_element_order() {
        let schema = schemes();
        let ops = Differ::new(&schema)
            .diff(&third_party(&["a", "c"]), &third_party(&["b", "c", "d"]))
            .unwrap();
        assert_eq!(
            ops,
            vec![
                Operation::add_element("extension_argument", Scalar::from("a")),
                Operation::remove_element("extension_argument", Scalar::from("b")),
                Operation::remove_element("extension_argument", Scalar::from("d")),
            ]
        );
    }

    #[test]
    fn test_operations_follow_declaration_order() {
        let schema = schemes();
        let desired = third_party(&["x"])
            .with_attribute("enabled", AttributeValue::bool(false))
            .with_attribute("description", AttributeValue::string("new"));
        let observed = third_party(&[]);
        let ops = Differ::new(&schema).diff(&desired, &observed).unwrap();
        let attributes: Vec<_> = ops.iter().map(|op| op.path.attribute()).collect();
        assert_eq!(
            attributes,
            vec!["description", "enabled", "extension_argument"]
        );
    }

    #[test]
    fn test_unknown_desired_is_skipped() {
        let schema = schemes();
        let desired = VariantInstance::new("clear", "Clear")
            .with_attribute("enabled", AttributeValue::Unknown);
        let observed = VariantInstance::new("clear", "Clear")
            .with_attribute("enabled", AttributeValue::bool(false));
        assert_eq!(Differ::new(&schema).diff(&desired, &observed).unwrap(), vec![]);
    }

    #[test]
    fn test_unknown_observed_is_a_consistency_error() {
        let schema = schemes();
        let desired = VariantInstance::new("clear", "Clear");
        let observed = VariantInstance::new("clear", "Clear")
            .with_attribute("enabled", AttributeValue::Unknown);
        assert!(matches!(
            Differ::new(&schema).diff(&desired, &observed),
            Err(Error::Consistency(ConsistencyError::UnknownObserved { .. }))
        ));
    }

    #[test]
    fn test_mismatched_variant() {
        let schema = schemes();
        let differ = Differ::new(&schema);
        let clear = VariantInstance::new("clear", "Clear");
        assert!(matches!(
            differ.diff(&clear, &VariantInstance::new("pbkdf2", "Clear")),
            Err(Error::Consistency(ConsistencyError::MismatchedVariant { .. }))
        ));
        assert!(matches!(
            differ.diff(&clear, &VariantInstance::new("clear", "Other")),
            Err(Error::Consistency(ConsistencyError::MismatchedVariant { .. }))
        ));
    }

    fn computed_schema() -> ObjectSchema {
        ObjectSchema::builder("work-queue", Lifecycle::AdoptOnly)
            .variant("high-throughput")
            .attribute(AttributeRule::int("num_worker_threads").server_computed())
            .attribute(AttributeRule::string("secret").obscured())
            .build()
            .unwrap()
    }

    #[test]
    fn test_server_computed_skipped_unless_pinned() {
        let schema = computed_schema();
        let differ = Differ::new(&schema);
        let observed = VariantInstance::new("high-throughput", "wq")
            .with_attribute("num_worker_threads", AttributeValue::int(8));
        let unpinned = VariantInstance::new("high-throughput", "wq");
        assert_eq!(differ.diff(&unpinned, &observed).unwrap(), vec![]);

        let pinned = unpinned.with_attribute("num_worker_threads", AttributeValue::int(16));
        assert_eq!(
            differ.diff(&pinned, &observed).unwrap(),
            vec![Operation::replace("num_worker_threads", AttributeValue::int(16))]
        );
    }

    #[test]
    fn test_obscured_ignores_server_echo() {
        let schema = computed_schema();
        let differ = Differ::new(&schema);
        let desired = VariantInstance::new("high-throughput", "wq")
            .with_attribute("secret", AttributeValue::string("s3cret"));
        let observed = VariantInstance::new("high-throughput", "wq")
            .with_attribute("secret", AttributeValue::string("******"));
        assert_eq!(differ.diff(&desired, &observed).unwrap(), vec![]);
    }

    #[test]
    fn test_obscured_against_last_known() {
        let schema = computed_schema();
        let differ = Differ::new(&schema);
        let observed = VariantInstance::new("high-throughput", "wq");
        let last_known = VariantInstance::new("high-throughput", "wq")
            .with_attribute("secret", AttributeValue::string("old"));

        let same = observed
            .clone()
            .with_attribute("secret", AttributeValue::string("old"));
        assert_eq!(
            differ
                .diff_with_last_known(&same, &observed, Some(&last_known))
                .unwrap(),
            vec![]
        );

        let changed = observed
            .clone()
            .with_attribute("secret", AttributeValue::string("new"));
        assert_eq!(
            differ
                .diff_with_last_known(&changed, &observed, Some(&last_known))
                .unwrap(),
            vec![Operation::replace("secret", AttributeValue::string("new"))]
        );

        let unknown = observed
            .clone()
            .with_attribute("secret", AttributeValue::Unknown);
        assert_eq!(
            differ
                .diff_with_last_known(&unknown, &observed, Some(&last_known))
                .unwrap(),
            vec![]
        );

        // nothing sent before: a known secret is sent once
        assert_eq!(
            differ.diff_with_last_known(&changed, &observed, None).unwrap(),
            vec![Operation::replace("secret", AttributeValue::string("new"))]
        );
    }

    #[test]
    fn test_round_trip() {
        let schema = schemes();
        let differ = Differ::new(&schema);
        let cases = [
            (third_party(&["a", "b"]), third_party(&["b", "c"])),
            (
                third_party(&["a"])
                    .with_attribute("extension_argument", AttributeValue::Null)
                    .with_attribute("description", AttributeValue::string("d")),
                third_party(&["x", "y"]),
            ),
            (
                third_party(&[]).with_attribute("enabled", AttributeValue::bool(false)),
                third_party(&["z"]).with_attribute("description", AttributeValue::string("gone")),
            ),
        ];
        for (desired, observed) in cases {
            let ops = differ.diff(&desired, &observed).unwrap();
            let converged = observed.apply(&ops);
            assert_eq!(converged, desired);
            assert_eq!(differ.diff(&desired, &converged).unwrap(), vec![]);
        }
    }
}
