//! The lifecycle state machine shared by every object type.
//!
//! ```text
//! Start -> Validated -> Created | Adopted -> Converged -> Deleted | Abandoned
//! ```
//!
//! Validation happens before the store is contacted. Creatable objects
//! without previous state are created; everything else is read. The
//! difference between the plan and what was read is then sent as a single
//! patch. Nothing is retried: a failed cycle leaves the previous state as it
//! was, and the caller runs the whole cycle again when it sees fit.

use std::fmt::Display;

use tracing::{debug, info, info_span, warn, Instrument as _};

use crate::{
    differ::Differ,
    error::{ConsistencyError, Error, Result, StoreError, ValidationError},
    instance::VariantInstance,
    obscured,
    operation::Operation,
    schema::{self, Lifecycle, ObjectSchema},
    store::RemoteStore,
    version::Version,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Validated,
    Adopted,
    Created,
    Converged,
    Deleted,
    Abandoned,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Start => "start",
            Stage::Validated => "validation",
            Stage::Adopted => "adoption",
            Stage::Created => "creation",
            Stage::Converged => "convergence",
            Stage::Deleted => "deletion",
            Stage::Abandoned => "abandonment",
        };
        write!(f, "{}", s)
    }
}

/// The outcome of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The new state, with obscured attributes filled in.
    pub observed: VariantInstance,
    /// What was patched after creation or adoption; empty when nothing
    /// needed to change.
    pub applied: Vec<Operation>,
    /// [`Stage::Created`] or [`Stage::Adopted`].
    pub entry: Stage,
}

/// What a cycle would do, without doing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    Create { request: VariantInstance },
    Update {
        observed: VariantInstance,
        ops: Vec<Operation>,
    },
    NoChanges { observed: VariantInstance },
}

/// Reconciles objects of one type against one store.
///
/// Holds no mutable state; independent objects can be reconciled
/// concurrently with separate (or the same) reconcilers.
pub struct Reconciler<'a> {
    store: &'a dyn RemoteStore,
    schema: &'a ObjectSchema,
    server_version: Version,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn RemoteStore, schema: &'a ObjectSchema, server_version: Version) -> Self {
        Reconciler {
            store,
            schema,
            server_version,
        }
    }

    pub fn schema(&self) -> &ObjectSchema {
        self.schema
    }

    /// Plan-time validation against the schema and the server version.
    pub fn validate(&self, desired: &VariantInstance) -> Result<(), ValidationError> {
        schema::validate(self.schema, desired, &self.server_version)
    }

    /// Run one cycle for `desired`. `existing` is the state recorded by the
    /// previous successful cycle, if any; it also supplies the last known
    /// values of obscured attributes.
    pub async fn reconcile(
        &self,
        desired: &VariantInstance,
        existing: Option<&VariantInstance>,
    ) -> Result<Reconciled> {
        let span = info_span!(
            "reconcile",
            object_type = self.schema.object_type(),
            id = desired.id()
        );
        self.run_cycle(desired, existing).instrument(span).await
    }

    async fn run_cycle(
        &self,
        desired: &VariantInstance,
        existing: Option<&VariantInstance>,
    ) -> Result<Reconciled> {
        self.validate_transition(desired, existing)?;
        debug!(stage = %Stage::Validated);

        let (entry, observed, last_known) = self.establish(desired, existing).await?;
        debug!(stage = %entry);

        let ops = Differ::new(self.schema).diff_with_last_known(
            desired,
            &observed,
            last_known.as_ref(),
        )?;
        if ops.is_empty() {
            let observed = obscured::absorb(self.schema, desired, observed, last_known.as_ref())?;
            info!("no changes");
            return Ok(Reconciled {
                observed,
                applied: ops,
                entry,
            });
        }

        for op in &ops {
            debug!(operation = %op);
        }
        info!(operations = ops.len(), "patching");
        let response = match self
            .store
            .patch(self.schema.object_type(), desired.id(), &ops)
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(Error::remote(Stage::Converged, desired.id(), ops, e)),
        };
        let observed = obscured::absorb(self.schema, desired, response, last_known.as_ref())?;
        Ok(Reconciled {
            observed,
            applied: ops,
            entry,
        })
    }

    /// Read or create the object. Returns the entry stage, the observed
    /// instance and the last known state to compare obscured attributes with.
    async fn establish(
        &self,
        desired: &VariantInstance,
        existing: Option<&VariantInstance>,
    ) -> Result<(Stage, VariantInstance, Option<VariantInstance>)> {
        let object_type = self.schema.object_type();
        let id = desired.id();
        match (self.schema.lifecycle(), existing) {
            (Lifecycle::Creatable, None) => self.create(desired).await,
            (Lifecycle::Creatable, Some(previous)) => match self.store.get(object_type, id).await {
                Ok(observed) => Ok((Stage::Adopted, observed, Some(previous.clone()))),
                Err(StoreError::NotFound(_)) => {
                    warn!("object is gone from the server; creating it again");
                    self.create(desired).await
                }
                Err(e) => Err(Error::remote(Stage::Adopted, id, vec![], e)),
            },
            (Lifecycle::AdoptOnly, previous) => {
                // A singleton that is missing is a hard error, there is
                // nothing to create.
                let observed = self
                    .store
                    .get(object_type, id)
                    .await
                    .map_err(|e| Error::remote(Stage::Adopted, id, vec![], e))?;
                Ok((Stage::Adopted, observed, previous.cloned()))
            }
        }
    }

    async fn create(
        &self,
        desired: &VariantInstance,
    ) -> Result<(Stage, VariantInstance, Option<VariantInstance>)> {
        schema::check_required(self.schema, desired)?;
        let request = self.creation_request(desired);
        info!("creating");
        let response = self
            .store
            .create(self.schema.object_type(), &request)
            .await
            .map_err(|e| {
                // a failed create reports its request as one replace per attribute
                let attempted = request
                    .attributes()
                    .map(|(name, value)| Operation::replace(name, value.clone()))
                    .collect();
                Error::remote(Stage::Created, desired.id(), attempted, e)
            })?;
        let observed = obscured::absorb(self.schema, desired, response, None)?;
        Ok((Stage::Created, observed.clone(), Some(observed)))
    }

    /// The known, client-settable attributes of `desired`.
    fn creation_request(&self, desired: &VariantInstance) -> VariantInstance {
        desired.clone().retain(|name, value| {
            !value.is_unknown()
                && !self
                    .schema
                    .declared_rule(name)
                    .is_some_and(|rule| rule.server_computed)
        })
    }

    fn validate_transition(
        &self,
        desired: &VariantInstance,
        existing: Option<&VariantInstance>,
    ) -> Result<()> {
        self.validate(desired)?;
        if let Some(previous) = existing {
            if previous.id() != desired.id() {
                return Err(ConsistencyError::MismatchedVariant {
                    desired_discriminator: desired.discriminator().to_string(),
                    desired_id: desired.id().to_string(),
                    observed_discriminator: previous.discriminator().to_string(),
                    observed_id: previous.id().to_string(),
                }
                .into());
            }
            if previous.discriminator() != desired.discriminator() {
                return Err(ValidationError::DiscriminatorChanged {
                    id: desired.id().to_string(),
                    from: previous.discriminator().to_string(),
                    to: desired.discriminator().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validate, read and diff, but change nothing.
    pub async fn plan(
        &self,
        desired: &VariantInstance,
        existing: Option<&VariantInstance>,
    ) -> Result<Planned> {
        self.validate_transition(desired, existing)?;
        let object_type = self.schema.object_type();
        let id = desired.id();
        let observed = match (self.schema.lifecycle(), existing) {
            (Lifecycle::Creatable, None) => None,
            (Lifecycle::Creatable, Some(_)) => match self.store.get(object_type, id).await {
                Ok(observed) => Some(observed),
                Err(StoreError::NotFound(_)) => None,
                Err(e) => return Err(Error::remote(Stage::Adopted, id, vec![], e)),
            },
            (Lifecycle::AdoptOnly, _) => Some(
                self.store
                    .get(object_type, id)
                    .await
                    .map_err(|e| Error::remote(Stage::Adopted, id, vec![], e))?,
            ),
        };
        let Some(observed) = observed else {
            schema::check_required(self.schema, desired)?;
            return Ok(Planned::Create {
                request: self.creation_request(desired),
            });
        };
        let ops = Differ::new(self.schema).diff_with_last_known(desired, &observed, existing)?;
        if ops.is_empty() {
            Ok(Planned::NoChanges { observed })
        } else {
            Ok(Planned::Update { observed, ops })
        }
    }

    /// Bring an object that already exists on the server under management.
    /// Obscured attributes are unknown to the result until the plan sets
    /// them.
    pub async fn import(&self, id: &str) -> Result<VariantInstance> {
        let observed = self
            .store
            .get(self.schema.object_type(), id)
            .instrument(info_span!(
                "import",
                object_type = self.schema.object_type(),
                id
            ))
            .await
            .map_err(|e| Error::remote(Stage::Converged, id, vec![], e))?;
        self.schema.variant(observed.discriminator())?;
        if let Some((name, _)) = observed.attributes().find(|(_, v)| v.is_unknown()) {
            return Err(ConsistencyError::UnknownObserved {
                attribute: name.to_string(),
            }
            .into());
        }
        Ok(observed)
    }

    /// Stop managing `id`. Creatable objects are deleted; an object that is
    /// already gone counts as deleted. Adopt-only objects are left alone.
    pub async fn delete(&self, id: &str) -> Result<Stage> {
        let object_type = self.schema.object_type();
        match self.schema.lifecycle() {
            Lifecycle::AdoptOnly => {
                info!(object_type, id, "abandoning management; the object stays on the server");
                Ok(Stage::Abandoned)
            }
            Lifecycle::Creatable => match self.store.delete(object_type, id).await {
                Ok(()) => {
                    info!(object_type, id, "deleted");
                    Ok(Stage::Deleted)
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(object_type, id, "already absent");
                    Ok(Stage::Deleted)
                }
                Err(e) => Err(Error::remote(Stage::Deleted, id, vec![], e)),
            },
        }
    }
}
