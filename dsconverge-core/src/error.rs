//! Error taxonomy of the engine.
//!
//! - [`ValidationError`]: the plan is wrong. Always detected before any call
//!   to the remote store; reported verbatim.
//! - [`ConsistencyError`]: the driver handed the engine something it must
//!   never see. A bug, not a user-correctable condition.
//! - [`StoreError`]: whatever the remote store reported. The engine only
//!   interprets [`StoreError::NotFound`].

use thiserror::Error;

use crate::{operation::Operation, reconciler::Stage, version::Version};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown object type '{object_type}'")]
    UnknownObjectType { object_type: String },

    #[error("unknown variant '{discriminator}' for object type '{object_type}'")]
    UnknownVariant {
        object_type: String,
        discriminator: String,
    },

    #[error("attribute '{attribute}' is not applicable to variant '{discriminator}'")]
    AttributeNotApplicableToVariant {
        attribute: String,
        discriminator: String,
    },

    #[error("invalid value for attribute '{attribute}': expected {expected}, found {found}")]
    InvalidValue {
        attribute: String,
        expected: String,
        found: String,
    },

    #[error(
        "attribute '{attribute}' requires server version {min_version} or later, \
         but the server is running {server_version}"
    )]
    UnsupportedOnServerVersion {
        attribute: String,
        min_version: Version,
        server_version: Version,
    },

    #[error(
        "variant '{discriminator}' requires server version {min_version} or later, \
         but the server is running {server_version}"
    )]
    VariantUnsupportedOnServerVersion {
        discriminator: String,
        min_version: Version,
        server_version: Version,
    },

    #[error("attribute '{attribute}' is required to create a '{discriminator}' object")]
    MissingRequiredAttribute {
        attribute: String,
        discriminator: String,
    },

    #[error(
        "object '{id}' is managed as variant '{from}' and cannot be changed to '{to}' in place; \
         destroy it first"
    )]
    DiscriminatorChanged { id: String, from: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error(
        "cannot compare desired {desired_discriminator}/{desired_id} \
         with observed {observed_discriminator}/{observed_id}"
    )]
    MismatchedVariant {
        desired_discriminator: String,
        desired_id: String,
        observed_discriminator: String,
        observed_id: String,
    },

    #[error("observed value of attribute '{attribute}' is unknown")]
    UnknownObserved { attribute: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("internal consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error(
        "remote store failed during {stage} of object '{object_id}' \
         ({count} attempted operation(s))",
        count = .attempted.len()
    )]
    Remote {
        stage: Stage,
        object_id: String,
        /// The operations sent. A failed create lists its request, one
        /// replace per attribute.
        attempted: Vec<Operation>,
        #[source]
        source: StoreError,
    },
}

impl Error {
    pub(crate) fn remote(
        stage: Stage,
        object_id: &str,
        attempted: Vec<Operation>,
        source: StoreError,
    ) -> Self {
        Error::Remote {
            stage,
            object_id: object_id.to_string(),
            attempted,
            source,
        }
    }

    /// True if the error was raised before anything was sent to the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
