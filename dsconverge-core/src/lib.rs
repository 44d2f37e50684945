//! Declarative configuration of a directory server.
//!
//! The caller describes each configuration object as a [`VariantInstance`];
//! a [`Reconciler`] validates it against the object type's [`ObjectSchema`]
//! and the server version, reads or creates the object through a
//! [`RemoteStore`] and sends the minimal patch that converges it.

pub mod catalog;
pub mod differ;
pub mod error;
pub mod instance;
pub mod obscured;
pub mod operation;
pub mod reconciler;
pub mod schema;
pub mod store;
pub mod value;
pub mod version;
pub mod version_gate;

pub use catalog::Catalog;
pub use differ::Differ;
pub use error::{ConsistencyError, Error, Result, StoreError, ValidationError};
pub use instance::VariantInstance;
pub use operation::{AttributePath, Operation, OperationKind};
pub use reconciler::{Planned, Reconciled, Reconciler, Stage};
pub use schema::{AttributeRule, Lifecycle, ObjectSchema};
pub use store::RemoteStore;
pub use value::{AttributeValue, Scalar, ValueKind};
pub use version::Version;
