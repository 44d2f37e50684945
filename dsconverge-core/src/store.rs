use async_trait::async_trait;

use crate::{error::StoreError, instance::VariantInstance, operation::Operation};

/// The remote side: whatever actually holds the directory server's
/// configuration.
///
/// Implementations own transport, authentication, retries and the wire
/// format. They must never return the true value of an obscured attribute
/// and must apply a patch completely or not at all. Objects that do not exist
/// are reported as [`StoreError::NotFound`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, object_type: &str, id: &str) -> Result<VariantInstance, StoreError>;

    async fn create(
        &self,
        object_type: &str,
        instance: &VariantInstance,
    ) -> Result<VariantInstance, StoreError>;

    async fn patch(
        &self,
        object_type: &str,
        id: &str,
        ops: &[Operation],
    ) -> Result<VariantInstance, StoreError>;

    async fn delete(&self, object_type: &str, id: &str) -> Result<(), StoreError>;
}
