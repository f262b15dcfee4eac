//! Device repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for device operations.
#[async_trait]
pub trait DeviceRepo: Send + Sync {
    /// Register a device; registering an existing device is an `AlreadyExists` error.
    async fn register_device(
        &self,
        device_id: &str,
        registered_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Whether the device is registered.
    async fn device_exists(&self, device_id: &str) -> MetadataResult<bool>;
}
