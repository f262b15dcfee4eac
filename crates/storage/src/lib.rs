//! Where logvault keeps its bytes.
//!
//! Hourly log archives are read back through ordered, resumable listings
//! ([`ObjectStoreListStreamExt::list_stream_ext`]) and whole-object reads.
//! Device uploads are written through [`StreamingUpload`]. Both the local
//! filesystem and S3-compatible buckets implement [`ObjectStore`].

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{
    KeyStream, ListingOptions, ListingPage, ObjectStore, ObjectStoreListStreamExt, PageStream,
    StreamingUpload,
};

use logvault_core::config::StorageConfig;
use std::sync::Arc;

/// Open the backend named by `config`.
///
/// Filesystem roots are created when missing. S3 clients are built without
/// touching the network; call [`ObjectStore::health_check`] to reach them.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    let store: Arc<dyn ObjectStore> = match config {
        StorageConfig::Filesystem { path } => Arc::new(FilesystemBackend::new(path).await?),
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => Arc::new(
            S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?,
        ),
    };

    tracing::info!(
        backend = store.backend_name(),
        root = %store.locator(""),
        "object store ready"
    );
    Ok(store)
}
