//! Metadata store abstraction for logvault.
//!
//! Lookups backing the HTTP surface: the time range of an ended meeting
//! instance, which can stand in for an explicit window; meeting start dates
//! and download tokens for upload URLs; and the set of registered devices
//! allowed to upload logs.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{EndedMeetingInstance, MeetingInstanceRow};
pub use repos::{DeviceRepo, DownloadTokenRepo, MeetingRepo};
pub use store::{MetadataStore, SqliteStore};

use logvault_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_sqlite_ok() {
        let dir = tempdir().unwrap();
        let config = MetadataConfig::Sqlite {
            path: dir.path().join("metadata.db"),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(!store.device_exists("dev1").await.unwrap());
    }
}
