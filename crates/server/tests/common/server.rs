//! Server test utilities.

use super::fixtures::{archive_key, single_entry_zip};
use axum::body::Body;
use axum::http::{Request, Response};
use logvault_core::config::{AppConfig, MetadataConfig, StorageConfig};
use logvault_metadata::{MetadataStore, SqliteStore};
use logvault_server::{AppState, create_router};
use logvault_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(|local| local, modifier).await
    }

    /// Create a test server whose object store is produced by `wrap` from the
    /// temporary filesystem store.
    pub async fn with_store<W>(wrap: W) -> Self
    where
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        Self::build(wrap, |_| {}).await
    }

    async fn build<W, F>(wrap: W, modifier: F) -> Self
    where
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let local: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        let storage = wrap(local);

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem {
                path: storage_path,
            },
            metadata: MetadataConfig::Sqlite { path: db_path },
            ..Default::default()
        };
        // Keep failing-fetch tests fast.
        config.retrieval.max_fetch_attempts = 3;
        config.retrieval.retry_delay_ms = 1;
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }

    /// Store a one-entry archive for `prefix` at `ts` whose text is `contents`.
    pub async fn put_archive(&self, prefix: &str, ts: OffsetDateTime, contents: &str) -> String {
        let key = archive_key(prefix, ts);
        self.storage()
            .put(&key, single_entry_zip("log.txt", contents))
            .await
            .expect("Failed to store archive");
        key
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}
