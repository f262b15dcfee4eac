//! Application state shared across handlers.

use logvault_core::config::AppConfig;
use logvault_metadata::MetadataStore;
use logvault_retrieval::WindowAssembler;
use logvault_storage::ObjectStore;
use std::sync::Arc;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    assembler: WindowAssembler,
}

impl AppState {
    /// Create application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let assembler = WindowAssembler::new(storage.clone(), &config.retrieval);
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            assembler,
        }
    }

    /// Assembler for window retrievals against the configured storage.
    pub fn assembler(&self) -> &WindowAssembler {
        &self.assembler
    }
}
