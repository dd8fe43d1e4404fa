//! Shared application state

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::analytics::{AnalyticsCounter, AnalyticsStore, CounterOptions, SqliteAnalyticsStore};
use crate::blob::{BlobStore, HttpBlobStore, UrlBlobStore};
use crate::catalog::{CachedRepository, CatalogRepository, CatalogStore, SqliteCatalog};
use crate::classification::ClassificationEngine;
use crate::config::{RegistryConfig, analytics_db_path};
use crate::error::RegistryError;
use crate::resolution::ResolutionEngine;
use crate::version::PrereleasePolicy;

/// Everything a request handler needs, built once from a config snapshot
pub struct AppState {
    pub config: Arc<RegistryConfig>,
    pub catalog: Arc<CatalogStore>,
    pub resolution: ResolutionEngine,
    pub classification: ClassificationEngine,
    pub analytics: AnalyticsCounter,
    pub blob_store: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("catalog", &"<CatalogStore>")
            .field("analytics", &"<AnalyticsCounter>")
            .field("blob_store", &"<BlobStore>")
            .finish()
    }
}

impl AppState {
    /// Wire the engines over the given collaborators
    ///
    /// Starts the analytics writer, so this must run inside a tokio runtime.
    pub fn new(
        config: RegistryConfig,
        repository: Arc<dyn CatalogRepository>,
        analytics_store: Arc<dyn AnalyticsStore>,
        blob_store: Arc<dyn BlobStore>,
    ) -> (Self, JoinHandle<()>) {
        let config = Arc::new(config);
        let catalog = Arc::new(CatalogStore::new(
            repository,
            config.namespaces.case_insensitive,
        ));
        let resolution = ResolutionEngine::new(
            catalog.clone(),
            PrereleasePolicy::new(config.resolution.allow_prerelease_fallback),
        );
        let classification = ClassificationEngine::new(
            config.classification.clone(),
            config.namespaces.case_insensitive,
        );
        let (analytics, writer) =
            AnalyticsCounter::spawn(analytics_store, CounterOptions::from(&config.analytics));

        let state = Self {
            config,
            catalog,
            resolution,
            classification,
            analytics,
            blob_store,
        };
        (state, writer)
    }

    /// Open the SQLite stores and blob store described by `config`
    pub fn open(config: RegistryConfig) -> Result<(Self, JoinHandle<()>), RegistryError> {
        let catalog_path = config.database.resolved_path();
        if let Some(parent) = catalog_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RegistryError::BackendUnavailable(format!(
                    "cannot create data directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let catalog = SqliteCatalog::new(&catalog_path)?;
        let repository: Arc<dyn CatalogRepository> = if config.cache.enabled {
            Arc::new(CachedRepository::new(catalog))
        } else {
            Arc::new(catalog)
        };

        let analytics_store = Arc::new(SqliteAnalyticsStore::new(&analytics_db_path(
            &catalog_path,
        ))?);

        let blob_config = &config.blob_store;
        let blob_store: Arc<dyn BlobStore> = if blob_config.verify_existence {
            Arc::new(HttpBlobStore::new(blob_config.base_url.clone()))
        } else {
            Arc::new(UrlBlobStore::new(blob_config.base_url.clone()))
        };

        info!(
            "Opened registry state (catalog {:?}, cache {})",
            catalog_path, config.cache.enabled
        );
        Ok(Self::new(config, repository, analytics_store, blob_store))
    }
}
