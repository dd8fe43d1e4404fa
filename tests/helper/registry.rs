//! Registry test utilities

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use module_registry::analytics::SqliteAnalyticsStore;
use module_registry::blob::{BlobError, BlobStore, UrlBlobStore};
use module_registry::catalog::{
    ArtifactRef, CachedRepository, ModuleId, ModuleKind, PublishRequest, SqliteCatalog,
    StoredVersion, VersionMetadata,
};
use module_registry::config::RegistryConfig;
use module_registry::server::{AppState, router};

pub const BLOB_BASE_URL: &str = "https://blobs.example.com";

/// A registry wired over temporary SQLite databases
pub struct TestRegistry {
    _temp_dir: TempDir,
    pub state: Arc<AppState>,
    pub app: Router,
}

/// Blob store that never answers in time
pub struct StalledBlobStore;

#[async_trait]
impl BlobStore for StalledBlobStore {
    async fn locate(&self, _artifact: &ArtifactRef) -> Result<String, BlobError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("never".to_string())
    }
}

/// Blob store that has lost every artifact
pub struct EmptyBlobStore;

#[async_trait]
impl BlobStore for EmptyBlobStore {
    async fn locate(&self, artifact: &ArtifactRef) -> Result<String, BlobError> {
        Err(BlobError::ArtifactMissing(artifact.clone()))
    }
}

/// Create a registry with the default URL blob store
pub fn create_test_registry(config: RegistryConfig) -> TestRegistry {
    create_test_registry_with_blob_store(config, Arc::new(UrlBlobStore::new(BLOB_BASE_URL)))
}

pub fn create_test_registry_with_blob_store(
    config: RegistryConfig,
    blob_store: Arc<dyn BlobStore>,
) -> TestRegistry {
    let temp_dir = TempDir::new().unwrap();
    let catalog = SqliteCatalog::new(&temp_dir.path().join("registry.db")).unwrap();
    let analytics = SqliteAnalyticsStore::new(&temp_dir.path().join("analytics.db")).unwrap();

    let (state, _writer) = AppState::new(
        config,
        Arc::new(CachedRepository::new(catalog)),
        Arc::new(analytics),
        blob_store,
    );
    let state = Arc::new(state);
    let app = router(state.clone());

    TestRegistry {
        _temp_dir: temp_dir,
        state,
        app,
    }
}

impl TestRegistry {
    /// Publish a module version with a conventional artifact name
    pub fn publish(&self, namespace: &str, name: &str, target: &str, version: &str) -> StoredVersion {
        self.publish_with(
            namespace,
            name,
            target,
            version,
            VersionMetadata::new(format!("{}/{}-{}.zip", namespace, name, version)),
        )
    }

    pub fn publish_with(
        &self,
        namespace: &str,
        name: &str,
        target: &str,
        version: &str,
        metadata: VersionMetadata,
    ) -> StoredVersion {
        self.state
            .catalog
            .publish(PublishRequest::new(
                ModuleId::new(namespace, name, target),
                version,
                metadata,
            ))
            .unwrap()
    }

    /// Publish one platform build of a provider version
    pub fn publish_provider(&self, namespace: &str, provider_type: &str, platform: &str, version: &str) {
        let metadata = VersionMetadata {
            kind: ModuleKind::Provider,
            protocols: vec!["5.0".to_string()],
            shasum: Some(format!("sha-{}-{}", version, platform)),
            ..VersionMetadata::new(format!(
                "providers/terraform-provider-{}_{}_{}.zip",
                provider_type, version, platform
            ))
        };
        self.publish_with(namespace, provider_type, platform, version, metadata);
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    pub async fn get_with_headers(&self, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut request = Request::builder().uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = self
            .app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First message of a protocol error body
    pub fn error_message(&self) -> &str {
        self.json["errors"][0].as_str().unwrap_or_default()
    }
}
