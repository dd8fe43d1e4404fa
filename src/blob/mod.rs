//! Artifact location behind an opaque blob store

mod http;

use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::warn;

use crate::catalog::ArtifactRef;

pub use http::HttpBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Artifact not found in blob store: {0}")]
    ArtifactMissing(ArtifactRef),

    #[error("Blob store request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),

    #[error("Blob store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Turns an artifact reference into a client-fetchable location
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn locate(&self, artifact: &ArtifactRef) -> Result<String, BlobError>;
}

/// Whether a reference is already a full location (URL or getter-prefixed source)
pub(crate) fn is_absolute(reference: &str) -> bool {
    reference.contains("://") || reference.contains("::")
}

/// Build the location for `artifact` under `base_url`
pub(crate) fn join_location(base_url: &str, artifact: &ArtifactRef) -> String {
    let reference = artifact.as_str();
    if base_url.is_empty() || is_absolute(reference) {
        return reference.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        reference.trim_start_matches('/')
    )
}

/// Blob store that maps references onto a base URL without contacting it
pub struct UrlBlobStore {
    base_url: String,
}

impl UrlBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for UrlBlobStore {
    async fn locate(&self, artifact: &ArtifactRef) -> Result<String, BlobError> {
        if artifact.as_str().trim().is_empty() {
            return Err(BlobError::ArtifactMissing(artifact.clone()));
        }
        Ok(join_location(&self.base_url, artifact))
    }
}

/// Locate an artifact, giving up after `timeout`
pub async fn locate_with_timeout(
    store: &dyn BlobStore,
    artifact: &ArtifactRef,
    timeout: Duration,
) -> Result<String, BlobError> {
    match tokio::time::timeout(timeout, store.locate(artifact)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Blob store lookup for {} timed out", artifact);
            Err(BlobError::Timeout(timeout))
        }
    }
}
