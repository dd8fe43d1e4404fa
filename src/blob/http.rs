//! Blob store that checks artifacts exist on an HTTP origin before handing them out

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::blob::{BlobError, BlobStore, is_absolute, join_location};
use crate::catalog::ArtifactRef;

pub struct HttpBlobStore {
    client: Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn locate(&self, artifact: &ArtifactRef) -> Result<String, BlobError> {
        let location = join_location(&self.base_url, artifact);

        // Getter-prefixed sources (git::, s3::) cannot be checked over HTTP
        if artifact.as_str().contains("::")
            || (is_absolute(&location) && !location.starts_with("http"))
        {
            return Ok(location);
        }

        debug!("Checking artifact location: {}", location);
        let response = self.client.head(&location).send().await?;

        match response.status() {
            status if status.is_success() => Ok(location),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(BlobError::ArtifactMissing(artifact.clone()))
            }
            status => Err(BlobError::Unavailable(format!(
                "blob store returned status {} for {}",
                status, artifact
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn locate_returns_location_when_artifact_exists() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/modules/vpc-1.0.0.zip")
            .with_status(200)
            .create_async()
            .await;

        let store = HttpBlobStore::new(server.url());
        let location = store
            .locate(&ArtifactRef::new("modules/vpc-1.0.0.zip"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(location, format!("{}/modules/vpc-1.0.0.zip", server.url()));
    }

    #[tokio::test]
    async fn locate_returns_artifact_missing_on_404() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/modules/gone.zip")
            .with_status(404)
            .create_async()
            .await;

        let store = HttpBlobStore::new(server.url());
        let result = store.locate(&ArtifactRef::new("modules/gone.zip")).await;

        assert!(matches!(result, Err(BlobError::ArtifactMissing(_))));
    }

    #[tokio::test]
    async fn locate_returns_unavailable_on_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/modules/vpc.zip")
            .with_status(503)
            .create_async()
            .await;

        let store = HttpBlobStore::new(server.url());
        let result = store.locate(&ArtifactRef::new("modules/vpc.zip")).await;

        assert!(matches!(result, Err(BlobError::Unavailable(_))));
    }

    #[tokio::test]
    async fn locate_passes_getter_sources_through_unchecked() {
        let store = HttpBlobStore::new("http://127.0.0.1:1");
        let location = store
            .locate(&ArtifactRef::new("git::https://example.com/vpc.git?ref=v1.0.0"))
            .await
            .unwrap();

        assert_eq!(location, "git::https://example.com/vpc.git?ref=v1.0.0");
    }
}
