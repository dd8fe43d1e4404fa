//! Provider registry protocol routes.
//!
//! Providers are catalog entries of kind `provider` whose target is the
//! `<os>_<arch>` platform, one entry per platform build.
//!
//! ## Routes
//!
//! - `GET /v1/providers/{ns}/{type}/versions` - Versions and their platforms
//! - `GET /v1/providers/{ns}/{type}/{version}/download/{os}/{arch}` - Platform package

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use indexmap::IndexMap;
use semver::Version;
use serde::Serialize;
use tracing::{info, warn};

use crate::analytics::DownloadIdentity;
use crate::blob::locate_with_timeout;
use crate::catalog::{GpgPublicKey, ModuleKind, validate_identifier};
use crate::error::RegistryError;
use crate::server::AppState;
use crate::server::error::{ApiError, ApiResult};
use crate::server::path::module_id;
use crate::server::routes::{caller_context, catalog_id};
use crate::version;

#[derive(Debug, Serialize)]
pub struct ProviderVersionsResponse {
    pub versions: Vec<ProviderVersion>,
}

#[derive(Debug, Serialize)]
pub struct ProviderVersion {
    pub version: String,
    pub protocols: Vec<String>,
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Split an `<os>_<arch>` target at the first underscore
    fn from_target(target: &str) -> Option<Self> {
        let (os, arch) = target.split_once('_')?;
        (!os.is_empty() && !arch.is_empty()).then(|| Self {
            os: os.to_string(),
            arch: arch.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProviderDownload {
    pub protocols: Vec<String>,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    pub shasum: Option<String>,
    pub shasums_url: Option<String>,
    pub shasums_signature_url: Option<String>,
    pub signing_keys: SigningKeys,
}

#[derive(Debug, Default, Serialize)]
pub struct SigningKeys {
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/v1/providers/:namespace/:provider_type/versions",
            get(list_versions),
        )
        .route(
            "/v1/providers/:namespace/:provider_type/:version/download/:os/:arch",
            get(download),
        )
}

/// List provider versions with the platforms each is built for.
///
/// GET /v1/providers/{ns}/{type}/versions
async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path((namespace, provider_type)): Path<(String, String)>,
) -> ApiResult<Json<ProviderVersionsResponse>> {
    validate_identifier("namespace", &namespace).map_err(RegistryError::from)?;
    validate_identifier("type", &provider_type).map_err(RegistryError::from)?;
    let namespace = state.catalog.namespace_key(&namespace);

    let targets = state
        .catalog
        .list_targets(&namespace, &provider_type, ModuleKind::Provider)
        .map_err(RegistryError::from)?;
    if targets.is_empty() {
        return Err(ApiError::not_found(format!(
            "Provider not found: {}/{}",
            namespace, provider_type
        )));
    }

    let mut by_version: IndexMap<Version, ProviderVersion> = IndexMap::new();
    for target in targets {
        let Some(platform) = Platform::from_target(&target) else {
            warn!("Skipping provider target with malformed platform: {}", target);
            continue;
        };
        let id = module_id(&namespace, &provider_type, &target)?;

        for stored in state.catalog.list_versions(&id).map_err(RegistryError::from)? {
            let entry = by_version
                .entry(stored.version.clone())
                .or_insert_with(|| ProviderVersion {
                    version: stored.version.to_string(),
                    protocols: Vec::new(),
                    platforms: Vec::new(),
                });
            for protocol in stored.record.protocols {
                if !entry.protocols.contains(&protocol) {
                    entry.protocols.push(protocol);
                }
            }
            entry.platforms.push(platform.clone());
        }
    }

    by_version.sort_by(|a, _, b, _| version::compare(a, b));
    Ok(Json(ProviderVersionsResponse {
        versions: by_version.into_values().collect(),
    }))
}

/// Package for one platform of a provider version.
///
/// GET /v1/providers/{ns}/{type}/{version}/download/{os}/{arch}
async fn download(
    State(state): State<Arc<AppState>>,
    Path((namespace, provider_type, version, os, arch)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
    headers: HeaderMap,
) -> ApiResult<Json<ProviderDownload>> {
    let target = format!("{}_{}", os, arch);
    let id = catalog_id(&state, &namespace, &provider_type, &target)?;

    let stored = state.resolution.get_version(&id, &version)?;
    let metadata = state
        .catalog
        .get_module_metadata(&id)
        .map_err(RegistryError::from)?;
    if metadata.kind != ModuleKind::Provider {
        return Err(ApiError::not_found(format!(
            "Provider not found: {}/{}",
            id.namespace, id.name
        )));
    }

    // Counted once the request is valid, even if locating the package fails
    state.analytics.record(
        DownloadIdentity::new(id.clone(), stored.version.to_string()),
        Utc::now(),
        caller_context(&headers, None),
    );

    let download_url = locate_with_timeout(
        state.blob_store.as_ref(),
        &stored.record.artifact,
        state.config.blob_store.timeout(),
    )
    .await
    .map_err(RegistryError::from)?;

    let filename = stored
        .record
        .artifact
        .as_str()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    info!(provider = %id, version = %stored.version, "Serving provider download");

    let (shasums_url, shasums_signature_url, signing_keys) = match stored.record.signing {
        Some(signing) => (
            Some(signing.shasums_url),
            Some(signing.shasums_signature_url),
            SigningKeys {
                gpg_public_keys: signing.gpg_public_keys,
            },
        ),
        None => (None, None, SigningKeys::default()),
    };

    Ok(Json(ProviderDownload {
        protocols: stored.record.protocols,
        os,
        arch,
        filename,
        download_url,
        shasum: stored.record.shasum,
        shasums_url,
        shasums_signature_url,
        signing_keys,
    }))
}
