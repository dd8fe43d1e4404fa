//! Module registry protocol routes.
//!
//! The namespace segment may carry an analytics token as
//! `<token>__<namespace>`; every route strips it before looking the module
//! up.
//!
//! ## Routes
//!
//! - `GET /v1/modules/{ns}/{name}` - Latest version of every target
//! - `GET /v1/modules/{ns}/{name}/{target}` - Latest version details
//! - `GET /v1/modules/{ns}/{name}/{target}/versions` - Available versions
//! - `GET /v1/modules/{ns}/{name}/{target}/download` - Redirect to latest download
//! - `GET /v1/modules/{ns}/{name}/{target}/downloads/summary` - Download counts
//! - `GET /v1/modules/{ns}/{name}/{target}/{version}` - Version details
//! - `GET /v1/modules/{ns}/{name}/{target}/{version}/download` - Download location

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::analytics::{DownloadIdentity, DownloadSummary};
use crate::blob::locate_with_timeout;
use crate::catalog::{ModuleId, ModuleKind, StoredVersion, validate_identifier};
use crate::error::RegistryError;
use crate::server::AppState;
use crate::server::error::{ApiError, ApiResult};
use crate::server::path::NamespaceSegment;
use crate::server::routes::{base_url, caller_context, catalog_id};

const TERRAFORM_GET_HEADER: &str = "x-terraform-get";

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub modules: Vec<ModuleVersions>,
}

#[derive(Debug, Serialize)]
pub struct ModuleVersions {
    pub source: String,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub version: String,
    pub root: RootModule,
    pub submodules: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct RootModule {
    pub providers: Vec<serde_json::Value>,
    pub dependencies: Vec<serde_json::Value>,
}

/// Version details as served by the details endpoints
#[derive(Debug, Serialize)]
pub struct ModuleDetails {
    pub id: String,
    pub owner: Option<String>,
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub provider: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub published_at: String,
    pub downloads: u64,
    pub verified: bool,
    pub trusted: bool,
    pub labels: Vec<String>,
    pub versions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModuleListResponse {
    pub meta: ListMeta,
    pub modules: Vec<ModuleDetails>,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct DownloadSummaryResponse {
    pub data: DownloadSummaryData,
}

#[derive(Debug, Serialize)]
pub struct DownloadSummaryData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub attributes: DownloadSummary,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/modules/:namespace/:name", get(list_module_targets))
        .route("/v1/modules/:namespace/:name/:target", get(latest_details))
        .route(
            "/v1/modules/:namespace/:name/:target/versions",
            get(list_versions),
        )
        .route(
            "/v1/modules/:namespace/:name/:target/download",
            get(download_latest),
        )
        .route(
            "/v1/modules/:namespace/:name/:target/downloads/summary",
            get(downloads_summary),
        )
        .route(
            "/v1/modules/:namespace/:name/:target/:version",
            get(version_details),
        )
        .route(
            "/v1/modules/:namespace/:name/:target/:version/download",
            get(download_version),
        )
}

/// Parse the path into a normalized identity plus the analytics token
fn resolve_path(
    state: &AppState,
    namespace: &str,
    name: &str,
    target: &str,
) -> Result<(ModuleId, Option<String>), RegistryError> {
    let segment = NamespaceSegment::parse(namespace)?;
    let id = catalog_id(state, &segment.namespace, name, target)?;
    Ok((id, segment.analytics_token))
}

/// List versions.
///
/// GET /v1/modules/{ns}/{name}/{target}/versions
async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, target)): Path<(String, String, String)>,
) -> ApiResult<Json<VersionsResponse>> {
    let (id, _) = resolve_path(&state, &namespace, &name, &target)?;
    let versions = state.resolution.list_versions(&id)?;
    debug!("Listing {} versions for {}", versions.len(), id);

    Ok(Json(VersionsResponse {
        modules: vec![ModuleVersions {
            source: id.source(),
            versions: versions
                .into_iter()
                .map(|version| VersionEntry {
                    version,
                    root: RootModule {
                        providers: Vec::new(),
                        dependencies: Vec::new(),
                    },
                    submodules: Vec::new(),
                })
                .collect(),
        }],
    }))
}

/// Download location for a specific version.
///
/// GET /v1/modules/{ns}/{name}/{target}/{version}/download
async fn download_version(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, target, version)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let (id, analytics_token) = resolve_path(&state, &namespace, &name, &target)?;
    let descriptor = state.resolution.resolve_download(&id, Some(&version))?;

    let analytics_config = &state.config.analytics;
    if analytics_token.is_none() && !analytics_config.allow_unidentified_downloads {
        return Err(ApiError::unauthorized(missing_token_message(
            &state, &headers, &id,
        )));
    }

    // Counted before locating the artifact so a caller that disconnects
    // mid-locate, or a failed locate, still leaves one event
    state.analytics.record(
        DownloadIdentity::new(id.clone(), descriptor.version.to_string()),
        Utc::now(),
        caller_context(&headers, analytics_token),
    );

    let location = locate_with_timeout(
        state.blob_store.as_ref(),
        &descriptor.artifact,
        state.config.blob_store.timeout(),
    )
    .await
    .map_err(RegistryError::from)?;
    info!(module = %id, version = %descriptor.version, "Serving module download");

    let location = HeaderValue::from_str(&location)
        .map_err(|_| ApiError::internal("Artifact location is not a valid header value"))?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(TERRAFORM_GET_HEADER, location);
    Ok(response)
}

/// Redirect to the latest version's download endpoint.
///
/// GET /v1/modules/{ns}/{name}/{target}/download
async fn download_latest(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, target)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let (id, _) = resolve_path(&state, &namespace, &name, &target)?;
    let descriptor = state.resolution.resolve_download(&id, None)?;

    // Keep the raw namespace segment so the analytics token survives
    let location = format!(
        "{}/v1/modules/{}/{}/{}/{}/download",
        base_url(&state),
        namespace,
        name,
        target,
        descriptor.version
    );
    let location = HeaderValue::from_str(&location)
        .map_err(|_| ApiError::bad_request("Invalid characters in module path"))?;

    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

/// Latest version of each target of a module, ordered by target.
///
/// GET /v1/modules/{ns}/{name}
async fn list_module_targets(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<ModuleListResponse>> {
    let segment = NamespaceSegment::parse(&namespace)?;
    validate_identifier("namespace", &segment.namespace).map_err(RegistryError::from)?;
    validate_identifier("name", &name).map_err(RegistryError::from)?;
    let namespace = state.catalog.namespace_key(&segment.namespace);

    let targets = state
        .catalog
        .list_targets(&namespace, &name, ModuleKind::Module)
        .map_err(RegistryError::from)?;

    let mut modules = Vec::with_capacity(targets.len());
    for target in targets {
        let id = catalog_id(&state, &namespace, &name, &target)?;
        // Targets whose versions are all beta or deleted have no latest
        match state.resolution.resolve_latest(&id) {
            Ok(latest) => modules.push(module_details(&state, &id, latest)?),
            Err(RegistryError::NoSatisfyingVersion { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if modules.is_empty() {
        return Err(ApiError::not_found(format!(
            "Module not found: {}/{}",
            namespace, name
        )));
    }

    Ok(Json(ModuleListResponse {
        meta: ListMeta {
            limit: modules.len(),
            offset: 0,
        },
        modules,
    }))
}

/// Details of the latest version.
///
/// GET /v1/modules/{ns}/{name}/{target}
async fn latest_details(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, target)): Path<(String, String, String)>,
) -> ApiResult<Json<ModuleDetails>> {
    let (id, _) = resolve_path(&state, &namespace, &name, &target)?;
    let latest = state.resolution.resolve_latest(&id)?;
    Ok(Json(module_details(&state, &id, latest)?))
}

/// Details of a specific version.
///
/// GET /v1/modules/{ns}/{name}/{target}/{version}
async fn version_details(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, target, version)): Path<(String, String, String, String)>,
) -> ApiResult<Json<ModuleDetails>> {
    let (id, _) = resolve_path(&state, &namespace, &name, &target)?;
    let stored = state.resolution.get_version(&id, &version)?;
    Ok(Json(module_details(&state, &id, stored)?))
}

/// Download counts over rolling windows.
///
/// GET /v1/modules/{ns}/{name}/{target}/downloads/summary
async fn downloads_summary(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, target)): Path<(String, String, String)>,
) -> ApiResult<Json<DownloadSummaryResponse>> {
    let (id, _) = resolve_path(&state, &namespace, &name, &target)?;
    if !state.catalog.exists(&id).map_err(RegistryError::from)? {
        return Err(RegistryError::ModuleNotFound(id).into());
    }

    let summary = state
        .analytics
        .module_download_summary(&id)
        .map_err(RegistryError::from)?;

    Ok(Json(DownloadSummaryResponse {
        data: DownloadSummaryData {
            kind: "module-downloads-summary",
            id: id.source(),
            attributes: summary,
        },
    }))
}

pub(crate) fn module_details(
    state: &AppState,
    id: &ModuleId,
    stored: StoredVersion,
) -> Result<ModuleDetails, RegistryError> {
    let module = state.catalog.get_module_metadata(id)?;
    let namespace = state.catalog.get_namespace(&id.namespace)?;
    let classification = state.classification.classify(&namespace, &module);
    let versions = state.resolution.list_versions(id)?;
    let downloads = state.analytics.module_download_summary(id)?.total;

    let record = stored.record;
    Ok(ModuleDetails {
        id: format!("{}/{}", id.source(), stored.version),
        owner: record.owner.or(module.owner),
        namespace: id.namespace.clone(),
        name: id.name.clone(),
        version: stored.version.to_string(),
        provider: id.target.clone(),
        description: record.description.or(module.description),
        source: record.source_url.or(module.source_url),
        published_at: record
            .published_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        downloads,
        verified: classification.verified,
        trusted: classification.trusted,
        labels: state.classification.display_labels(&classification),
        versions,
    })
}

fn missing_token_message(state: &AppState, headers: &HeaderMap, id: &ModuleId) -> String {
    let analytics = &state.config.analytics;
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("registry.example.com");

    format!(
        "An {phrase} must be provided. Please update module source to include {phrase}. \
         For example: source = \"{host}/{token}__{namespace}/{name}/{target}\"",
        phrase = analytics.token_phrase,
        host = host,
        token = analytics.example_token,
        namespace = id.namespace,
        name = id.name,
        target = id.target,
    )
}
