//! Registry-wide and per-module analytics routes.
//!
//! ## Routes
//!
//! - `GET /v1/terrareg/analytics/global/stats_summary` - Catalog and download totals
//! - `GET /v1/terrareg/analytics/global/most_downloaded_module_provider_this_week` - Weekly top module
//! - `GET /v1/terrareg/analytics/global/most_recently_published_module_version` - Newest release
//! - `GET /v1/terrareg/analytics/{ns}/{name}/{target}/token_versions` - Latest version per token

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::Serialize;

use crate::analytics::TokenVersion;
use crate::catalog::{CatalogError, ModuleKind};
use crate::error::RegistryError;
use crate::server::AppState;
use crate::server::error::{ApiError, ApiResult};
use crate::server::routes::catalog_id;
use crate::server::routes::modules::{ModuleDetails, module_details};

/// Candidates scanned for the weekly top module; providers and modules
/// without a published latest version are skipped
const MOST_DOWNLOADED_CANDIDATES: usize = 20;

#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub namespaces: u64,
    pub modules: u64,
    pub module_versions: u64,
    pub downloads: u64,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/v1/terrareg/analytics/global/stats_summary",
            get(stats_summary),
        )
        .route(
            "/v1/terrareg/analytics/global/most_downloaded_module_provider_this_week",
            get(most_downloaded_this_week),
        )
        .route(
            "/v1/terrareg/analytics/global/most_recently_published_module_version",
            get(most_recently_published),
        )
        .route(
            "/v1/terrareg/analytics/:namespace/:name/:target/token_versions",
            get(token_versions),
        )
}

/// GET /v1/terrareg/analytics/global/stats_summary
async fn stats_summary(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsSummary>> {
    let stats = state.catalog.stats().map_err(RegistryError::from)?;
    let downloads = state
        .analytics
        .global_total_downloads()
        .map_err(RegistryError::from)?;

    Ok(Json(StatsSummary {
        namespaces: stats.namespaces,
        modules: stats.modules,
        module_versions: stats.module_versions,
        downloads,
    }))
}

/// Module with the most downloads over the last 7 days, at its latest version.
///
/// GET /v1/terrareg/analytics/global/most_downloaded_module_provider_this_week
async fn most_downloaded_this_week(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ModuleDetails>> {
    let ranked = state
        .analytics
        .most_downloaded(7, MOST_DOWNLOADED_CANDIDATES)
        .map_err(RegistryError::from)?;

    for (id, _) in ranked {
        let module = match state.catalog.get_module_metadata(&id) {
            Ok(module) => module,
            Err(CatalogError::ModuleNotFound(_)) => continue,
            Err(e) => return Err(RegistryError::from(e).into()),
        };
        if module.kind != ModuleKind::Module {
            continue;
        }
        match state.resolution.resolve_latest(&id) {
            Ok(latest) => return Ok(Json(module_details(&state, &id, latest)?)),
            Err(RegistryError::NoSatisfyingVersion { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::not_found("No module downloads in the last week"))
}

/// GET /v1/terrareg/analytics/global/most_recently_published_module_version
async fn most_recently_published(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ModuleDetails>> {
    let Some((id, stored)) = state
        .catalog
        .most_recently_published()
        .map_err(RegistryError::from)?
    else {
        return Err(ApiError::not_found("No module versions published"));
    };
    Ok(Json(module_details(&state, &id, stored)?))
}

/// GET /v1/terrareg/analytics/{ns}/{name}/{target}/token_versions
async fn token_versions(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, target)): Path<(String, String, String)>,
) -> ApiResult<Json<IndexMap<String, TokenVersion>>> {
    let id = catalog_id(&state, &namespace, &name, &target)?;
    if !state.catalog.exists(&id).map_err(RegistryError::from)? {
        return Err(RegistryError::ModuleNotFound(id).into());
    }

    let versions = state
        .analytics
        .token_versions(&id)
        .map_err(RegistryError::from)?;
    Ok(Json(versions))
}
