//! HTTP route handlers.

pub mod analytics;
pub mod discovery;
pub mod modules;
pub mod providers;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;

use crate::analytics::CallerContext;
use crate::catalog::ModuleId;
use crate::error::RegistryError;
use crate::server::AppState;
use crate::server::path::module_id;

const TERRAFORM_VERSION_HEADER: &str = "x-terraform-version";

/// All registry protocol routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(discovery::routes())
        .merge(modules::routes())
        .merge(providers::routes())
        .merge(analytics::routes())
}

/// Caller details recorded with a download
pub(crate) fn caller_context(headers: &HeaderMap, analytics_token: Option<String>) -> CallerContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    CallerContext {
        analytics_token,
        terraform_version: header(TERRAFORM_VERSION_HEADER),
        user_agent: header(USER_AGENT.as_str()),
    }
}

/// Public URL prefix for links the registry hands out
pub(crate) fn base_url(state: &AppState) -> &str {
    state.config.server.base_path.trim_end_matches('/')
}

/// Validated identity with the namespace normalized for catalog lookups
pub(crate) fn catalog_id(
    state: &AppState,
    namespace: &str,
    name: &str,
    target: &str,
) -> Result<ModuleId, RegistryError> {
    let id = module_id(namespace, name, target)?;
    Ok(ModuleId {
        namespace: state.catalog.namespace_key(&id.namespace),
        ..id
    })
}
