//! Service discovery document.
//!
//! ## Routes
//!
//! - `GET /.well-known/terraform.json` - Service endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::server::AppState;
use crate::server::routes::base_url;

#[derive(Debug, Serialize)]
pub struct DiscoveryDocument {
    #[serde(rename = "modules.v1")]
    pub modules_v1: String,
    #[serde(rename = "providers.v1")]
    pub providers_v1: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/.well-known/terraform.json", get(discovery))
}

async fn discovery(State(state): State<Arc<AppState>>) -> Json<DiscoveryDocument> {
    let base = base_url(&state);
    Json(DiscoveryDocument {
        modules_v1: format!("{}/v1/modules/", base),
        providers_v1: format!("{}/v1/providers/", base),
    })
}
