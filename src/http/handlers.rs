//! Request handlers that read the peer identity.

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::identity::{IdentityFeature, Principal};

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    #[serde(flatten)]
    pub principal: Principal,
    pub node: String,
    pub addresses: Vec<String>,
}

impl WhoAmI {
    pub fn from_feature(feature: &IdentityFeature) -> Self {
        let node = &feature.record().node;
        Self {
            principal: feature.principal().clone(),
            node: node.computed_name.clone(),
            addresses: node.addresses.clone(),
        }
    }
}

/// Router serving `GET /whoami`.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .layer(TraceLayer::new_for_http())
}

/// The caller's claims, or 401 when the connection carries no identity.
pub async fn whoami(request: Request) -> Response {
    match request.extensions().get::<IdentityFeature>() {
        Some(feature) => Json(WhoAmI::from_feature(feature)).into_response(),
        None => (StatusCode::UNAUTHORIZED, "no overlay identity on this connection").into_response(),
    }
}
