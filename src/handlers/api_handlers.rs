//! Request/response API: key issuing and metadata lookup.

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, warn};

use crate::{
    models::response::HandlerResponse,
    services::{
        key_issuer::{API_KEY_HEADER, issue_api_key},
        metadata_query::query_metadata,
    },
    state::AppState,
};

/// `POST /api-keys`
///
/// The body is read raw so an unparseable body gets the structured 500
/// envelope rather than an extractor rejection.
pub async fn create_api_key(State(state): State<AppState>, body: Bytes) -> HandlerResponse {
    let body = String::from_utf8_lossy(&body);
    issue_api_key(
        state.clients.gateway.as_ref(),
        state.clients.mailer.as_ref(),
        &state.settings.issuer,
        &body,
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct MetadataParams {
    pub file: Option<String>,
}

/// `GET /metadata?file=<name>`
pub async fn get_metadata(
    State(state): State<AppState>,
    Query(params): Query<MetadataParams>,
) -> HandlerResponse {
    query_metadata(state.clients.metadata.as_ref(), params.file.as_deref()).await
}

/// Gate a route behind a valid `x-api-key` header when key checks are on.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.settings.require_api_key {
        return next.run(request).await;
    }

    let Some(value) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return HandlerResponse::error(401, "Missing API key").into_response();
    };

    match state.clients.gateway.validate_api_key(&value).await {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            warn!(path = %request.uri().path(), "rejected request with unknown api key");
            HandlerResponse::error(401, "Invalid API key").into_response()
        }
        Err(err) => {
            error!("api key validation failed: {}", err);
            HandlerResponse::error(500, format!("Internal server error: {}", err)).into_response()
        }
    }
}
