//! Defines every HTTP route of the pipeline.
//!
//! ## Structure
//! - **Probes**: `GET /healthz`, `GET /readyz`
//! - **Event sources**
//!   - `POST /events/storage`: metadata recorder
//!   - `POST /events/queue`: task dispatcher
//! - **API**
//!   - `POST /api-keys`: issue an API key by email
//!   - `GET  /metadata?file=`: metadata lookup, optionally behind `x-api-key`
//! - **Objects**
//!   - `PUT  /{bucket}/{*key}`: upload object (fans out to recorder and queue)
//!   - `GET  /{bucket}/{*key}`: download object
//!   - `HEAD /{bucket}/{*key}`: retrieve metadata only
//!
//! The wildcard `*key` allows nested keys like `reports/2025/q1.docx`.
//! Static paths take precedence over the object wildcard.

use crate::{
    handlers::{
        api_handlers::{create_api_key, get_metadata, require_api_key},
        event_handlers::{queue_event, storage_event},
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object, upload_object},
    },
    state::AppState,
};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};

/// Build the full router with `state` attached.
pub fn routes(state: AppState) -> Router {
    let metadata = Router::new()
        .route("/metadata", get(get_metadata))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/events/storage", post(storage_event))
        .route("/events/queue", post(queue_event))
        .route("/api-keys", post(create_api_key))
        .merge(metadata)
        // Object-level routes
        .route(
            "/{bucket}/{*key}",
            put(upload_object).get(get_object).head(head_object),
        )
        .with_state(state)
}
