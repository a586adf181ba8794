//! HTTP handlers for object uploads and downloads.
//!
//! Bodies are streamed in both directions. A successful upload fans out to
//! the metadata recorder and, for convertible documents, to the conversion
//! queue.

use crate::{
    errors::AppError,
    models::{conversion::CONVERTED_PREFIX, event::StorageEvent, object::StoredObject},
    services::recorder::record_batch,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use std::io;
use tracing::{error, info};

/// Upload an object to `/{bucket}/{*key}`.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();

    let object = state
        .clients
        .objects
        .put_object_stream(&bucket, &key, content_type, stream)
        .await?;
    info!(bucket = %object.bucket_name, key = %object.key, size = object.size_bytes, "stored object");

    fan_out_upload(&state, &object).await;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    if let Some(etag) = object.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
    Ok(response)
}

/// Deliver the upload notification to its subscribers. Failures are logged;
/// the upload itself has already succeeded.
async fn fan_out_upload(state: &AppState, object: &StoredObject) {
    let event = StorageEvent::single(&object.bucket_name, &object.key, Some(object.size_bytes));

    record_batch(
        state.clients.objects.as_ref(),
        state.clients.metadata.as_ref(),
        &event,
    )
    .await;

    if !should_convert(&object.key, &state.settings.convert_suffix) {
        return;
    }
    let queue_url = &state.settings.dispatch.queue_url;
    let body = match serde_json::to_string(&event) {
        Ok(body) => body,
        Err(err) => {
            error!(key = %object.key, "failed to encode upload event: {}", err);
            return;
        }
    };
    match state.clients.queue.send_message(queue_url, &body).await {
        Ok(message_id) => info!(%message_id, key = %object.key, "queued for conversion"),
        Err(err) => error!(key = %object.key, "failed to queue conversion: {}", err),
    }
}

/// Converted outputs are never fed back into the queue.
pub fn should_convert(key: &str, suffix: &str) -> bool {
    !key.starts_with(CONVERTED_PREFIX) && key.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
}

/// Download an object `/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, stream) = state.clients.objects.get_object(&bucket, &key).await?;

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// HEAD `/{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let meta = state.clients.objects.head_object(&bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(meta.content_type_or_default())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
