//! Event-source entry points: storage notifications and queue deliveries.

use axum::{Json, extract::State};

use crate::{
    models::{
        event::{QueueEvent, StorageEvent},
        response::HandlerResponse,
    },
    services::{
        dispatcher::{dispatch_batch, dispatch_response},
        recorder::{record_batch, recorder_response},
    },
    state::AppState,
};

/// `POST /events/storage`
pub async fn storage_event(
    State(state): State<AppState>,
    Json(event): Json<StorageEvent>,
) -> HandlerResponse {
    let outcome = record_batch(
        state.clients.objects.as_ref(),
        state.clients.metadata.as_ref(),
        &event,
    )
    .await;
    recorder_response(&outcome)
}

/// `POST /events/queue`
pub async fn queue_event(
    State(state): State<AppState>,
    Json(event): Json<QueueEvent>,
) -> HandlerResponse {
    let reports = dispatch_batch(
        state.clients.launcher.as_ref(),
        state.clients.queue.as_ref(),
        &state.settings.dispatch,
        &event.deliveries(),
    )
    .await;
    dispatch_response(&reports)
}
