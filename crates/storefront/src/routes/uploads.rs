//! Upload queue operations.
//!
//! Lets an operator see what is waiting, push records in, force a flush
//! before a deploy, and reset the queue in an emergency.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::instrument;

use krd_core::NewImageUpload;

use crate::error::add_breadcrumb;
use crate::services::{DeadLetter, QueueStatus};
use crate::state::AppState;

/// Body returned by [`clear`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub dropped: usize,
}

/// `GET /api/uploads/queue`
pub async fn status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.uploads().status())
}

/// `POST /api/uploads/queue`
#[instrument(skip(state, record), fields(file_name = %record.file_name))]
pub async fn enqueue(
    State(state): State<AppState>,
    Json(record): Json<NewImageUpload>,
) -> (StatusCode, Json<QueueStatus>) {
    add_breadcrumb(
        "uploads",
        "Queued image record",
        Some(&[("file_name", record.file_name.as_str())]),
    );
    state.uploads().enqueue(record);
    (StatusCode::ACCEPTED, Json(state.uploads().status()))
}

/// `POST /api/uploads/queue/flush`
#[instrument(skip(state))]
pub async fn flush(State(state): State<AppState>) -> Json<QueueStatus> {
    state.uploads().force_flush().await;
    Json(state.uploads().status())
}

/// `DELETE /api/uploads/queue`
#[instrument(skip(state))]
pub async fn clear(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(ClearResponse {
        dropped: state.uploads().clear(),
    })
}

/// `GET /api/uploads/queue/dead-letters`
pub async fn dead_letters(State(state): State<AppState>) -> Json<Vec<DeadLetter>> {
    Json(state.uploads().dead_letters())
}
