//! Quote submission and outbox operations.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::instrument;

use krd_core::QuoteRequest;

use crate::error::{Result, add_breadcrumb};
use crate::services::{QuoteSubmission, SyncReport};
use crate::state::AppState;

/// Body returned by [`pending`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResponse {
    pub count: usize,
}

/// `POST /api/quotes`
///
/// `201 Created` when the quote reached the store, `202 Accepted` when it
/// was parked locally.
#[instrument(skip(state, quote))]
pub async fn submit(
    State(state): State<AppState>,
    Json(quote): Json<QuoteRequest>,
) -> Result<(StatusCode, Json<QuoteSubmission>)> {
    let submission = state.quotes().submit(quote).await?;
    let status = match &submission {
        QuoteSubmission::Submitted { .. } => StatusCode::CREATED,
        QuoteSubmission::SavedLocally { local_id } => {
            add_breadcrumb("quotes", "Quote saved locally", Some(&[("local_id", local_id.as_str())]));
            StatusCode::ACCEPTED
        }
    };
    Ok((status, Json(submission)))
}

/// `GET /api/quotes/pending`
pub async fn pending(State(state): State<AppState>) -> Json<PendingResponse> {
    Json(PendingResponse {
        count: state.quotes().pending_count(),
    })
}

/// `POST /api/quotes/sync`
#[instrument(skip(state))]
pub async fn sync(State(state): State<AppState>) -> Result<Json<SyncReport>> {
    Ok(Json(state.quotes().sync_pending().await?))
}
