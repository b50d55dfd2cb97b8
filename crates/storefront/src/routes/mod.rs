//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//! GET    /health/ready                    - Document store reachable
//!
//! # Upload queue
//! GET    /api/uploads/queue               - Queue status
//! POST   /api/uploads/queue               - Enqueue an image record (202)
//! DELETE /api/uploads/queue               - Drop all queued records
//! POST   /api/uploads/queue/flush         - Flush one batch now
//! GET    /api/uploads/queue/dead-letters  - Records given up on
//!
//! # Quotes
//! POST   /api/quotes                      - Submit a quote
//! GET    /api/quotes/pending              - Parked quote count
//! POST   /api/quotes/sync                 - Retry parked quotes
//! ```

pub mod quotes;
pub mod uploads;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the upload queue routes router.
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(uploads::status)
                .post(uploads::enqueue)
                .delete(uploads::clear),
        )
        .route("/flush", post(uploads::flush))
        .route("/dead-letters", get(uploads::dead_letters))
}

/// Create the quote routes router.
pub fn quote_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(quotes::submit))
        .route("/pending", get(quotes::pending))
        .route("/sync", post(quotes::sync))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/uploads/queue", upload_routes())
        .nest("/api/quotes", quote_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the document store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.documents().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
