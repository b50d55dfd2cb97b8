//! Quote submission with a local outbox.
//!
//! Quotes go straight to the `quotes` collection. When the store reports
//! that its quota is exhausted the quote is parked in local storage under
//! [`PENDING_QUOTES_KEY`] instead of being lost, and [`QuoteOutbox::sync_pending`]
//! retries it later.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use krd_core::{DocumentId, QuoteRequest, random_suffix, unix_millis};

use crate::store::{
    DocumentStore, LocalStorage, StorageError, StoreError, collections, to_document,
};

/// Local storage key holding the parked quotes as a JSON array.
pub const PENDING_QUOTES_KEY: &str = "pendingQuotes";

/// Status given to newly submitted quotes.
pub const SUBMITTED_STATUS: &str = "submitted";

/// Errors from quote submission.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store refused the quote and it could not be parked locally either.
    #[error("failed to save quote locally: {0}")]
    Storage(#[from] StorageError),

    #[error("malformed pending quotes: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A quote waiting in the local outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuote {
    /// `local_{unix millis}_{9 random base36 chars}`.
    pub local_id: String,
    pub quote: QuoteRequest,
    pub saved_at: DateTime<Utc>,
}

/// Outcome of [`QuoteOutbox::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum QuoteSubmission {
    /// Written to the store.
    #[serde(rename_all = "camelCase")]
    Submitted { document_id: DocumentId },
    /// Store quota exhausted; parked for a later sync.
    #[serde(rename_all = "camelCase")]
    SavedLocally { local_id: String },
}

/// Result of [`QuoteOutbox::sync_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Quotes written to the store and removed from the outbox.
    pub synced: usize,
    /// Quotes that failed this round, whether kept or dropped.
    pub failed: usize,
    /// Quotes still parked after the sync.
    pub remaining: usize,
}

/// Quote submission service.
#[derive(Clone)]
pub struct QuoteOutbox {
    store: Arc<dyn DocumentStore>,
    local: Arc<dyn LocalStorage>,
    // Parking and syncing both rewrite the whole outbox.
    outbox_lock: Arc<tokio::sync::Mutex<()>>,
}

impl QuoteOutbox {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, local: Arc<dyn LocalStorage>) -> Self {
        Self {
            store,
            local,
            outbox_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Submit a quote, parking it locally if the store's quota is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::Store` for store failures other than quota
    /// exhaustion, and `QuoteError::Storage` if parking fails.
    #[instrument(skip(self, quote), fields(email = %quote.email, lines = quote.products.len()))]
    pub async fn submit(&self, quote: QuoteRequest) -> Result<QuoteSubmission, QuoteError> {
        match self.write(&quote).await {
            Ok(document_id) => {
                info!(%document_id, "Quote submitted");
                Ok(QuoteSubmission::Submitted { document_id })
            }
            Err(e) if e.is_resource_exhausted() => {
                warn!(error = %e, "Store quota exhausted, saving quote locally");
                let local_id = self.park(quote).await?;
                info!(%local_id, "Quote saved locally for later sync");
                Ok(QuoteSubmission::SavedLocally { local_id })
            }
            Err(e) => {
                error!(error = %e, "Failed to submit quote");
                Err(e.into())
            }
        }
    }

    /// Retry every parked quote.
    ///
    /// Synced quotes leave the outbox. Quotes the store rejects outright, or
    /// that cannot be encoded, are dropped and logged; every other failure
    /// keeps the quote for the next round.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError` if the outbox cannot be read or rewritten.
    #[instrument(skip(self))]
    pub async fn sync_pending(&self) -> Result<SyncReport, QuoteError> {
        let _outbox = self.outbox_lock.lock().await;
        let pending = self.read_pending()?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        let mut report = SyncReport::default();
        let mut keep = Vec::new();
        for parked in pending {
            match self.write(&parked.quote).await {
                Ok(document_id) => {
                    debug!(local_id = %parked.local_id, %document_id, "Synced pending quote");
                    report.synced += 1;
                }
                Err(e) if e.is_permanent() => {
                    error!(local_id = %parked.local_id, error = %e, "Dropping pending quote the store rejected");
                    report.failed += 1;
                }
                Err(e) => {
                    debug!(local_id = %parked.local_id, error = %e, "Pending quote still blocked");
                    report.failed += 1;
                    keep.push(parked);
                }
            }
        }

        report.remaining = keep.len();
        self.write_pending(&keep)?;
        info!(
            synced = report.synced,
            failed = report.failed,
            remaining = report.remaining,
            "Pending quote sync finished"
        );
        Ok(report)
    }

    /// Number of parked quotes. Unreadable or malformed storage counts as 0.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.read_pending().map_or_else(
            |e| {
                warn!(error = %e, "Could not read pending quotes");
                0
            },
            |pending| pending.len(),
        )
    }

    /// The parked quotes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError` if the outbox cannot be read or parsed.
    pub fn pending(&self) -> Result<Vec<PendingQuote>, QuoteError> {
        self.read_pending()
    }

    async fn write(&self, quote: &QuoteRequest) -> Result<DocumentId, StoreError> {
        let mut document = to_document(quote)?;
        let now = Value::String(Utc::now().to_rfc3339());
        document.insert("status".to_string(), Value::from(SUBMITTED_STATUS));
        document.insert("createdAt".to_string(), now.clone());
        document.insert("updatedAt".to_string(), now);
        self.store.create(collections::QUOTES, document).await
    }

    async fn park(&self, quote: QuoteRequest) -> Result<String, QuoteError> {
        let _outbox = self.outbox_lock.lock().await;
        // A corrupt outbox is replaced rather than blocking new quotes.
        let mut pending = self.read_pending().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable pending quotes");
            Vec::new()
        });
        let local_id = format!("local_{}_{}", unix_millis(), random_suffix());
        pending.push(PendingQuote {
            local_id: local_id.clone(),
            quote,
            saved_at: Utc::now(),
        });
        self.write_pending(&pending)?;
        Ok(local_id)
    }

    fn read_pending(&self) -> Result<Vec<PendingQuote>, QuoteError> {
        match self.local.get_item(PENDING_QUOTES_KEY)? {
            None => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }

    fn write_pending(&self, pending: &[PendingQuote]) -> Result<(), QuoteError> {
        if pending.is_empty() {
            self.local.remove_item(PENDING_QUOTES_KEY)?;
        } else {
            self.local
                .set_item(PENDING_QUOTES_KEY, &serde_json::to_string(pending)?)?;
        }
        Ok(())
    }
}
