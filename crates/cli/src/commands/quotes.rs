//! Local quote outbox commands.
//!
//! Quotes the document store refused for quota reasons are parked in the
//! storefront's local storage directory (`KRD_LOCAL_STORAGE_DIR`).
//!
//! # Usage
//!
//! ```bash
//! krd-cli quotes pending
//! krd-cli quotes sync
//! ```

use std::sync::Arc;

use krd_storefront::config::{ConfigError, StorefrontConfig};
use krd_storefront::db::{self, PgDocumentStore};
use krd_storefront::services::{QuoteError, QuoteOutbox};
use krd_storefront::store::{
    DocumentStore, FileLocalStorage, LocalStorage, MemoryDocumentStore, StorageError,
};
use thiserror::Error;

/// Errors from outbox commands.
#[derive(Debug, Error)]
pub enum QuotesCommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Quote(#[from] QuoteError),
}

fn open_local(config: &StorefrontConfig) -> Result<Arc<dyn LocalStorage>, StorageError> {
    Ok(Arc::new(FileLocalStorage::open(&config.local_storage_dir)?))
}

/// Print the number of parked quotes.
///
/// # Errors
///
/// Returns `QuotesCommandError` if configuration or the storage directory is invalid.
pub fn pending() -> Result<(), QuotesCommandError> {
    let config = StorefrontConfig::from_env()?;
    let local = open_local(&config)?;
    // Counting never touches the document store.
    let documents: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let outbox = QuoteOutbox::new(documents, local);

    let pending = outbox.pending()?;
    #[allow(clippy::print_stdout)]
    {
        println!("{} pending quote(s)", pending.len());
        for quote in &pending {
            println!(
                "  {}  saved {}  {} <{}>",
                quote.local_id, quote.saved_at, quote.quote.company_name, quote.quote.email
            );
        }
    }
    Ok(())
}

/// Push parked quotes to the database.
///
/// # Errors
///
/// Returns `QuotesCommandError` if the database is unreachable or the
/// outbox cannot be read or rewritten.
pub async fn sync() -> Result<(), QuotesCommandError> {
    let config = StorefrontConfig::from_env()?;
    let pool = db::create_pool(config.require_database_url()?).await?;
    let documents: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));
    let outbox = QuoteOutbox::new(documents, open_local(&config)?);

    let report = outbox.sync_pending().await?;
    tracing::info!(
        synced = report.synced,
        failed = report.failed,
        remaining = report.remaining,
        "Quote outbox sync complete"
    );
    Ok(())
}
