//! Application state shared across handlers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cart::CartStore;
use crate::config::StorefrontConfig;
use crate::db::{self, PgDocumentStore};
use crate::services::{QuoteOutbox, UploadQueue};
use crate::store::{DocumentStore, FileLocalStorage, LocalStorage, MemoryDocumentStore, StorageError};

/// Error wiring up the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("local storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and owns the long-lived
/// services: the upload queue and the quote outbox.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    documents: Arc<dyn DocumentStore>,
    local: Arc<dyn LocalStorage>,
    uploads: UploadQueue,
    quotes: QuoteOutbox,
}

impl AppState {
    /// Create application state over the given stores.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        documents: Arc<dyn DocumentStore>,
        local: Arc<dyn LocalStorage>,
    ) -> Self {
        let uploads = UploadQueue::new(config.uploads, Arc::clone(&documents));
        let quotes = QuoteOutbox::new(Arc::clone(&documents), Arc::clone(&local));
        Self {
            inner: Arc::new(AppStateInner {
                config,
                documents,
                local,
                uploads,
                quotes,
            }),
        }
    }

    /// Connect the stores named by `config` and build the state.
    ///
    /// Without a database URL the document store is in-memory, which is
    /// only suitable for local development.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the database or the local storage directory
    /// cannot be opened.
    pub async fn connect(config: StorefrontConfig) -> Result<Self, StateError> {
        let documents: Arc<dyn DocumentStore> = match &config.database_url {
            Some(url) => {
                let pool = db::create_pool(url).await?;
                info!("Connected to document database");
                Arc::new(PgDocumentStore::new(pool))
            }
            None => {
                warn!("KRD_DATABASE_URL not set, using in-memory document store");
                Arc::new(MemoryDocumentStore::new())
            }
        };
        let local: Arc<dyn LocalStorage> =
            Arc::new(FileLocalStorage::open(&config.local_storage_dir)?);
        Ok(Self::new(config, documents, local))
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.documents
    }

    #[must_use]
    pub fn local(&self) -> &Arc<dyn LocalStorage> {
        &self.inner.local
    }

    #[must_use]
    pub fn uploads(&self) -> &UploadQueue {
        &self.inner.uploads
    }

    #[must_use]
    pub fn quotes(&self) -> &QuoteOutbox {
        &self.inner.quotes
    }

    /// A fresh, unbound cart store for one session over the shared stores.
    #[must_use]
    pub fn cart_store(&self) -> CartStore {
        CartStore::new(
            self.inner.config.cart,
            Arc::clone(&self.inner.documents),
            Arc::clone(&self.inner.local),
        )
    }
}
