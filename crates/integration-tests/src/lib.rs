//! Integration tests for the KRD storefront.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory scenarios (no services needed)
//! cargo test -p krd-integration-tests
//!
//! # Including PostgreSQL-backed tests
//! KRD_TEST_DATABASE_URL=postgres://... cargo test -p krd-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `cart_sync` - Cart/wishlist mirroring across identities
//! - `upload_queue` - Batching, retry and drain timing
//! - `quote_outbox` - Parking and syncing quotes
//! - `pg_documents` - `PostgreSQL` document store (ignored by default)
//!
//! This library holds the fixtures the test files share.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use krd_core::{CatalogProduct, ImageCategory, NewImageUpload, ProductId};
use krd_storefront::config::{CartSyncConfig, UploadQueueConfig};
use krd_storefront::store::{DocumentStore, LocalStorage, MemoryDocumentStore, MemoryLocalStorage};

/// Cart debounce used by the scenarios.
pub const CART_DEBOUNCE: Duration = Duration::from_secs(2);

/// In-memory stores plus trait-object handles to them.
pub struct Stores {
    pub memory: Arc<MemoryDocumentStore>,
    pub local_memory: Arc<MemoryLocalStorage>,
    pub documents: Arc<dyn DocumentStore>,
    pub local: Arc<dyn LocalStorage>,
}

impl Stores {
    #[must_use]
    pub fn new() -> Self {
        let memory = Arc::new(MemoryDocumentStore::new());
        let local_memory = Arc::new(MemoryLocalStorage::new());
        Self {
            documents: memory.clone(),
            local: local_memory.clone(),
            memory,
            local_memory,
        }
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn cart_config() -> CartSyncConfig {
    CartSyncConfig {
        debounce: CART_DEBOUNCE,
        ..CartSyncConfig::default()
    }
}

#[must_use]
pub fn queue_config() -> UploadQueueConfig {
    UploadQueueConfig::default()
}

/// A catalog product with two lengths and one declared color.
#[must_use]
pub fn product(id: &str, cents: i64) -> CatalogProduct {
    CatalogProduct {
        id: ProductId::new(id),
        name: format!("Bundle {id}"),
        images: vec![format!("/images/{id}.jpg")],
        price_per_bundle: Decimal::new(cents, 2),
        lengths: vec![16, 20],
        colors: vec!["Natural Black".to_string()],
        color: None,
        texture: "Body Wave".to_string(),
        origin: "India".to_string(),
    }
}

#[must_use]
pub fn image(name: &str) -> NewImageUpload {
    NewImageUpload {
        file_name: name.to_string(),
        original_name: name.to_string(),
        url: format!("https://cdn.example/{name}"),
        thumbnail_url: None,
        size: 4096,
        mime_type: "image/jpeg".to_string(),
        uploaded_by: "catalog-import".to_string(),
        category: ImageCategory::Product,
        reference_id: None,
        tags: vec!["import".to_string()],
        is_active: true,
        metadata: None,
    }
}

/// Advance the paused clock by `ms` and let spawned tasks run.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
