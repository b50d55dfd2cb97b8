//! Session cart and wishlist.
//!
//! [`CartStore`] owns the two in-memory collections for the current session
//! and mirrors them, debounced, to the backend that fits the session's
//! identity. The in-memory collections are the source of truth: every query
//! is answered from memory, and every mutation returns before anything is
//! written.
//!
//! # Lifecycle
//!
//! 1. [`CartStore::bind`] loads both collections once for an identity.
//!    Until that load completes, mutations apply in memory but never
//!    schedule a write, so an empty default cannot overwrite the stored one.
//! 2. Each mutation schedules a full-collection overwrite after a quiet
//!    period. Rapid mutations collapse into one write of the final state.
//! 3. Binding a different identity first fires pending writes at the old
//!    backend, then replaces both collections with the new identity's data.
//!    Guest items are not merged into an authenticated cart.
//!
//! Persistence failures never reach callers. They are logged and published
//! as [`SyncEvent`]s for anyone who wants to surface sync health.

pub mod backend;

use std::sync::{Arc, Mutex, MutexGuard};

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use krd_core::{
    CartLineItem, CatalogProduct, Identity, LineItemId, ProductId, VariantSelection,
    WishlistLineItem,
};

use crate::config::CartSyncConfig;
use crate::debounce::Debouncer;
use crate::store::{DocumentStore, LocalStorage};

pub use backend::{BackendError, CollectionBackend, CollectionKind, Snapshot};

/// Errors raised to cart callers. Only misuse is reported; persistence
/// problems are not.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("cart store is not bound to a session identity")]
    Unbound,

    #[error("quantity to add must be at least 1")]
    ZeroQuantity,
}

/// Out-of-band notifications about mirror synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Both collections were loaded for a newly bound identity.
    Loaded {
        identity: Identity,
        cart_items: usize,
        wishlist_items: usize,
    },
    /// A collection could not be read and was treated as empty.
    LoadFailed {
        collection: CollectionKind,
        error: String,
    },
    /// A debounced write reached the mirror.
    Saved {
        collection: CollectionKind,
        items: usize,
    },
    /// A debounced write was dropped.
    WriteFailed {
        collection: CollectionKind,
        error: String,
    },
}

struct Binding {
    identity: Identity,
    backend: Arc<CollectionBackend>,
}

struct Session {
    binding: Option<Binding>,
    loaded: bool,
    cart: Vec<CartLineItem>,
    wishlist: Vec<WishlistLineItem>,
    cart_writes: Debouncer,
    wishlist_writes: Debouncer,
}

struct Shared {
    documents: Arc<dyn DocumentStore>,
    local: Arc<dyn LocalStorage>,
    handle: Handle,
    session: Mutex<Session>,
    events: broadcast::Sender<SyncEvent>,
    bind_lock: tokio::sync::Mutex<()>,
}

/// Cart and wishlist for one session.
///
/// Cheap to clone; clones share the same collections.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<Shared>,
}

impl CartStore {
    /// Create an unbound store on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(
        config: CartSyncConfig,
        documents: Arc<dyn DocumentStore>,
        local: Arc<dyn LocalStorage>,
    ) -> Self {
        Self::with_handle(config, documents, local, Handle::current())
    }

    /// Create an unbound store that spawns its timers and writes onto `handle`.
    #[must_use]
    pub fn with_handle(
        config: CartSyncConfig,
        documents: Arc<dyn DocumentStore>,
        local: Arc<dyn LocalStorage>,
        handle: Handle,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let session = Session {
            binding: None,
            loaded: false,
            cart: Vec::new(),
            wishlist: Vec::new(),
            cart_writes: Debouncer::new(config.debounce, handle.clone()),
            wishlist_writes: Debouncer::new(config.debounce, handle.clone()),
        };
        Self {
            inner: Arc::new(Shared {
                documents,
                local,
                handle,
                session: Mutex::new(session),
                events,
                bind_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Subscribe to synchronization events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Bind the store to `identity` and load its collections.
    ///
    /// Pending writes for the previous identity are fired first. Load
    /// failures leave the affected collection empty.
    #[instrument(skip(self), fields(authenticated = identity.is_authenticated()))]
    pub async fn bind(&self, identity: Identity) {
        let _bind = self.inner.bind_lock.lock().await;

        for write in self.fire_pending_writes() {
            let _ = write.await;
        }

        let backend = Arc::new(CollectionBackend::for_identity(
            &identity,
            &self.inner.documents,
            &self.inner.local,
        ));
        // Mutations made while the first writes were in flight scheduled new
        // ones against the old backend. Send those too, then swap.
        let stragglers: Vec<JoinHandle<()>> = {
            let mut session = self.session();
            let stragglers = [
                session.cart_writes.fire_now(),
                session.wishlist_writes.fire_now(),
            ]
            .into_iter()
            .flatten()
            .collect();
            session.binding = Some(Binding {
                identity: identity.clone(),
                backend: Arc::clone(&backend),
            });
            session.loaded = false;
            session.cart.clear();
            session.wishlist.clear();
            stragglers
        };
        for write in stragglers {
            let _ = write.await;
        }

        let (cart, wishlist) = tokio::join!(backend.load_cart(), backend.load_wishlist());
        let cart = self.loaded_or_empty(CollectionKind::Cart, cart);
        let wishlist = self.loaded_or_empty(CollectionKind::Wishlist, wishlist);

        let (cart_items, wishlist_items) = (cart.len(), wishlist.len());
        {
            let mut session = self.session();
            session.cart = cart;
            session.wishlist = wishlist;
            session.loaded = true;
        }
        info!(
            backend = backend.name(),
            cart_items, wishlist_items, "Session collections loaded"
        );
        self.emit(SyncEvent::Loaded {
            identity,
            cart_items,
            wishlist_items,
        });
    }

    fn loaded_or_empty<T>(&self, collection: CollectionKind, result: Result<Vec<T>, BackendError>) -> Vec<T> {
        result.unwrap_or_else(|e| {
            warn!(%collection, error = %e, "Failed to load collection, starting empty");
            self.emit(SyncEvent::LoadFailed {
                collection,
                error: e.to_string(),
            });
            Vec::new()
        })
    }

    /// Rebind whenever the identity provider reports a different identity.
    ///
    /// Binds to the provider's current value immediately. The task ends when
    /// the provider is dropped.
    pub fn follow_identity(&self, mut identities: watch::Receiver<Identity>) -> JoinHandle<()> {
        let store = self.clone();
        self.inner.handle.spawn(async move {
            let initial = identities.borrow_and_update().clone();
            store.bind(initial).await;
            while identities.changed().await.is_ok() {
                let next = identities.borrow_and_update().clone();
                if store.identity().as_ref() != Some(&next) {
                    store.bind(next).await;
                }
            }
            debug!("Identity provider closed, no longer following");
        })
    }

    /// The identity the store is bound to, if any.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.session().binding.as_ref().map(|b| b.identity.clone())
    }

    /// Whether the initial load for the current binding has completed.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.session().loaded
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write any pending collection immediately instead of waiting out the
    /// debounce window, and wait for those writes to finish.
    pub async fn flush(&self) {
        for write in self.fire_pending_writes() {
            let _ = write.await;
        }
    }

    /// Whether a debounced write is waiting for its quiet period.
    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        let session = self.session();
        session.cart_writes.is_pending() || session.wishlist_writes.is_pending()
    }

    fn fire_pending_writes(&self) -> Vec<JoinHandle<()>> {
        let mut session = self.session();
        [
            session.cart_writes.fire_now(),
            session.wishlist_writes.fire_now(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn schedule_write(&self, session: &mut Session, collection: CollectionKind) {
        if !session.loaded {
            debug!(%collection, "Collection not loaded yet, skipping write");
            return;
        }
        let Some(binding) = &session.binding else {
            return;
        };
        let backend = Arc::clone(&binding.backend);
        let snapshot = match collection {
            CollectionKind::Cart => Snapshot::Cart(session.cart.clone()),
            CollectionKind::Wishlist => Snapshot::Wishlist(session.wishlist.clone()),
        };
        let events = self.inner.events.clone();
        let write = async move {
            let items = snapshot.len();
            match backend.save(&snapshot).await {
                Ok(()) => {
                    debug!(%collection, items, backend = backend.name(), "Collection saved");
                    let _ = events.send(SyncEvent::Saved { collection, items });
                }
                Err(e) => {
                    warn!(%collection, error = %e, backend = backend.name(), "Failed to save collection");
                    let _ = events.send(SyncEvent::WriteFailed {
                        collection,
                        error: e.to_string(),
                    });
                }
            }
        };
        match collection {
            CollectionKind::Cart => session.cart_writes.schedule(write),
            CollectionKind::Wishlist => session.wishlist_writes.schedule(write),
        }
    }

    fn bound_session(&self) -> Result<MutexGuard<'_, Session>, CartError> {
        let session = self.session();
        if session.binding.is_none() {
            return Err(CartError::Unbound);
        }
        Ok(session)
    }

    // =========================================================================
    // Cart mutations
    // =========================================================================

    /// Add `quantity` of a product variant.
    ///
    /// If the cart already holds the same `(product, length, color)` its
    /// quantity grows instead; the existing line item's ID is returned.
    /// Unset variant options fall back to the product's defaults.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unbound` before the first bind and
    /// `CartError::ZeroQuantity` if `quantity` is 0.
    pub fn add_to_cart(
        &self,
        product: &CatalogProduct,
        quantity: u32,
        selection: &VariantSelection,
    ) -> Result<LineItemId, CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        let mut session = self.bound_session()?;
        let candidate = CartLineItem::from_product(product, quantity, selection);

        let id = if let Some(existing) = session
            .cart
            .iter_mut()
            .find(|item| item.same_variant(&candidate))
        {
            existing.quantity = existing.quantity.saturating_add(quantity);
            existing.id.clone()
        } else {
            let id = candidate.id.clone();
            session.cart.push(candidate);
            id
        };
        debug!(product_id = %product.id, quantity, line_item = %id, "Added to cart");

        self.schedule_write(&mut session, CollectionKind::Cart);
        Ok(id)
    }

    /// Remove a line item. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unbound` before the first bind.
    pub fn remove_from_cart(&self, item_id: &LineItemId) -> Result<bool, CartError> {
        let mut session = self.bound_session()?;
        let before = session.cart.len();
        session.cart.retain(|item| &item.id != item_id);
        let removed = session.cart.len() != before;
        if removed {
            self.schedule_write(&mut session, CollectionKind::Cart);
        }
        Ok(removed)
    }

    /// Set a line item's quantity. Zero or negative removes it.
    ///
    /// Returns whether the cart changed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unbound` before the first bind.
    pub fn update_cart_quantity(&self, item_id: &LineItemId, quantity: i64) -> Result<bool, CartError> {
        let Ok(quantity) = u32::try_from(quantity.max(0)) else {
            return self.set_quantity(item_id, u32::MAX);
        };
        if quantity == 0 {
            return self.remove_from_cart(item_id);
        }
        self.set_quantity(item_id, quantity)
    }

    fn set_quantity(&self, item_id: &LineItemId, quantity: u32) -> Result<bool, CartError> {
        let mut session = self.bound_session()?;
        let changed = match session.cart.iter_mut().find(|item| &item.id == item_id) {
            Some(item) if item.quantity != quantity => {
                item.quantity = quantity;
                true
            }
            _ => false,
        };
        if changed {
            self.schedule_write(&mut session, CollectionKind::Cart);
        }
        Ok(changed)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unbound` before the first bind.
    pub fn clear_cart(&self) -> Result<(), CartError> {
        let mut session = self.bound_session()?;
        session.cart.clear();
        self.schedule_write(&mut session, CollectionKind::Cart);
        Ok(())
    }

    // =========================================================================
    // Wishlist mutations
    // =========================================================================

    /// Add a product with its default variant. Adding a product that is
    /// already wishlisted does nothing and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unbound` before the first bind.
    pub fn add_to_wishlist(&self, product: &CatalogProduct) -> Result<bool, CartError> {
        let mut session = self.bound_session()?;
        if session
            .wishlist
            .iter()
            .any(|item| item.product_id == product.id)
        {
            debug!(product_id = %product.id, "Already in wishlist");
            return Ok(false);
        }
        session.wishlist.push(WishlistLineItem::from_product(product));
        self.schedule_write(&mut session, CollectionKind::Wishlist);
        Ok(true)
    }

    /// Remove a wishlist entry. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unbound` before the first bind.
    pub fn remove_from_wishlist(&self, item_id: &LineItemId) -> Result<bool, CartError> {
        let mut session = self.bound_session()?;
        let before = session.wishlist.len();
        session.wishlist.retain(|item| &item.id != item_id);
        let removed = session.wishlist.len() != before;
        if removed {
            self.schedule_write(&mut session, CollectionKind::Wishlist);
        }
        Ok(removed)
    }

    /// Empty the wishlist.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unbound` before the first bind.
    pub fn clear_wishlist(&self) -> Result<(), CartError> {
        let mut session = self.bound_session()?;
        session.wishlist.clear();
        self.schedule_write(&mut session, CollectionKind::Wishlist);
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[must_use]
    pub fn cart(&self) -> Vec<CartLineItem> {
        self.session().cart.clone()
    }

    #[must_use]
    pub fn wishlist(&self) -> Vec<WishlistLineItem> {
        self.session().wishlist.clone()
    }

    #[must_use]
    pub fn is_in_cart(&self, product_id: &ProductId) -> bool {
        self.session()
            .cart
            .iter()
            .any(|item| &item.product_id == product_id)
    }

    #[must_use]
    pub fn is_in_wishlist(&self, product_id: &ProductId) -> bool {
        self.session()
            .wishlist
            .iter()
            .any(|item| &item.product_id == product_id)
    }

    /// Sum of `price x quantity` over the cart.
    #[must_use]
    pub fn cart_total(&self) -> Decimal {
        self.session().cart.iter().map(CartLineItem::line_total).sum()
    }

    /// Sum of quantities over the cart.
    #[must_use]
    pub fn cart_item_count(&self) -> u64 {
        self.session()
            .cart
            .iter()
            .map(|item| u64::from(item.quantity))
            .sum()
    }

    #[must_use]
    pub fn wishlist_count(&self) -> usize {
        self.session().wishlist.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use tokio::sync::Semaphore;

    use krd_core::{DocumentId, UserId};

    use super::*;
    use crate::store::{MemoryDocumentStore, MemoryLocalStorage, SetMode, StoreError};

    const DEBOUNCE: Duration = Duration::from_secs(2);

    struct Fixture {
        documents: Arc<MemoryDocumentStore>,
        local: Arc<MemoryLocalStorage>,
        store: CartStore,
    }

    fn config() -> CartSyncConfig {
        CartSyncConfig {
            debounce: DEBOUNCE,
            ..CartSyncConfig::default()
        }
    }

    fn fixture() -> Fixture {
        let documents = Arc::new(MemoryDocumentStore::new());
        let local = Arc::new(MemoryLocalStorage::new());
        let store = CartStore::new(config(), documents.clone(), local.clone());
        Fixture {
            documents,
            local,
            store,
        }
    }

    fn product(id: &str, cents: i64) -> CatalogProduct {
        CatalogProduct {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            images: vec![],
            price_per_bundle: Decimal::new(cents, 2),
            lengths: vec![18, 22],
            colors: vec!["1B".to_string()],
            color: None,
            texture: "Straight".to_string(),
            origin: "India".to_string(),
        }
    }

    /// Memory store whose `get` and `set` calls each wait for a permit.
    struct GatedStore {
        inner: Arc<MemoryDocumentStore>,
        gets: Semaphore,
        sets: Semaphore,
    }

    impl GatedStore {
        fn new(inner: Arc<MemoryDocumentStore>, gets: usize, sets: usize) -> Arc<Self> {
            Arc::new(Self {
                inner,
                gets: Semaphore::new(gets),
                sets: Semaphore::new(sets),
            })
        }
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
            self.gets.acquire().await.unwrap().forget();
            self.inner.get(collection, key).await
        }

        async fn set(
            &self,
            collection: &str,
            key: &str,
            document: Map<String, Value>,
            mode: SetMode,
        ) -> Result<(), StoreError> {
            self.sets.acquire().await.unwrap().forget();
            self.inner.set(collection, key, document, mode).await
        }

        async fn update(
            &self,
            collection: &str,
            key: &str,
            fields: Map<String, Value>,
        ) -> Result<(), StoreError> {
            self.inner.update(collection, key, fields).await
        }

        async fn create(
            &self,
            collection: &str,
            document: Map<String, Value>,
        ) -> Result<DocumentId, StoreError> {
            self.inner.create(collection, document).await
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_past_debounce() {
        tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_mutations_before_bind_are_rejected() {
        let f = fixture();
        let p = product("p1", 1000);
        assert_eq!(
            f.store.add_to_cart(&p, 1, &VariantSelection::default()),
            Err(CartError::Unbound)
        );
        assert_eq!(f.store.add_to_wishlist(&p), Err(CartError::Unbound));
        assert_eq!(f.store.clear_cart(), Err(CartError::Unbound));
        assert!(!f.store.is_in_cart(&p.id));
    }

    #[tokio::test]
    async fn test_add_same_variant_increments_quantity() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        let p = product("p1", 4500);
        let selection = VariantSelection::new(22, "1B");

        let first = f.store.add_to_cart(&p, 2, &selection).unwrap();
        let second = f.store.add_to_cart(&p, 3, &selection).unwrap();
        assert_eq!(first, second);

        let cart = f.store.cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_different_variants_are_separate_lines() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        let p = product("p1", 4500);

        f.store.add_to_cart(&p, 1, &VariantSelection::new(18, "1B")).unwrap();
        f.store.add_to_cart(&p, 1, &VariantSelection::new(22, "1B")).unwrap();
        f.store.add_to_cart(&p, 1, &VariantSelection::new(22, "613")).unwrap();
        // Defaults resolve to (18, "1B"), matching the first line.
        f.store.add_to_cart(&p, 1, &VariantSelection::default()).unwrap();

        let cart = f.store.cart();
        assert_eq!(cart.len(), 3);
        assert_eq!(cart[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_zero_quantity_add_is_rejected() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        assert_eq!(
            f.store.add_to_cart(&product("p", 1), 0, &VariantSelection::default()),
            Err(CartError::ZeroQuantity)
        );
    }

    #[tokio::test]
    async fn test_update_to_zero_or_negative_removes() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        let a = f.store.add_to_cart(&product("a", 100), 2, &VariantSelection::default()).unwrap();
        let b = f.store.add_to_cart(&product("b", 100), 2, &VariantSelection::default()).unwrap();

        assert!(f.store.update_cart_quantity(&a, 0).unwrap());
        assert!(f.store.update_cart_quantity(&b, -1).unwrap());
        assert!(f.store.cart().is_empty());
    }

    #[tokio::test]
    async fn test_update_sets_quantity() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        let a = f.store.add_to_cart(&product("a", 100), 2, &VariantSelection::default()).unwrap();

        assert!(f.store.update_cart_quantity(&a, 7).unwrap());
        assert!(!f.store.update_cart_quantity(&a, 7).unwrap());
        assert!(!f.store.update_cart_quantity(&LineItemId::new("missing"), 3).unwrap());
        assert_eq!(f.store.cart_item_count(), 7);
    }

    #[tokio::test]
    async fn test_wishlist_dedupes_on_product() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        let p = product("p1", 100);

        assert!(f.store.add_to_wishlist(&p).unwrap());
        assert!(!f.store.add_to_wishlist(&p).unwrap());
        assert_eq!(f.store.wishlist_count(), 1);
        assert!(f.store.is_in_wishlist(&p.id));

        let id = f.store.wishlist()[0].id.clone();
        assert!(f.store.remove_from_wishlist(&id).unwrap());
        assert!(!f.store.is_in_wishlist(&p.id));
    }

    #[tokio::test]
    async fn test_totals() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        f.store.add_to_cart(&product("a", 4550), 2, &VariantSelection::default()).unwrap();
        f.store.add_to_cart(&product("b", 1000), 3, &VariantSelection::default()).unwrap();

        assert_eq!(f.store.cart_total(), Decimal::new(12100, 2));
        assert_eq!(f.store.cart_item_count(), 5);

        f.store.clear_cart().unwrap();
        assert_eq!(f.store.cart_total(), Decimal::ZERO);
        assert_eq!(f.store.cart_item_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_mutations_is_one_remote_write() {
        let f = fixture();
        f.store.bind(Identity::Authenticated(UserId::new("u1"))).await;
        let id = f
            .store
            .add_to_cart(&product("p1", 1000), 1, &VariantSelection::default())
            .unwrap();
        for quantity in 2..=6 {
            f.store.update_cart_quantity(&id, quantity).unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(f.documents.calls().set, 0);

        wait_past_debounce().await;

        assert_eq!(f.documents.calls().set, 1);
        let doc = f.documents.peek("carts", "u1").unwrap();
        assert_eq!(doc["items"][0]["quantity"], Value::from(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_writes_go_to_local_storage() {
        let f = fixture();
        f.store.bind(Identity::Anonymous).await;
        f.store.add_to_wishlist(&product("w1", 100)).unwrap();
        wait_past_debounce().await;

        let raw = f.local.get_item(backend::GUEST_WISHLIST_KEY).unwrap().unwrap();
        let items: Vec<WishlistLineItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(f.documents.calls().set, 0);
    }

    #[tokio::test]
    async fn test_malformed_local_cache_loads_empty() {
        let f = fixture();
        f.local.set_item(backend::GUEST_CART_KEY, "not json at all").unwrap();
        let mut events = f.store.subscribe();

        f.store.bind(Identity::Anonymous).await;

        assert!(f.store.cart().is_empty());
        assert!(f.store.is_loaded());
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::LoadFailed {
                collection: CollectionKind::Cart,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_reported_not_raised() {
        let f = fixture();
        f.store.bind(Identity::Authenticated(UserId::new("u1"))).await;
        let mut events = f.store.subscribe();
        f.documents.set_unavailable(true);

        f.store.add_to_wishlist(&product("p", 100)).unwrap();
        wait_past_debounce().await;

        assert!(f.store.is_in_wishlist(&ProductId::new("p")));
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::WriteFailed {
                collection: CollectionKind::Wishlist,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_without_waiting() {
        let f = fixture();
        f.store.bind(Identity::Authenticated(UserId::new("u1"))).await;
        f.store.add_to_cart(&product("p", 100), 1, &VariantSelection::default()).unwrap();
        assert!(f.store.has_pending_writes());

        f.store.flush().await;

        assert!(!f.store.has_pending_writes());
        assert_eq!(f.documents.calls().set, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_during_load_never_write() {
        let memory = Arc::new(MemoryDocumentStore::new());
        let local = Arc::new(MemoryLocalStorage::new());
        let user = Identity::Authenticated(UserId::new("u1"));

        let earlier = CartStore::new(config(), memory.clone(), local.clone());
        earlier.bind(user.clone()).await;
        earlier.add_to_cart(&product("saved", 1000), 1, &VariantSelection::default()).unwrap();
        earlier.flush().await;
        let writes_before = memory.calls().set;

        let gated = GatedStore::new(memory.clone(), 0, Semaphore::MAX_PERMITS);
        let store = CartStore::new(config(), gated.clone(), local.clone());
        let binding = tokio::spawn({
            let store = store.clone();
            async move { store.bind(user).await }
        });
        settle().await;
        assert!(!store.is_loaded());

        store.add_to_cart(&product("early", 500), 2, &VariantSelection::default()).unwrap();
        store.add_to_wishlist(&product("early", 500)).unwrap();
        assert!(!store.has_pending_writes());
        wait_past_debounce().await;
        assert_eq!(memory.calls().set, writes_before);

        gated.gets.add_permits(2);
        binding.await.unwrap();
        wait_past_debounce().await;

        assert!(store.is_loaded());
        assert!(store.is_in_cart(&ProductId::new("saved")));
        assert!(!store.is_in_cart(&ProductId::new("early")));
        assert!(store.wishlist().is_empty());
        assert_eq!(memory.calls().set, writes_before);
        let doc = memory.peek("carts", "u1").unwrap();
        assert_eq!(doc["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_during_rebind_reach_previous_backend() {
        let memory = Arc::new(MemoryDocumentStore::new());
        let local = Arc::new(MemoryLocalStorage::new());
        let user = Identity::Authenticated(UserId::new("u1"));
        let gated = GatedStore::new(memory.clone(), Semaphore::MAX_PERMITS, 0);
        let store = CartStore::new(config(), gated.clone(), local.clone());
        store.bind(user.clone()).await;
        store.add_to_cart(&product("a", 100), 1, &VariantSelection::default()).unwrap();

        let rebinding = tokio::spawn({
            let store = store.clone();
            async move { store.bind(Identity::Anonymous).await }
        });
        settle().await;
        // The first write is held inside the store, so the old binding is live.
        assert_eq!(store.identity(), Some(user));
        store.add_to_cart(&product("b", 100), 1, &VariantSelection::default()).unwrap();

        gated.sets.add_permits(8);
        rebinding.await.unwrap();

        assert_eq!(store.identity(), Some(Identity::Anonymous));
        assert!(store.cart().is_empty());
        assert_eq!(memory.calls().set, 2);
        let doc = memory.peek("carts", "u1").unwrap();
        assert_eq!(doc["items"].as_array().unwrap().len(), 2);
        assert!(local.get_item(backend::GUEST_CART_KEY).unwrap().is_none());
    }
}
