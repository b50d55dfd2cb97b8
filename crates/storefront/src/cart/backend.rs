//! Persistence backends for the session collections.
//!
//! A backend is chosen once, when the store binds to an identity:
//! authenticated sessions mirror to the document store, anonymous sessions
//! to device-local storage. Mutation logic never branches on which one it
//! has; it hands a [`Snapshot`] to whichever backend is bound.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use krd_core::{CartLineItem, Identity, UserId, WishlistLineItem};

use crate::store::{DocumentStore, LocalStorage, SetMode, StorageError, StoreError, collections};

/// Local storage key for an anonymous cart.
pub const GUEST_CART_KEY: &str = "guest_cart";
/// Local storage key for an anonymous wishlist.
pub const GUEST_WISHLIST_KEY: &str = "guest_wishlist";

/// Which of the two session collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Cart,
    Wishlist,
}

impl CollectionKind {
    const fn remote_collection(self) -> &'static str {
        match self {
            Self::Cart => collections::CARTS,
            Self::Wishlist => collections::WISHLISTS,
        }
    }

    const fn local_key(self) -> &'static str {
        match self {
            Self::Cart => GUEST_CART_KEY,
            Self::Wishlist => GUEST_WISHLIST_KEY,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cart => "cart",
            Self::Wishlist => "wishlist",
        })
    }
}

/// Full contents of one collection at the moment a write was scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Cart(Vec<CartLineItem>),
    Wishlist(Vec<WishlistLineItem>),
}

impl Snapshot {
    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        match self {
            Self::Cart(_) => CollectionKind::Cart,
            Self::Wishlist(_) => CollectionKind::Wishlist,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Cart(items) => items.len(),
            Self::Wishlist(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn items_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Cart(items) => serde_json::to_value(items),
            Self::Wishlist(items) => serde_json::to_value(items),
        }
    }
}

/// Errors from a collection backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("malformed {0} data: {1}")]
    Malformed(CollectionKind, serde_json::Error),
}

/// Mirror in the document store, keyed by user ID.
///
/// Documents look like `{"items": [...], "updatedAt": "<rfc3339>"}` and are
/// written with merge semantics: `items` is replaced whole, other fields
/// are preserved.
pub struct RemoteBackend {
    store: Arc<dyn DocumentStore>,
    user_id: UserId,
}

impl RemoteBackend {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, user_id: UserId) -> Self {
        Self { store, user_id }
    }

    async fn load<T: DeserializeOwned>(&self, kind: CollectionKind) -> Result<Vec<T>, BackendError> {
        let document = self
            .store
            .get(kind.remote_collection(), self.user_id.as_str())
            .await?;
        match document.and_then(|mut doc| doc.get_mut("items").map(Value::take)) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(items) => {
                serde_json::from_value(items).map_err(|e| BackendError::Malformed(kind, e))
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), BackendError> {
        let kind = snapshot.kind();
        let mut document = Map::new();
        document.insert(
            "items".to_string(),
            snapshot.items_json().map_err(StoreError::from)?,
        );
        document.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.store
            .set(
                kind.remote_collection(),
                self.user_id.as_str(),
                document,
                SetMode::Merge,
            )
            .await?;
        Ok(())
    }
}

/// Mirror in device-local storage as JSON arrays.
pub struct LocalBackend {
    storage: Arc<dyn LocalStorage>,
}

impl LocalBackend {
    #[must_use]
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    fn load<T: DeserializeOwned>(&self, kind: CollectionKind) -> Result<Vec<T>, BackendError> {
        match self.storage.get_item(kind.local_key())? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| BackendError::Malformed(kind, e)),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), BackendError> {
        let raw = match snapshot {
            Snapshot::Cart(items) => to_json(items),
            Snapshot::Wishlist(items) => to_json(items),
        }
        .map_err(StoreError::from)?;
        self.storage.set_item(snapshot.kind().local_key(), &raw)?;
        Ok(())
    }
}

fn to_json<T: Serialize>(items: &[T]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

/// The mirror for one bound identity.
pub enum CollectionBackend {
    Remote(RemoteBackend),
    Local(LocalBackend),
}

impl CollectionBackend {
    /// Pick the backend appropriate for `identity`.
    #[must_use]
    pub fn for_identity(
        identity: &Identity,
        documents: &Arc<dyn DocumentStore>,
        local: &Arc<dyn LocalStorage>,
    ) -> Self {
        match identity {
            Identity::Authenticated(user_id) => {
                Self::Remote(RemoteBackend::new(Arc::clone(documents), user_id.clone()))
            }
            Identity::Anonymous => Self::Local(LocalBackend::new(Arc::clone(local))),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Local(_) => "local",
        }
    }

    /// Read the stored cart.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the mirror cannot be read or holds malformed data.
    pub async fn load_cart(&self) -> Result<Vec<CartLineItem>, BackendError> {
        match self {
            Self::Remote(remote) => remote.load(CollectionKind::Cart).await,
            Self::Local(local) => local.load(CollectionKind::Cart),
        }
    }

    /// Read the stored wishlist.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the mirror cannot be read or holds malformed data.
    pub async fn load_wishlist(&self) -> Result<Vec<WishlistLineItem>, BackendError> {
        match self {
            Self::Remote(remote) => remote.load(CollectionKind::Wishlist).await,
            Self::Local(local) => local.load(CollectionKind::Wishlist),
        }
    }

    /// Overwrite one stored collection with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the write fails.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), BackendError> {
        match self {
            Self::Remote(remote) => remote.save(snapshot).await,
            Self::Local(local) => local.save(snapshot),
        }
    }
}
