//! In-process document store.
//!
//! Used by tests and by the binary when no database URL is configured.
//! Besides storing documents it counts calls and can be told to fail, so
//! tests can observe debounce coalescing and retry behavior.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use krd_core::DocumentId;

use super::{DocumentStore, SetMode, StoreError};

/// Call counters, one per trait method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub set: usize,
    pub update: usize,
    pub create: usize,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<(String, String), Map<String, Value>>,
    calls: CallCounts,
    failing_creates: BTreeSet<usize>,
    unavailable: bool,
    quota_exhausted: bool,
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves only counters half-updated.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Snapshot of call counters.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Read a document without counting the call.
    #[must_use]
    pub fn peek(&self, collection: &str, key: &str) -> Option<Value> {
        self.lock()
            .documents
            .get(&(collection.to_owned(), key.to_owned()))
            .cloned()
            .map(Value::Object)
    }

    /// All documents in `collection`, keyed by document key.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<(String, Value)> {
        self.lock()
            .documents
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, k), v)| (k.clone(), Value::Object(v.clone())))
            .collect()
    }

    /// Make the given 1-based `create` calls fail with [`StoreError::Rejected`].
    pub fn fail_create_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.lock().failing_creates.extend(calls);
    }

    /// While set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// While set, `create` fails with [`StoreError::ResourceExhausted`].
    pub fn set_quota_exhausted(&self, exhausted: bool) {
        self.lock().quota_exhausted = exhausted;
    }

    fn check_available(inner: &Inner) -> Result<(), StoreError> {
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let mut inner = self.lock();
        inner.calls.get += 1;
        Self::check_available(&inner)?;
        Ok(inner
            .documents
            .get(&(collection.to_owned(), key.to_owned()))
            .cloned()
            .map(Value::Object))
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        document: Map<String, Value>,
        mode: SetMode,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.set += 1;
        Self::check_available(&inner)?;
        let slot = inner
            .documents
            .entry((collection.to_owned(), key.to_owned()))
            .or_default();
        match mode {
            SetMode::Merge => slot.extend(document),
            SetMode::Replace => *slot = document,
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.update += 1;
        Self::check_available(&inner)?;
        let slot = inner
            .documents
            .get_mut(&(collection.to_owned(), key.to_owned()))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_owned(),
                key: key.to_owned(),
            })?;
        slot.extend(fields);
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        document: Map<String, Value>,
    ) -> Result<DocumentId, StoreError> {
        let mut inner = self.lock();
        inner.calls.create += 1;
        let call = inner.calls.create;
        Self::check_available(&inner)?;
        if inner.quota_exhausted {
            return Err(StoreError::ResourceExhausted(
                "document write quota exceeded".to_string(),
            ));
        }
        if inner.failing_creates.remove(&call) {
            return Err(StoreError::Rejected(format!("create call {call} rejected")));
        }
        let key = Uuid::new_v4().simple().to_string();
        inner
            .documents
            .insert((collection.to_owned(), key.clone()), document);
        Ok(DocumentId::new(key))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Self::check_available(&self.lock())
    }
}
