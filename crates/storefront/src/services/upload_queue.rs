//! Deferred image metadata upload queue.
//!
//! Callers hand over an image record and return immediately. Records are
//! collected over a trailing debounce window, then written to the `images`
//! collection in bounded batches:
//!
//! 1. `enqueue` appends the record and restarts the debounce timer
//! 2. When the timer fires, up to `batch_size` records are taken from the head
//!    and created one at a time with a short pause between writes
//! 3. A record whose write fails goes back to the tail of the queue, or to the
//!    dead-letter list once it has failed `max_attempts` times
//! 4. If records remain, another flush runs after the drain delay
//!
//! If the store is unreachable altogether the batch stops and every record
//! not yet written returns to the head of the queue in its original order.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use krd_core::{DocumentId, NewImageUpload};

use crate::config::UploadQueueConfig;
use crate::debounce::Debouncer;
use crate::store::{DocumentStore, StoreError, collections, to_document};

/// A record waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRecord {
    pub record: NewImageUpload,
    pub enqueued_at: DateTime<Utc>,
    /// Failed write attempts so far.
    pub attempts: u32,
}

/// A record given up on after repeated failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub record: NewImageUpload,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: String,
}

/// Snapshot returned by [`UploadQueue::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_length: usize,
    /// Earliest enqueue time among queued records.
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
    pub dead_lettered: usize,
}

/// Notifications about queue progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Created {
        file_name: String,
        document_id: DocumentId,
    },
    Requeued {
        file_name: String,
        attempts: u32,
    },
    DeadLettered {
        file_name: String,
        attempts: u32,
    },
    /// The store was unreachable; `returned` records went back to the head.
    BatchAborted {
        returned: usize,
    },
}

struct QueueState {
    records: VecDeque<QueuedRecord>,
    dead_letters: VecDeque<DeadLetter>,
    /// Trailing window restarted by every `enqueue`.
    debounce: Debouncer,
    /// Follow-up flush while records remain. `enqueue` leaves it alone.
    drain: Debouncer,
}

struct Shared {
    config: UploadQueueConfig,
    store: Arc<dyn DocumentStore>,
    state: Mutex<QueueState>,
    flush_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<QueueEvent>,
}

/// Upload metadata queue service.
///
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<Shared>,
}

impl UploadQueue {
    /// Create an empty queue on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(config: UploadQueueConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self::with_handle(config, store, Handle::current())
    }

    /// Create an empty queue whose timers run on `handle`.
    #[must_use]
    pub fn with_handle(
        config: UploadQueueConfig,
        store: Arc<dyn DocumentStore>,
        handle: Handle,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = QueueState {
            records: VecDeque::new(),
            dead_letters: VecDeque::new(),
            debounce: Debouncer::new(config.debounce, handle.clone()),
            drain: Debouncer::new(config.drain_delay, handle),
        };
        Self {
            inner: Arc::new(Shared {
                config,
                store,
                state: Mutex::new(state),
                flush_lock: tokio::sync::Mutex::new(()),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Subscribe to queue events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Flush task for the timer. Holds the queue weakly so a pending timer
    /// does not keep a dropped queue alive.
    fn timed_flush(&self) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        let queue: Weak<Shared> = Arc::downgrade(&self.inner);
        Box::pin(async move {
            if let Some(inner) = queue.upgrade() {
                Self { inner }.flush().await;
            }
        })
    }

    /// Add a record and restart the debounce window.
    pub fn enqueue(&self, record: NewImageUpload) {
        let flush = self.timed_flush();
        let mut state = self.state();
        debug!(file_name = %record.file_name, queued = state.records.len() + 1, "Queued image record");
        state.records.push_back(QueuedRecord {
            record,
            enqueued_at: Utc::now(),
            attempts: 0,
        });
        state.debounce.schedule(flush);
    }

    /// Write one batch from the head of the queue.
    ///
    /// Does nothing when the queue is empty. Flushes never overlap; a call
    /// made while another is running waits for it.
    #[instrument(skip(self))]
    pub async fn flush(&self) {
        let _flushing = self.inner.flush_lock.lock().await;

        let mut batch: VecDeque<QueuedRecord> = {
            let mut state = self.state();
            let take = self.inner.config.batch_size.min(state.records.len());
            state.records.drain(..take).collect()
        };
        if batch.is_empty() {
            return;
        }
        info!(batch = batch.len(), "Processing queued image records");

        let mut first = true;
        while let Some(mut queued) = batch.pop_front() {
            if !first {
                tokio::time::sleep(self.inner.config.item_delay).await;
            }
            first = false;

            match self.create(&queued.record).await {
                Ok(document_id) => {
                    debug!(file_name = %queued.record.file_name, %document_id, "Created image record");
                    self.emit(QueueEvent::Created {
                        file_name: queued.record.file_name,
                        document_id,
                    });
                }
                Err(e) if e.is_unavailable() => {
                    batch.push_front(queued);
                    let returned = batch.len();
                    error!(error = %e, returned, "Document store unavailable, returning batch to queue");
                    {
                        let mut state = self.state();
                        for record in batch.drain(..).rev() {
                            state.records.push_front(record);
                        }
                    }
                    self.emit(QueueEvent::BatchAborted { returned });
                    return;
                }
                Err(e) => {
                    queued.attempts += 1;
                    warn!(
                        file_name = %queued.record.file_name,
                        attempts = queued.attempts,
                        error = %e,
                        "Failed to create image record"
                    );
                    self.requeue_or_dead_letter(queued, &e);
                }
            }
        }

        let mut state = self.state();
        if !state.records.is_empty() {
            debug!(remaining = state.records.len(), "Scheduling next batch");
            let flush = self.timed_flush();
            state.drain.schedule(flush);
        }
    }

    /// Skip the debounce window and flush once. The batch cap still applies.
    pub async fn force_flush(&self) {
        self.cancel_timers();
        self.flush().await;
    }

    /// Flush batch after batch until the queue is empty or a flush makes no
    /// progress. Returns the number of records left behind.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> usize {
        loop {
            let before = self.status().queue_length;
            if before == 0 {
                return 0;
            }
            self.force_flush().await;
            let after = self.status().queue_length;
            if after >= before {
                warn!(remaining = after, "Upload queue drain stalled");
                self.cancel_timers();
                return after;
            }
        }
    }

    /// Drop every queued record and cancel any pending flush.
    ///
    /// Returns how many records were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.state();
        state.debounce.cancel();
        state.drain.cancel();
        let dropped = state.records.len();
        state.records.clear();
        if dropped > 0 {
            warn!(dropped, "Upload queue cleared");
        }
        dropped
    }

    fn cancel_timers(&self) {
        let mut state = self.state();
        state.debounce.cancel();
        state.drain.cancel();
    }

    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let state = self.state();
        QueueStatus {
            queue_length: state.records.len(),
            oldest_enqueued_at: state.records.iter().map(|r| r.enqueued_at).min(),
            dead_lettered: state.dead_letters.len(),
        }
    }

    /// Records currently waiting, head first.
    #[must_use]
    pub fn queued(&self) -> Vec<QueuedRecord> {
        self.state().records.iter().cloned().collect()
    }

    /// Records abandoned after `max_attempts` failures, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state().dead_letters.iter().cloned().collect()
    }

    async fn create(&self, record: &NewImageUpload) -> Result<DocumentId, StoreError> {
        let mut document = to_document(record)?;
        document.insert(
            "uploadedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.inner.store.create(collections::IMAGES, document).await
    }

    fn requeue_or_dead_letter(&self, queued: QueuedRecord, cause: &StoreError) {
        let file_name = queued.record.file_name.clone();
        let attempts = queued.attempts;
        let mut state = self.state();

        if attempts < self.inner.config.max_attempts {
            state.records.push_back(queued);
            drop(state);
            self.emit(QueueEvent::Requeued {
                file_name,
                attempts,
            });
            return;
        }

        if state.dead_letters.len() >= self.inner.config.dead_letter_capacity {
            if let Some(evicted) = state.dead_letters.pop_front() {
                warn!(file_name = %evicted.record.file_name, "Dead-letter list full, discarding oldest");
            }
        }
        if self.inner.config.dead_letter_capacity > 0 {
            state.dead_letters.push_back(DeadLetter {
                record: queued.record,
                enqueued_at: queued.enqueued_at,
                attempts,
                last_error: cause.to_string(),
            });
        }
        drop(state);
        error!(%file_name, attempts, "Giving up on image record");
        self.emit(QueueEvent::DeadLettered {
            file_name,
            attempts,
        });
    }
}
