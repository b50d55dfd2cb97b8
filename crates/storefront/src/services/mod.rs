//! Background services owned by the application state.
//!
//! - [`upload_queue`] - debounced, batched creation of image metadata records
//! - [`quotes`] - quote submission with a local outbox for quota outages

pub mod quotes;
pub mod upload_queue;

pub use quotes::{PendingQuote, QuoteError, QuoteOutbox, QuoteSubmission, SyncReport};
pub use upload_queue::{DeadLetter, QueueEvent, QueueStatus, QueuedRecord, UploadQueue};
