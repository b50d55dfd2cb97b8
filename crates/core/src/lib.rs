//! KRD Core - Shared domain types.
//!
//! This crate provides the types shared by every KRD component:
//! - `storefront` - Cart/wishlist sync, upload queue and quote outbox
//! - `cli` - Command-line tools for migrations and quote maintenance
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no timers. Anything that talks to a store lives in `krd-storefront`.
//!
//! # Modules
//!
//! - [`types`] - IDs, line items, catalog snapshots, identity, uploads and quotes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
