//! KRD storefront sync core.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused:
//!
//! - [`cart`] - session cart and wishlist with debounced mirroring
//! - [`services::upload_queue`] - deferred, batched image metadata writes
//! - [`services::quotes`] - quote submission with a local outbox
//! - [`store`] - document store and local storage abstractions
//! - [`db`] - `PostgreSQL` document store
//! - [`routes`] - HTTP operations surface

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod db;
pub mod debounce;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
