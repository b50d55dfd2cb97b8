//! Core domain types for KRD.
//!
//! Everything here serializes with the camelCase field names used by the
//! document store, so a stored document and its Rust type line up one to one.

pub mod email;
pub mod id;
pub mod identity;
pub mod line_item;
pub mod price;
pub mod product;
pub mod quote;
pub mod upload;

pub use email::{Email, EmailError};
pub use id::*;
pub use identity::Identity;
pub use line_item::{CartLineItem, VariantSelection, WishlistLineItem};
pub use price::{Currency, line_total};
pub use product::{CatalogProduct, DEFAULT_COLOR, PLACEHOLDER_IMAGE};
pub use quote::{BusinessType, PaymentTerms, QuoteProduct, QuoteRequest, ShippingMethod};
pub use upload::{ImageCategory, ImageMetadata, NewImageUpload};
