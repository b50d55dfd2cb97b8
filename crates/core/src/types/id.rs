//! Newtype IDs for type-safe entity references.
//!
//! The document store addresses everything by string keys, so every ID here
//! wraps a `String`. Use the `define_id!` macro to create wrappers that
//! prevent accidentally passing a product ID where a line item ID belongs.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use krd_core::define_id;
/// define_id!(SkuId);
/// define_id!(WarehouseId);
///
/// let sku = SkuId::new("BW-18");
/// let warehouse = WarehouseId::new("BW-18");
///
/// // These are different types, so this won't compile:
/// // let _: SkuId = warehouse;
/// assert_eq!(sku.as_str(), warehouse.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(UserId);
define_id!(ProductId);
define_id!(LineItemId);
define_id!(DocumentId);

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Random lowercase base36 suffix used to make generated IDs collision-resistant.
#[must_use]
pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}

/// Milliseconds since the Unix epoch, saturating to zero for pre-epoch clocks.
#[must_use]
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

impl LineItemId {
    /// Generate an ID for a freshly inserted line item.
    ///
    /// Format: `{product_id}_{unix_millis}_{9 base36 chars}`.
    #[must_use]
    pub fn generate(product_id: &ProductId) -> Self {
        Self(format!("{product_id}_{}_{}", unix_millis(), random_suffix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_line_item_ids_embed_product() {
        let product = ProductId::new("brazilian-body-wave");
        let id = LineItemId::generate(&product);
        assert!(id.as_str().starts_with("brazilian-body-wave_"));

        let suffix = id.as_str().rsplit('_').next().unwrap_or_default();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_generated_ids_differ() {
        let product = ProductId::new("p1");
        let a = LineItemId::generate(&product);
        let b = LineItemId::generate(&product);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = UserId::new("uid-42");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"uid-42\"");
    }
}
