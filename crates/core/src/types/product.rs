//! Catalog product snapshot.
//!
//! The sync core only reads display fields from the catalog at the moment an
//! item is added. The snapshot is copied into the line item and never
//! refreshed afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Color used when neither the caller nor the product names one.
pub const DEFAULT_COLOR: &str = "Natural Black";

/// Image used when the product has no images.
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

/// Display data for one catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Unit price of one bundle.
    pub price_per_bundle: Decimal,
    /// Available lengths in inches, in catalog order.
    #[serde(default)]
    pub lengths: Vec<u32>,
    /// Available colors, in catalog order.
    #[serde(default)]
    pub colors: Vec<String>,
    /// Single fixed color for products sold in only one shade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub texture: String,
    #[serde(default)]
    pub origin: String,
}

impl CatalogProduct {
    /// First product image, or the placeholder.
    #[must_use]
    pub fn primary_image(&self) -> &str {
        self.images.first().map_or(PLACEHOLDER_IMAGE, String::as_str)
    }

    /// Length to use when the caller did not pick one.
    #[must_use]
    pub fn default_length(&self) -> u32 {
        self.lengths.first().copied().unwrap_or(0)
    }

    /// Color to use when the caller did not pick one.
    ///
    /// Falls back from the fixed `color`, to the first listed color, to
    /// [`DEFAULT_COLOR`].
    #[must_use]
    pub fn default_color(&self) -> &str {
        self.color
            .as_deref()
            .or_else(|| self.colors.first().map(String::as_str))
            .unwrap_or(DEFAULT_COLOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> CatalogProduct {
        CatalogProduct {
            id: ProductId::new("p1"),
            name: "Raw Indian Straight".to_string(),
            images: vec![],
            price_per_bundle: Decimal::new(4500, 2),
            lengths: vec![],
            colors: vec![],
            color: None,
            texture: "Straight".to_string(),
            origin: "India".to_string(),
        }
    }

    #[test]
    fn test_defaults_when_product_declares_nothing() {
        let p = product();
        assert_eq!(p.primary_image(), PLACEHOLDER_IMAGE);
        assert_eq!(p.default_length(), 0);
        assert_eq!(p.default_color(), DEFAULT_COLOR);
    }

    #[test]
    fn test_defaults_follow_declared_options() {
        let mut p = product();
        p.images = vec!["/img/a.jpg".to_string(), "/img/b.jpg".to_string()];
        p.lengths = vec![18, 22];
        p.colors = vec!["1B".to_string(), "613".to_string()];
        assert_eq!(p.primary_image(), "/img/a.jpg");
        assert_eq!(p.default_length(), 18);
        assert_eq!(p.default_color(), "1B");

        p.color = Some("Dark Brown".to_string());
        assert_eq!(p.default_color(), "Dark Brown");
    }

    #[test]
    fn test_deserializes_numeric_price() {
        let json = r#"{"id":"p9","name":"Body Wave","pricePerBundle":52.5}"#;
        let p: CatalogProduct = serde_json::from_str(json).expect("valid product json");
        assert_eq!(p.price_per_bundle, Decimal::new(525, 1));
        assert!(p.lengths.is_empty());
    }
}
