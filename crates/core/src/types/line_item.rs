//! Cart and wishlist line items.
//!
//! A line item is a denormalized snapshot of a product variant taken when the
//! customer added it. Price and appearance reflect add-time and are never
//! re-synced from the catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{LineItemId, ProductId};
use super::price::line_total;
use super::product::CatalogProduct;

/// Variant options chosen by the caller. Unset fields fall back to the
/// product's declared defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantSelection {
    pub length: Option<u32>,
    pub color: Option<String>,
}

impl VariantSelection {
    #[must_use]
    pub fn new(length: u32, color: impl Into<String>) -> Self {
        Self {
            length: Some(length),
            color: Some(color.into()),
        }
    }
}

/// One product variant in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    /// Unit price at add-time.
    pub price: Decimal,
    pub quantity: u32,
    pub length: u32,
    pub color: String,
    #[serde(default)]
    pub texture: String,
    #[serde(default)]
    pub origin: String,
}

impl CartLineItem {
    /// Snapshot `product` into a new line item with a fresh ID.
    #[must_use]
    pub fn from_product(
        product: &CatalogProduct,
        quantity: u32,
        selection: &VariantSelection,
    ) -> Self {
        Self {
            id: LineItemId::generate(&product.id),
            product_id: product.id.clone(),
            name: product.name.clone(),
            image: product.primary_image().to_owned(),
            price: product.price_per_bundle,
            quantity,
            length: selection.length.unwrap_or_else(|| product.default_length()),
            color: selection
                .color
                .clone()
                .unwrap_or_else(|| product.default_color().to_owned()),
            texture: product.texture.clone(),
            origin: product.origin.clone(),
        }
    }

    /// Whether this item is the same `(product, length, color)` variant.
    #[must_use]
    pub fn same_variant(&self, other: &Self) -> bool {
        self.product_id == other.product_id
            && self.length == other.length
            && self.color == other.color
    }

    /// `price x quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        line_total(self.price, self.quantity)
    }
}

/// One product in the wishlist. Existence only, no quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistLineItem {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub price: Decimal,
    pub length: u32,
    pub color: String,
    #[serde(default)]
    pub texture: String,
    #[serde(default)]
    pub origin: String,
}

impl WishlistLineItem {
    /// Snapshot `product` using its default variant.
    #[must_use]
    pub fn from_product(product: &CatalogProduct) -> Self {
        Self {
            id: LineItemId::generate(&product.id),
            product_id: product.id.clone(),
            name: product.name.clone(),
            image: product.primary_image().to_owned(),
            price: product.price_per_bundle,
            length: product.default_length(),
            color: product.default_color().to_owned(),
            texture: product.texture.clone(),
            origin: product.origin.clone(),
        }
    }
}
