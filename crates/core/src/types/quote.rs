//! Wholesale quote requests.
//!
//! Only the fields the quote outbox needs to round-trip are modelled; the
//! review workflow that follows submission belongs to the admin panel.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::ProductId;
use super::price::{Currency, line_total};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Salon,
    Distributor,
    Wholesaler,
    Retailer,
    OnlineStore,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Air,
    Sea,
    Land,
    Express,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerms {
    #[serde(rename = "net_30")]
    Net30,
    #[serde(rename = "net_60")]
    Net60,
    CashOnDelivery,
    LetterOfCredit,
    #[default]
    AdvancePayment,
}

/// One product line in a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteProduct {
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(default)]
    pub texture: String,
    #[serde(default)]
    pub origin: String,
    pub length: u32,
    pub color: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A quote request as submitted by a business customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub customer_name: String,
    pub email: Email,
    pub phone: String,
    pub company_name: String,
    #[serde(default)]
    pub business_type: BusinessType,
    pub products: Vec<QuoteProduct>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub payment_terms: PaymentTerms,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requirements: Option<String>,
}

impl QuoteRequest {
    /// Total bundles across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.products.iter().map(|p| u64::from(p.quantity)).sum()
    }

    /// Sum of `unit_price x quantity` across all lines.
    #[must_use]
    pub fn total_value(&self) -> Decimal {
        self.products
            .iter()
            .map(|p| line_total(p.unit_price, p.quantity))
            .sum()
    }
}
