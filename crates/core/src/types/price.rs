//! Decimal price helpers and quote currencies.
//!
//! Prices are plain [`Decimal`] amounts in the currency's standard unit
//! (dollars, not cents). Carts are single-currency, so line items carry only
//! the amount; quotes name their currency explicitly.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// `unit_price x quantity` without floating-point rounding.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Currencies a wholesale quote can be priced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    INR,
}

impl Currency {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::INR => "₹",
        }
    }

    /// Format an amount for display, e.g. `$19.99`.
    #[must_use]
    pub fn format(self, amount: Decimal) -> String {
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        format!("{}{rounded:.2}", self.symbol())
    }
}
