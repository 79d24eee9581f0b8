//! Storefront pricing rules and the decimal → minor-unit boundary.
//!
//! Everything inside the storefront works in [`Decimal`] currency amounts.
//! Amounts only become integers (cents) when they leave for the payment
//! provider, via [`to_minor_units`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Tax and shipping rules applied to a cart subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    /// Shipping is free when the subtotal is strictly greater than this.
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.08),
            free_shipping_threshold: dec!(50),
            flat_shipping_rate: dec!(8.99),
        }
    }
}

impl PricingPolicy {
    pub fn tax_for(&self, subtotal: Decimal) -> Result<Decimal, ServiceError> {
        subtotal
            .checked_mul(self.tax_rate)
            .map(round_currency)
            .ok_or_else(|| out_of_range(subtotal))
    }

    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping_rate
        }
    }

    /// Additional subtotal needed before shipping becomes free.
    ///
    /// The threshold is exclusive, so a subtotal sitting exactly on it still
    /// needs one more cent.
    pub fn amount_to_free_shipping(&self, subtotal: Decimal) -> Decimal {
        if subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.free_shipping_threshold - subtotal + dec!(0.01)
        }
    }
}

/// Rounds to cents, half away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a currency amount to integer minor units (cents), rounding half-up.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "amount must not be negative: {}",
            amount
        )));
    }
    round_currency(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| out_of_range(amount))
}

pub(crate) fn out_of_range(amount: Decimal) -> ServiceError {
    ServiceError::ValidationError(format!("amount out of range: {}", amount))
}

/// Converts integer minor units back to a currency amount.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
