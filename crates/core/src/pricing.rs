//! Cart and order totals derivation.
//!
//! Pure arithmetic over `Decimal`: subtotal, then tax on the subtotal, then
//! a flat shipping fee waived above the free-shipping threshold. No I/O and
//! no clock; callers hand in line amounts and a `PricingConfig`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(10, 2),
            free_shipping_threshold: Decimal::from(100),
            flat_shipping_fee: Decimal::from(10),
        }
    }
}

/// One cart line reduced to the two numbers pricing cares about.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineAmount {
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineAmount {
    pub fn new(unit_price: Decimal, quantity: u32) -> Self {
        Self { unit_price, quantity }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Half-up rounding to two decimal places.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derives totals for a set of lines. A negative unit price or a zero
/// quantity is rejected rather than clamped; both are caller contract
/// violations.
pub fn price_lines(lines: &[LineAmount], config: &PricingConfig) -> Result<Totals, DomainError> {
    for line in lines {
        if line.unit_price < Decimal::ZERO {
            return Err(DomainError::NegativePrice);
        }
        if line.quantity == 0 {
            return Err(DomainError::QuantityZero);
        }
    }
    Ok(totals_of(lines, config))
}

/// Same derivation as [`price_lines`] for lines already known to be valid.
pub(crate) fn totals_of(lines: &[LineAmount], config: &PricingConfig) -> Totals {
    let subtotal: Decimal =
        lines.iter().map(|line| line.unit_price * Decimal::from(line.quantity)).sum();
    let tax = round_cents(subtotal * config.tax_rate);
    let shipping = if subtotal >= config.free_shipping_threshold {
        Decimal::ZERO
    } else {
        config.flat_shipping_fee
    };
    let total = subtotal + tax + shipping;

    Totals { subtotal, tax, shipping, total }
}
