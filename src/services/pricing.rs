use crate::config::AppConfig;
use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use uuid::Uuid;

/// One cart line priced at the current catalog price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLine {
    pub product_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl PriceLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    /// Unrounded; only `total` is rounded.
    pub tax: Decimal,
    pub total: Decimal,
}

/// Flat shipping plus a percentage tax on the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub shipping_flat_fee: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping_flat_fee: dec!(9.99),
            tax_rate: dec!(0.0875),
        }
    }
}

impl From<&AppConfig> for PricingPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            shipping_flat_fee: cfg.shipping_flat_fee,
            tax_rate: cfg.tax_rate,
        }
    }
}

impl PricingPolicy {
    /// Total is rounded exactly once, to two decimals, half away from zero.
    pub fn quote(&self, lines: &[PriceLine]) -> Quote {
        let subtotal: Decimal = lines.iter().map(PriceLine::line_total).sum();
        let tax = subtotal * self.tax_rate;
        let total = (subtotal + self.shipping_flat_fee + tax)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        Quote {
            subtotal,
            shipping: self.shipping_flat_fee,
            tax,
            total,
        }
    }
}

/// Converts a two-decimal major amount to integral minor units (paise, cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let minor = amount * Decimal::ONE_HUNDRED;
    if !minor.fract().is_zero() {
        return Err(ServiceError::InternalError(format!(
            "amount {} has more than two decimal places",
            amount
        )));
    }
    minor.to_i64().ok_or_else(|| {
        ServiceError::InternalError(format!("amount {} does not fit in minor units", amount))
    })
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
