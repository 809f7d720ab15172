//! Authoritative order pricing.
//!
//! Every provider flow prices carts through the same policy: flat shipping
//! below a free-shipping threshold, percentage tax on the subtotal. Amount
//! comparisons against provider reports happen in integer minor units with
//! a one-minor-unit rounding tolerance.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Allowed disagreement between a provider-reported amount and the ledger
/// total, in minor units.
pub const MINOR_UNIT_TOLERANCE: i64 = 1;

/// One cart line as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub selected_color: Option<String>,
    pub selected_size: Option<String>,
    pub selected_material: Option<String>,
}

/// Monetary breakdown of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Fee policy constants, sourced from configuration at startup.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    pub tax_rate: Decimal,
    pub currency: String,
}

impl PricingPolicy {
    pub fn new(
        free_shipping_threshold: Decimal,
        flat_shipping_fee: Decimal,
        tax_rate: Decimal,
        currency: String,
    ) -> Self {
        Self {
            free_shipping_threshold,
            flat_shipping_fee,
            tax_rate,
            currency,
        }
    }

    /// Computes the authoritative totals for a cart.
    ///
    /// Rejects empty carts and lines with non-positive quantity or price
    /// before any money math runs.
    pub fn price(&self, lines: &[CartLine]) -> Result<OrderTotals, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        let mut subtotal = Decimal::ZERO;
        for line in lines {
            if line.quantity == 0 {
                return Err(ServiceError::ValidationError(format!(
                    "item {:?} has zero quantity",
                    line.name
                )));
            }
            if line.unit_price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "item {:?} has a non-positive price",
                    line.name
                )));
            }
            subtotal += line.unit_price * Decimal::from(line.quantity);
        }
        let subtotal = subtotal.round_dp(2);

        let shipping = if subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping_fee
        };

        let tax = (subtotal * self.tax_rate).round_dp(2);
        let total = subtotal + shipping + tax;

        Ok(OrderTotals {
            subtotal,
            shipping,
            tax,
            total,
        })
    }
}

/// Converts a money amount to integer minor units, rounding half-up to the
/// nearest minor unit.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("amount out of range: {amount}"))
        })
}

/// Whether two minor-unit amounts agree within the rounding tolerance.
pub fn amounts_match(expected_minor: i64, reported_minor: i64) -> bool {
    (expected_minor - reported_minor).abs() <= MINOR_UNIT_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn policy() -> PricingPolicy {
        PricingPolicy::new(dec!(50.00), dec!(5.99), dec!(0), "usd".into())
    }

    fn line(price: Decimal, quantity: u32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            name: "Walnut desk".into(),
            unit_price: price,
            quantity,
            selected_color: None,
            selected_size: None,
            selected_material: None,
        }
    }

    #[test]
    fn subtotal_below_threshold_pays_flat_shipping() {
        // 2 x 20.00 = 40.00, under the 50.00 threshold
        let totals = policy().price(&[line(dec!(20.00), 2)]).unwrap();
        assert_eq!(totals.subtotal, dec!(40.00));
        assert_eq!(totals.shipping, dec!(5.99));
        assert_eq!(totals.tax, dec!(0));
        assert_eq!(totals.total, dec!(45.99));
    }

    #[test]
    fn subtotal_at_threshold_ships_free() {
        let totals = policy().price(&[line(dec!(25.00), 2)]).unwrap();
        assert_eq!(totals.subtotal, dec!(50.00));
        assert_eq!(totals.shipping, dec!(0));
        assert_eq!(totals.total, dec!(50.00));
    }

    #[test]
    fn tax_applies_to_the_subtotal_only() {
        let policy = PricingPolicy::new(dec!(50.00), dec!(5.99), dec!(0.0875), "usd".into());
        let totals = policy.price(&[line(dec!(20.00), 2)]).unwrap();
        assert_eq!(totals.tax, dec!(3.50));
        assert_eq!(totals.total, dec!(49.49));
    }

    #[test]
    fn empty_cart_is_rejected() {
        let err = policy().price(&[]).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn non_positive_lines_are_rejected() {
        assert!(matches!(
            policy().price(&[line(dec!(20.00), 0)]),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            policy().price(&[line(dec!(0), 1)]),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            policy().price(&[line(dec!(-3.00), 1)]),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn minor_unit_conversion_and_tolerance() {
        assert_eq!(to_minor_units(dec!(45.99)).unwrap(), 4599);
        assert_eq!(to_minor_units(dec!(45.994)).unwrap(), 4599);
        assert!(amounts_match(4599, 4599));
        assert!(amounts_match(4599, 4600));
        assert!(!amounts_match(4599, 4601));
    }
}
