//! Property coverage for the authoritative pricing policy.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_api::services::pricing::{to_minor_units, CartLine, PricingPolicy};
use uuid::Uuid;

fn policy(tax_rate: Decimal) -> PricingPolicy {
    PricingPolicy::new(dec!(50.00), dec!(5.99), tax_rate, "usd".into())
}

fn cart(lines: &[(u32, u32)]) -> Vec<CartLine> {
    lines
        .iter()
        .map(|(price_minor, quantity)| CartLine {
            product_id: Uuid::new_v4(),
            name: "item".into(),
            unit_price: Decimal::new(i64::from(*price_minor), 2),
            quantity: *quantity,
            selected_color: None,
            selected_size: None,
            selected_material: None,
        })
        .collect()
}

proptest! {
    /// total == subtotal + shipping + tax, within one minor unit, for any
    /// cart of reasonably sized lines.
    #[test]
    fn totals_identity_holds(
        lines in prop::collection::vec((1u32..1_000_000, 1u32..50), 1..12),
        tax_bp in 0u32..2500,
    ) {
        let tax_rate = Decimal::new(i64::from(tax_bp), 4);
        let totals = policy(tax_rate).price(&cart(&lines)).unwrap();

        let subtotal = to_minor_units(totals.subtotal).unwrap();
        let shipping = to_minor_units(totals.shipping).unwrap();
        let tax = to_minor_units(totals.tax).unwrap();
        let total = to_minor_units(totals.total).unwrap();

        prop_assert!((total - (subtotal + shipping + tax)).abs() <= 1);
    }

    /// Shipping is free exactly when the subtotal reaches the threshold.
    #[test]
    fn free_shipping_kicks_in_at_the_threshold(
        lines in prop::collection::vec((1u32..1_000_000, 1u32..50), 1..12),
    ) {
        let totals = policy(Decimal::ZERO).price(&cart(&lines)).unwrap();
        if totals.subtotal >= dec!(50.00) {
            prop_assert_eq!(totals.shipping, Decimal::ZERO);
        } else {
            prop_assert_eq!(totals.shipping, dec!(5.99));
        }
    }

    /// Money fields never go negative.
    #[test]
    fn totals_are_non_negative(
        lines in prop::collection::vec((1u32..1_000_000, 1u32..50), 1..12),
        tax_bp in 0u32..2500,
    ) {
        let tax_rate = Decimal::new(i64::from(tax_bp), 4);
        let totals = policy(tax_rate).price(&cart(&lines)).unwrap();
        prop_assert!(totals.subtotal >= Decimal::ZERO);
        prop_assert!(totals.shipping >= Decimal::ZERO);
        prop_assert!(totals.tax >= Decimal::ZERO);
        prop_assert!(totals.total >= totals.subtotal);
    }
}

#[test]
fn documented_scenario_forty_dollar_cart() {
    // 2 x 20.00 under the 50.00 threshold: flat 5.99 shipping, no tax
    let totals = policy(Decimal::ZERO).price(&cart(&[(2000, 2)])).unwrap();
    assert_eq!(totals.subtotal, dec!(40.00));
    assert_eq!(totals.shipping, dec!(5.99));
    assert_eq!(totals.total, dec!(45.99));
}
