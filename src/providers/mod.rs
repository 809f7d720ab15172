//! Payment provider adapters.
//!
//! Translate the internal cart/order shape into each processor's request
//! schema and back. Totals and stock rules live in the services layer, not
//! here.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

pub mod paypal;
pub mod stripe;

/// One cart line, already priced, in integer minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount_minor: i64,
    pub quantity: u32,
}

/// Provider-agnostic session request assembled by the orchestrator.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub shipping_minor: i64,
    pub tax_minor: i64,
    pub currency: String,
    /// Internal order number, echoed back by the provider for support.
    pub reference: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub locale: Option<String>,
}

impl CreateSessionRequest {
    pub fn amount_total_minor(&self) -> i64 {
        let items: i64 = self
            .line_items
            .iter()
            .map(|li| li.unit_amount_minor * i64::from(li.quantity))
            .sum();
        items + self.shipping_minor + self.tax_minor
    }

    pub fn item_total_minor(&self) -> i64 {
        self.line_items
            .iter()
            .map(|li| li.unit_amount_minor * i64::from(li.quantity))
            .sum()
    }
}

/// Remote session handle returned by a provider.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub correlation_id: String,
    pub redirect_url: String,
}

/// Result of capturing funds on a provider order.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub correlation_id: String,
    pub amount_minor: i64,
    pub provider_status: String,
}

/// Session state as reported by the provider.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub correlation_id: String,
    /// Populated once the provider has attached a payment to the session.
    pub payment_intent_id: Option<String>,
    pub amount_total_minor: i64,
    pub payment_status: String,
}

/// Formats integer minor units as the decimal string providers expect
/// ("4599" -> "45.99").
pub fn format_minor_units(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parses a provider-reported decimal amount string into minor units.
pub fn parse_wire_amount(value: &str) -> Result<i64, ServiceError> {
    let amount: Decimal = value
        .trim()
        .parse()
        .map_err(|_| ServiceError::ProviderError(format!("unparseable amount: {value:?}")))?;
    let minor = amount * Decimal::from(100);
    if minor.fract() != Decimal::ZERO {
        return Err(ServiceError::ProviderError(format!(
            "amount has sub-minor-unit precision: {value:?}"
        )));
    }
    minor
        .trunc()
        .to_i64()
        .ok_or_else(|| ServiceError::ProviderError(format!("amount out of range: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_unit_formatting() {
        assert_eq!(format_minor_units(4599), "45.99");
        assert_eq!(format_minor_units(500), "5.00");
        assert_eq!(format_minor_units(7), "0.07");
        assert_eq!(format_minor_units(0), "0.00");
    }

    #[test]
    fn wire_amount_round_trips() {
        assert_eq!(parse_wire_amount("45.99").unwrap(), 4599);
        assert_eq!(parse_wire_amount("5").unwrap(), 500);
        assert_eq!(parse_wire_amount("0.07").unwrap(), 7);
    }

    #[test]
    fn wire_amount_rejects_garbage() {
        assert!(parse_wire_amount("forty").is_err());
        assert!(parse_wire_amount("1.999").is_err());
    }

    #[test]
    fn session_totals_sum_items_shipping_and_tax() {
        let req = CreateSessionRequest {
            line_items: vec![
                SessionLineItem {
                    name: "Walnut desk".into(),
                    unit_amount_minor: 2000,
                    quantity: 2,
                },
                SessionLineItem {
                    name: "Oak shelf".into(),
                    unit_amount_minor: 1500,
                    quantity: 1,
                },
            ],
            shipping_minor: 599,
            tax_minor: 0,
            currency: "usd".into(),
            reference: "ORD-TEST".into(),
            customer_email: None,
            success_url: "http://localhost/s".into(),
            cancel_url: "http://localhost/c".into(),
            locale: None,
        };
        assert_eq!(req.item_total_minor(), 5500);
        assert_eq!(req.amount_total_minor(), 6099);
    }
}
