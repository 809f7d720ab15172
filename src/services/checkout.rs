//! Checkout session orchestration.
//!
//! Computes authoritative totals from cart contents, builds the
//! provider-specific session request, and hands the customer off to the
//! provider's hosted page. The card flow persists the pending order here;
//! the wallet flow persists nothing until capture.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::providers::paypal::PayPalGateway;
use crate::providers::stripe::StripeGateway;
use crate::providers::{CreateSessionRequest, CreatedSession, SessionLineItem};
use crate::services::orders::{generate_order_number, NewOrder, OrderService, ShippingContact};
use crate::services::pricing::{to_minor_units, CartLine, OrderTotals, PricingPolicy};

/// Redirect targets for provider-hosted pages.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    policy: PricingPolicy,
    urls: CheckoutUrls,
    stripe: Option<Arc<StripeGateway>>,
    paypal: Option<Arc<PayPalGateway>>,
    orders: OrderService,
    events: EventSender,
}

impl CheckoutService {
    pub fn new(
        policy: PricingPolicy,
        urls: CheckoutUrls,
        stripe: Option<Arc<StripeGateway>>,
        paypal: Option<Arc<PayPalGateway>>,
        orders: OrderService,
        events: EventSender,
    ) -> Self {
        Self {
            policy,
            urls,
            stripe,
            paypal,
            orders,
            events,
        }
    }

    /// Creates a card-processor checkout session and the pending order it
    /// will settle against.
    ///
    /// The order row carries the session id as correlation id; a webhook
    /// arriving before the row commits sees 404 and is redelivered.
    #[instrument(skip(self, lines, contact), fields(line_count = lines.len()))]
    pub async fn create_card_session(
        &self,
        lines: Vec<CartLine>,
        contact: ShippingContact,
        locale: Option<String>,
    ) -> Result<CreatedSession, ServiceError> {
        let gateway = self.stripe.as_ref().ok_or_else(|| {
            ServiceError::ConfigurationError(
                "card processor credentials are not configured".to_string(),
            )
        })?;

        let totals = self.policy.price(&lines)?;
        let order_number = generate_order_number();
        let request = self.session_request(
            &lines,
            &totals,
            order_number.clone(),
            Some(contact.email.clone()),
            locale,
        )?;

        let session = gateway.create_checkout_session(&request).await?;

        let order = self
            .orders
            .create_order(NewOrder {
                order_number,
                lines,
                totals,
                currency: self.policy.currency.clone(),
                contact,
                payment_method: PaymentMethod::Stripe,
                payment_status: PaymentStatus::Pending,
                status: OrderStatus::Pending,
                stripe_payment_intent_id: Some(session.correlation_id.clone()),
                paypal_order_id: None,
            })
            .await?;

        self.events
            .send(Event::CheckoutSessionCreated {
                order_id: order.id,
                order_number: order.order_number.clone(),
                provider: "stripe".to_string(),
            })
            .await;

        info!(
            order_number = %order.order_number,
            correlation_id = %session.correlation_id,
            "Card checkout session created"
        );
        Ok(session)
    }

    /// Creates a wallet-processor remote order from the same pricing policy.
    /// No ledger write happens here; the order is recorded at capture time.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn create_wallet_order(
        &self,
        lines: Vec<CartLine>,
        customer_email: Option<String>,
    ) -> Result<CreatedSession, ServiceError> {
        let gateway = self.paypal.as_ref().ok_or_else(|| {
            ServiceError::ConfigurationError(
                "wallet processor credentials are not configured".to_string(),
            )
        })?;

        let totals = self.policy.price(&lines)?;
        let request =
            self.session_request(&lines, &totals, generate_order_number(), customer_email, None)?;

        let session = gateway.create_order(&request).await?;
        info!(correlation_id = %session.correlation_id, "Wallet order created");
        Ok(session)
    }

    /// Confirmation-view lookup of the ledger by card-processor session id.
    ///
    /// Settlement replaces the stored session id with the payment intent
    /// id, so a miss falls back to retrieving the session from the
    /// provider and re-resolving by intent.
    pub async fn order_summary_by_session(
        &self,
        session_id: &str,
    ) -> Result<order::Model, ServiceError> {
        if let Some(order) = self.orders.find_by_stripe_ref(session_id).await? {
            return Ok(order);
        }

        if let Some(gateway) = &self.stripe {
            let details = gateway.retrieve_session(session_id).await?;
            if let Some(intent) = details.payment_intent_id {
                if let Some(order) = self.orders.find_by_stripe_ref(&intent).await? {
                    return Ok(order);
                }
            }
        }

        Err(ServiceError::NotFound(
            "no order recorded for this payment session".to_string(),
        ))
    }

    fn session_request(
        &self,
        lines: &[CartLine],
        totals: &OrderTotals,
        reference: String,
        customer_email: Option<String>,
        locale: Option<String>,
    ) -> Result<CreateSessionRequest, ServiceError> {
        let line_items = lines
            .iter()
            .map(|line| {
                Ok(SessionLineItem {
                    name: line.name.clone(),
                    unit_amount_minor: to_minor_units(line.unit_price)?,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(CreateSessionRequest {
            line_items,
            shipping_minor: to_minor_units(totals.shipping)?,
            tax_minor: to_minor_units(totals.tax)?,
            currency: self.policy.currency.clone(),
            reference,
            customer_email,
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            locale,
        })
    }
}
