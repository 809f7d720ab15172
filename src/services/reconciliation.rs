//! Payment reconciliation.
//!
//! The only writer of order state after creation. Webhook events and
//! capture calls land here; every transition is an atomic conditional
//! UPDATE so duplicate or out-of-order deliveries cannot double-apply, and
//! every provider-reported amount is checked against the ledger total
//! before it is trusted.

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::entities::order::{
    self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::providers::paypal::PayPalGateway;
use crate::providers::stripe::PaymentEvent;
use crate::services::inventory::InventoryService;
use crate::services::orders::{generate_order_number, NewOrder, OrderService, ShippingContact};
use crate::services::pricing::{amounts_match, to_minor_units, CartLine, PricingPolicy};

#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    inventory: InventoryService,
    paypal: Option<Arc<PayPalGateway>>,
    policy: PricingPolicy,
    events: EventSender,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        inventory: InventoryService,
        paypal: Option<Arc<PayPalGateway>>,
        policy: PricingPolicy,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            orders,
            inventory,
            paypal,
            policy,
            events,
        }
    }

    /// Applies one verified card-processor event to the ledger.
    #[instrument(skip(self, event))]
    pub async fn apply_event(&self, event: PaymentEvent) -> Result<(), ServiceError> {
        match event {
            PaymentEvent::SessionCompleted {
                session_id,
                payment_intent_id,
                amount_minor,
            } => {
                self.mark_paid(&session_id, payment_intent_id, amount_minor)
                    .await
            }
            PaymentEvent::PaymentSucceeded {
                payment_intent_id,
                amount_minor,
            } => self.mark_paid(&payment_intent_id, None, amount_minor).await,
            PaymentEvent::PaymentFailed { payment_intent_id } => {
                self.mark_failed(&payment_intent_id).await
            }
            PaymentEvent::DisputeCreated { payment_intent_id } => {
                self.mark_disputed(&payment_intent_id).await
            }
            PaymentEvent::DisputeClosed {
                payment_intent_id,
                seller_won,
            } => self.resolve_dispute(&payment_intent_id, seller_won).await,
            PaymentEvent::ChargeRefunded { payment_intent_id } => {
                self.mark_refunded(&payment_intent_id).await
            }
            PaymentEvent::Ignored { event_type } => {
                info!(event_type = %event_type, "Ignoring unhandled webhook event");
                Ok(())
            }
        }
    }

    /// Transitions an order to paid, exactly once per correlation id.
    ///
    /// The UPDATE is conditioned on `payment_status = 'pending'`, so
    /// concurrent or repeated deliveries collapse to one transition; the
    /// losers observe an already-paid row and acknowledge as a no-op.
    async fn mark_paid(
        &self,
        correlation_id: &str,
        payment_intent_id: Option<String>,
        notified_minor: i64,
    ) -> Result<(), ServiceError> {
        let order = self.require_order(correlation_id).await?;

        let expected_minor = to_minor_units(order.total)?;
        if !amounts_match(expected_minor, notified_minor) {
            error!(
                order_number = %order.order_number,
                correlation_id = %correlation_id,
                expected_minor = expected_minor,
                notified_minor = notified_minor,
                "SECURITY: notified payment amount disagrees with order total; order frozen"
            );
            return Err(ServiceError::AmountMismatch(format!(
                "order {} expects {} minor units, provider reported {}",
                order.order_number, expected_minor, notified_minor
            )));
        }

        if matches!(
            order.payment_status,
            PaymentStatus::Paid | PaymentStatus::Refunded
        ) {
            info!(
                order_number = %order.order_number,
                correlation_id = %correlation_id,
                "Payment already settled; acknowledging duplicate delivery"
            );
            return Ok(());
        }

        let mut update = order::ActiveModel {
            payment_status: Set(PaymentStatus::Paid),
            status: Set(OrderStatus::Processing),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        // The completed-session event supplies the payment intent id; store
        // it so later dispute/refund events resolve to this order.
        if let Some(intent) = payment_intent_id {
            update.stripe_payment_intent_id = Set(Some(intent));
        }

        let result = OrderEntity::update_many()
            .set(update)
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            // Lost the race against a concurrent delivery; confirm the row
            // settled and acknowledge.
            let current = self.require_order_by_id(order.id).await?;
            match current.payment_status {
                PaymentStatus::Paid | PaymentStatus::Refunded => {
                    info!(
                        order_number = %current.order_number,
                        "Concurrent delivery already settled this payment"
                    );
                }
                other => {
                    warn!(
                        order_number = %current.order_number,
                        payment_status = %other.as_str(),
                        "Success notification for a non-pending payment; leaving row untouched"
                    );
                }
            }
            return Ok(());
        }

        self.events
            .send(Event::OrderPaid {
                order_id: order.id,
                correlation_id: correlation_id.to_string(),
            })
            .await;
        info!(order_number = %order.order_number, "Payment reconciled; order processing");
        Ok(())
    }

    /// Records a failed payment without touching fulfillment status.
    async fn mark_failed(&self, correlation_id: &str) -> Result<(), ServiceError> {
        let order = self.require_order(correlation_id).await?;

        let result = OrderEntity::update_many()
            .set(order::ActiveModel {
                payment_status: Set(PaymentStatus::Failed),
                updated_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected > 0 {
            self.events
                .send(Event::PaymentFailed {
                    order_id: order.id,
                    correlation_id: correlation_id.to_string(),
                })
                .await;
        }
        Ok(())
    }

    /// Freezes fulfillment while a dispute is open.
    async fn mark_disputed(&self, correlation_id: &str) -> Result<(), ServiceError> {
        let order = self.require_order(correlation_id).await?;

        let result = OrderEntity::update_many()
            .set(order::ActiveModel {
                status: Set(OrderStatus::Disputed),
                updated_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order.id))
            .filter(
                order::Column::Status
                    .is_in([OrderStatus::Processing, OrderStatus::Shipped]),
            )
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected > 0 {
            self.events.send(Event::OrderDisputed { order_id: order.id }).await;
        } else {
            warn!(
                order_number = %order.order_number,
                status = %order.status.as_str(),
                "Dispute notification for an order not in a disputable state"
            );
        }
        Ok(())
    }

    /// Applies the dispute outcome: reinstated funds resume processing, a
    /// lost dispute refunds and cancels.
    async fn resolve_dispute(
        &self,
        correlation_id: &str,
        seller_won: bool,
    ) -> Result<(), ServiceError> {
        let order = self.require_order(correlation_id).await?;

        let update = if seller_won {
            order::ActiveModel {
                status: Set(OrderStatus::Processing),
                updated_at: Set(Some(Utc::now())),
                ..Default::default()
            }
        } else {
            order::ActiveModel {
                status: Set(OrderStatus::Cancelled),
                payment_status: Set(PaymentStatus::Refunded),
                updated_at: Set(Some(Utc::now())),
                ..Default::default()
            }
        };

        let result = OrderEntity::update_many()
            .set(update)
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(OrderStatus::Disputed))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected > 0 {
            self.events
                .send(Event::DisputeResolved {
                    order_id: order.id,
                    seller_won,
                })
                .await;
        }
        Ok(())
    }

    /// Applies a refund: payment refunded, order cancelled.
    async fn mark_refunded(&self, correlation_id: &str) -> Result<(), ServiceError> {
        let order = self.require_order(correlation_id).await?;

        let result = OrderEntity::update_many()
            .set(order::ActiveModel {
                payment_status: Set(PaymentStatus::Refunded),
                status: Set(OrderStatus::Cancelled),
                updated_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Paid))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected > 0 {
            self.events.send(Event::OrderRefunded { order_id: order.id }).await;
        } else {
            info!(
                order_number = %order.order_number,
                "Refund notification for a non-paid payment; acknowledging"
            );
        }
        Ok(())
    }

    /// Captures a wallet-processor order and records it in the ledger.
    ///
    /// Provider failure leaves no trace. A captured amount that disagrees
    /// with the recomputed cart total is a reconciliation alert: the error
    /// is surfaced and no order row is written. Database failure after a
    /// successful capture is reported distinctly so the customer is sent to
    /// support instead of being told the payment failed.
    #[instrument(skip(self, lines, contact), fields(provider_order_id = %provider_order_id))]
    pub async fn capture_wallet_order(
        &self,
        provider_order_id: &str,
        lines: Vec<CartLine>,
        contact: ShippingContact,
    ) -> Result<order::Model, ServiceError> {
        if let Some(existing) = self.orders.find_by_paypal_order_id(provider_order_id).await? {
            info!(
                order_number = %existing.order_number,
                "Capture already recorded; returning existing order"
            );
            return Ok(existing);
        }

        let gateway = self.paypal.as_ref().ok_or_else(|| {
            ServiceError::ConfigurationError(
                "wallet processor credentials are not configured".to_string(),
            )
        })?;

        let capture = gateway.capture_order(provider_order_id).await?;

        let totals = self.policy.price(&lines)?;
        let expected_minor = to_minor_units(totals.total)?;
        if !amounts_match(expected_minor, capture.amount_minor) {
            error!(
                provider_order_id = %provider_order_id,
                expected_minor = expected_minor,
                captured_minor = capture.amount_minor,
                "SECURITY: captured amount disagrees with recomputed cart total; order not recorded"
            );
            return Err(ServiceError::AmountMismatch(format!(
                "cart totals {} minor units but provider captured {}",
                expected_minor, capture.amount_minor
            )));
        }

        let order = self
            .orders
            .create_order(NewOrder {
                order_number: generate_order_number(),
                lines: lines.clone(),
                totals,
                currency: self.policy.currency.clone(),
                contact,
                payment_method: PaymentMethod::Paypal,
                payment_status: PaymentStatus::Paid,
                status: OrderStatus::Processing,
                stripe_payment_intent_id: None,
                paypal_order_id: Some(provider_order_id.to_string()),
            })
            .await
            .map_err(|e| {
                error!(
                    provider_order_id = %provider_order_id,
                    error = %e,
                    "Order persistence failed after successful capture"
                );
                ServiceError::PostPaymentPersistence(format!(
                    "captured payment {provider_order_id} has no order row"
                ))
            })?;

        self.inventory.apply_order_lines(&lines).await;

        self.events
            .send(Event::OrderPaid {
                order_id: order.id,
                correlation_id: provider_order_id.to_string(),
            })
            .await;

        info!(
            order_number = %order.order_number,
            provider_status = %capture.provider_status,
            "Wallet capture reconciled"
        );
        Ok(order)
    }

    /// Loads the order for a correlation id, or signals a retryable 404:
    /// the row may not have committed yet when a webhook races session
    /// creation.
    async fn require_order(&self, correlation_id: &str) -> Result<order::Model, ServiceError> {
        self.orders
            .find_by_stripe_ref(correlation_id)
            .await?
            .ok_or_else(|| {
                warn!(
                    correlation_id = %correlation_id,
                    "No order for correlation id; provider should retry"
                );
                ServiceError::NotFound(format!(
                    "no order for payment reference {correlation_id}"
                ))
            })
    }

    async fn require_order_by_id(
        &self,
        id: uuid::Uuid,
    ) -> Result<order::Model, ServiceError> {
        OrderEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound("order vanished mid-update".to_string()))
    }
}
