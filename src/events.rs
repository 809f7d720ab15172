use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout and reconciliation flows. These fan out
/// to observability consumers only; every order state transition is applied
/// synchronously by the request that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionCreated {
        order_id: Uuid,
        order_number: String,
        provider: String,
    },
    OrderPaid {
        order_id: Uuid,
        correlation_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        correlation_id: String,
    },
    OrderDisputed {
        order_id: Uuid,
    },
    DisputeResolved {
        order_id: Uuid,
        seller_won: bool,
    },
    OrderRefunded {
        order_id: Uuid,
    },
    StockDepleted {
        product_id: Uuid,
        requested: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging (not failing) when the consumer is gone.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to publish event: {}", e);
        }
    }
}

/// Drains the event channel, logging each event with structured fields.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::CheckoutSessionCreated {
                order_id,
                order_number,
                provider,
            } => {
                info!(order_id = %order_id, order_number = %order_number, provider = %provider, "Checkout session created");
            }
            Event::OrderPaid {
                order_id,
                correlation_id,
            } => {
                info!(order_id = %order_id, correlation_id = %correlation_id, "Order paid");
            }
            Event::PaymentFailed {
                order_id,
                correlation_id,
            } => {
                info!(order_id = %order_id, correlation_id = %correlation_id, "Payment failed");
            }
            Event::OrderDisputed { order_id } => {
                warn!(order_id = %order_id, "Order disputed");
            }
            Event::DisputeResolved {
                order_id,
                seller_won,
            } => {
                info!(order_id = %order_id, seller_won = seller_won, "Dispute resolved");
            }
            Event::OrderRefunded { order_id } => {
                info!(order_id = %order_id, "Order refunded");
            }
            Event::StockDepleted {
                product_id,
                requested,
            } => {
                warn!(product_id = %product_id, requested = requested, "Stock depleted; order accepted for backorder handling");
            }
        }
    }
}
