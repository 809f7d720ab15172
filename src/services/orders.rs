//! Order ledger access.
//!
//! Orders and their item snapshots are written once (in a transaction) and
//! afterwards only status-transitioned by the reconciliation service; rows
//! are never deleted.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::entities::order::{
    self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::errors::ServiceError;
use crate::services::pricing::{CartLine, OrderTotals};

/// Shipping contact snapshot captured with each order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Everything needed to persist a new order with its item snapshots.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub lines: Vec<CartLine>,
    pub totals: OrderTotals,
    pub currency: String,
    pub contact: ShippingContact,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub paypal_order_id: Option<String>,
}

/// Service for reading and writing the order ledger.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts an order and its item snapshots in one transaction.
    #[instrument(skip(self, new_order), fields(payment_method = ?new_order.payment_method))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = new_order.order_number.clone();

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            subtotal: Set(new_order.totals.subtotal),
            shipping: Set(new_order.totals.shipping),
            tax: Set(new_order.totals.tax),
            total: Set(new_order.totals.total),
            currency: Set(new_order.currency),
            status: Set(new_order.status),
            payment_status: Set(new_order.payment_status),
            payment_method: Set(new_order.payment_method),
            stripe_payment_intent_id: Set(new_order.stripe_payment_intent_id),
            paypal_order_id: Set(new_order.paypal_order_id),
            shipping_name: Set(new_order.contact.name),
            shipping_email: Set(new_order.contact.email),
            shipping_phone: Set(new_order.contact.phone),
            shipping_address: Set(new_order.contact.address),
            shipping_city: Set(new_order.contact.city),
            shipping_postal_code: Set(new_order.contact.postal_code),
            shipping_country: Set(new_order.contact.country),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        for line in &new_order.lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.name.clone()),
                quantity: Set(line.quantity as i32),
                unit_price: Set(line.unit_price),
                selected_color: Set(line.selected_color.clone()),
                selected_size: Set(line.selected_size.clone()),
                selected_material: Set(line.selected_material.clone()),
                subtotal: Set(line.unit_price * rust_decimal::Decimal::from(line.quantity)),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert order item");
                ServiceError::DatabaseError(e)
            })?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, order_number = %order_number, "Order created");
        Ok(order_model)
    }

    /// Looks up an order by its card-processor correlation id (session or
    /// payment intent, whichever the column currently holds).
    pub async fn find_by_stripe_ref(
        &self,
        reference: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::StripePaymentIntentId.eq(reference))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Looks up an order by its wallet-processor order id.
    pub async fn find_by_paypal_order_id(
        &self,
        paypal_order_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::PaypalOrderId.eq(paypal_order_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn find_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

/// Generates a human-referenceable order number ("ORD-" + 8 hex chars).
pub fn generate_order_number() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", id[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_carry_the_prefix_and_length() {
        let number = generate_order_number();
        assert!(number.starts_with("ORD-"));
        assert_eq!(number.len(), 12);
        assert!(number[4..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
