//! Stock accounting.
//!
//! Decrements are conditioned on sufficient remaining stock in the UPDATE's
//! WHERE clause, never on a stale read, so concurrent settlements cannot
//! drive `stock_quantity` negative.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pricing::CartLine;

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Atomically decrements stock for one product.
    ///
    /// Returns `false` (zero rows affected) when remaining stock is below
    /// the requested quantity; the row is left untouched in that case.
    #[instrument(skip(self))]
    pub async fn decrement_stock(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "decrement quantity must be positive".to_string(),
            ));
        }

        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::StockQuantity.gte(quantity))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(result.rows_affected > 0)
    }

    /// Applies the decrements for a settled order.
    ///
    /// Insufficient stock is logged and reported as an event but never fails
    /// the order: funds have already cleared and the remedy is manual
    /// backorder handling, not a payment reversal.
    pub async fn apply_order_lines(&self, lines: &[CartLine]) {
        for line in lines {
            let quantity = line.quantity as i32;
            match self.decrement_stock(line.product_id, quantity).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        product_id = %line.product_id,
                        requested = quantity,
                        "Insufficient stock for settled order; keeping order for backorder handling"
                    );
                    self.events
                        .send(Event::StockDepleted {
                            product_id: line.product_id,
                            requested: quantity,
                        })
                        .await;
                }
                Err(e) => {
                    warn!(
                        product_id = %line.product_id,
                        error = %e,
                        "Stock decrement failed after settlement; continuing"
                    );
                }
            }
        }
    }

    /// Current stock level, for diagnostics and tests.
    pub async fn stock_level(&self, product_id: Uuid) -> Result<Option<i32>, ServiceError> {
        Ok(ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .map(|p| p.stock_quantity))
    }
}
