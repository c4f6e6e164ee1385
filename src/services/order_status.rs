use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{order, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Moves orders out of `pending`. Stock is never touched here.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Completes or cancels a pending order.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        if !new_status.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Orders can only be moved to completed or cancelled, not {}",
                new_status
            )));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let current = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!("Failed to fetch order {}: {}", order_id, e);
                ServiceError::db_error(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = current.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition from {} to {}",
                old_status, new_status
            )));
        }

        // Guarded on the old status so two racing updates cannot both win.
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!("Failed to update order {} status: {}", order_id, e);
                ServiceError::db_error(e)
            })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is no longer pending",
                order_id
            )));
        }

        let updated = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for order {}: {}", order_id, e);
            ServiceError::db_error(e)
        })?;

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, old_status, new_status
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                })
                .await;
        }

        Ok(updated)
    }
}
