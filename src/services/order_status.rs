use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DatabaseTransaction, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{ActiveModel as OrderActiveModel, Model as OrderModel},
    entities::{OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    repositories::order_repository::OrderRepository,
    services::stock_ledger,
};

/// Who is asking for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// Self-service: the order must belong to this user.
    Customer(Uuid),
    Admin,
}

/// Result of cancelling an order inside a transaction.
#[derive(Debug, Clone)]
pub(crate) struct Cancellation {
    pub order: OrderModel,
    pub previous_status: OrderStatus,
}

/// Cancels a locked order: checks the status, gives stock back according to
/// the payment state and saves. The caller owns the lock and the commit.
///
/// Open payments release the reservation and close as CANCELLED, so a late
/// PAID notification is discarded. Paid orders get their units restocked and
/// the payment is marked REFUNDED.
pub(crate) async fn cancel_locked(
    txn: &DatabaseTransaction,
    order: OrderModel,
) -> Result<Cancellation, ServiceError> {
    let previous_status = order.status;
    if !previous_status.is_cancellable() {
        warn!(
            order_id = %order.id,
            status = previous_status.as_str(),
            "Order cannot be cancelled"
        );
        return Err(ServiceError::invalid_transition(
            previous_status.as_str(),
            OrderStatus::Cancelled.as_str(),
        ));
    }

    let items = OrderRepository::items_for(txn, order.id).await?;
    let payment_status = match order.payment_status {
        PaymentStatus::Pending | PaymentStatus::Waiting => {
            stock_ledger::release_items(txn, &items).await?;
            Some(PaymentStatus::Cancelled)
        }
        PaymentStatus::Paid => {
            stock_ledger::restock_items(txn, &items).await?;
            Some(PaymentStatus::Refunded)
        }
        PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded => None,
    };

    let mut active: OrderActiveModel = order.into();
    active.status = Set(OrderStatus::Cancelled);
    if let Some(payment_status) = payment_status {
        active.payment_status = Set(payment_status);
    }
    active.updated_at = Set(Some(Utc::now()));
    let order = active.update(txn).await?;

    Ok(Cancellation {
        order,
        previous_status,
    })
}

/// Admin status changes and cancellations. Every mutation locks the order row first.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Moves an order to `new_status` if the transition table allows it.
    /// A move to CANCELLED runs the full cancellation.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = new_status.as_str()))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        if new_status == OrderStatus::Cancelled {
            return self.cancel_order(CancelScope::Admin, order_id).await;
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for status update");
            ServiceError::db_error(e)
        })?;

        let order = OrderRepository::lock_by_id(&txn, order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            warn!(
                old_status = old_status.as_str(),
                "Rejected status transition"
            );
            return Err(ServiceError::invalid_transition(
                old_status.as_str(),
                new_status.as_str(),
            ));
        }

        let mut active: OrderActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to update order status");
            ServiceError::db_error(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit status update transaction");
            ServiceError::db_error(e)
        })?;

        info!(
            old_status = old_status.as_str(),
            "Order status updated"
        );
        metrics::record_status_change(new_status.as_str());
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            });
        }

        Ok(updated)
    }

    /// Cancels an order and returns its stock. Fails with
    /// `InvalidStatusTransition` naming the current status unless the order
    /// is PENDING or PROCESSING.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        scope: CancelScope,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for cancellation");
            ServiceError::db_error(e)
        })?;

        let order = match scope {
            CancelScope::Customer(user_id) => {
                OrderRepository::lock_for_customer(&txn, user_id, order_id).await?
            }
            CancelScope::Admin => OrderRepository::lock_by_id(&txn, order_id).await?,
        }
        .ok_or(ServiceError::OrderNotFound(order_id))?;

        let Cancellation {
            order,
            previous_status,
        } = cancel_locked(&txn, order).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit cancellation");
            ServiceError::db_error(e)
        })?;

        info!(
            previous_status = previous_status.as_str(),
            payment_status = order.payment_status.as_str(),
            "Order cancelled"
        );
        metrics::record_order_cancelled();
        metrics::record_status_change(OrderStatus::Cancelled.as_str());
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderCancelled {
                order_id,
                previous_status,
            });
        }

        Ok(order)
    }
}
