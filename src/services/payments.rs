//! Payment notification handling.
//!
//! Providers deliver notifications at least once, so every notification is
//! applied under the order row lock and checked against the payment state
//! machine first. Redeliveries and late notifications come back as a normal
//! result carrying the unchanged order; only an unknown order is an error.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
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

/// An inbound provider notification (webhook delivery or polling result).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_id: Uuid,
    pub transaction_id: String,
    pub status: PaymentStatus,
}

impl PaymentNotification {
    pub fn new(order_id: Uuid, transaction_id: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            order_id,
            transaction_id: transaction_id.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Applied,
    /// Same transaction and status as already recorded.
    Duplicate,
    /// Not a legal move from the current payment status.
    Stale,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Applied => "applied",
            Disposition::Duplicate => "duplicate",
            Disposition::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub order: OrderModel,
    pub disposition: Disposition,
}

impl ReconciliationOutcome {
    pub fn is_applied(&self) -> bool {
        self.disposition == Disposition::Applied
    }
}

fn classify(order: &OrderModel, notification: &PaymentNotification) -> Disposition {
    let current = order.payment_status;
    if current == notification.status
        && order.transaction_id.as_deref() == Some(notification.transaction_id.as_str())
    {
        return Disposition::Duplicate;
    }
    if !current.can_transition_to(notification.status) {
        return Disposition::Stale;
    }
    Disposition::Applied
}

#[derive(Clone)]
pub struct PaymentReconciliationService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentReconciliationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Applies a notification at most once.
    ///
    /// PAID commits the reserved stock and moves a PENDING order to
    /// PROCESSING. FAILED and CANCELLED always release the reservation and
    /// cancel the order while it is still cancellable. WAITING only records
    /// the provider reference.
    ///
    /// A blank `transaction_id` is refused with `ValidationError` before any
    /// lock is taken.
    #[instrument(
        skip(self, notification),
        fields(
            order_id = %notification.order_id,
            transaction_id = %notification.transaction_id,
            status = notification.status.as_str()
        )
    )]
    pub async fn reconcile(
        &self,
        notification: PaymentNotification,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        if notification.transaction_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "transaction_id must not be empty".to_string(),
            ));
        }

        let order_id = notification.order_id;
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for payment notification");
            ServiceError::db_error(e)
        })?;

        let order = OrderRepository::lock_by_id(&txn, order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        let disposition = classify(&order, &notification);
        if disposition != Disposition::Applied {
            txn.commit().await?;
            info!(
                disposition = disposition.as_str(),
                payment_status = order.payment_status.as_str(),
                "Payment notification ignored"
            );
            metrics::record_payment_notification(disposition.as_str());
            return Ok(ReconciliationOutcome { order, disposition });
        }

        let old_payment_status = order.payment_status;
        let old_status = order.status;
        let mut new_status = old_status;

        match notification.status {
            PaymentStatus::Paid => {
                let items = OrderRepository::items_for(&txn, order_id).await?;
                stock_ledger::commit_items(&txn, &items).await?;
                if old_status == OrderStatus::Pending {
                    new_status = OrderStatus::Processing;
                }
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled => {
                // The reservation is held until the payment closes, so it is
                // released even when the order can no longer be cancelled.
                let items = OrderRepository::items_for(&txn, order_id).await?;
                stock_ledger::release_items(&txn, &items).await?;
                if old_status.is_cancellable() {
                    new_status = OrderStatus::Cancelled;
                } else {
                    warn!(
                        order_status = old_status.as_str(),
                        "Payment closed on an order past cancellation; needs manual reconciliation"
                    );
                }
            }
            PaymentStatus::Waiting | PaymentStatus::Pending | PaymentStatus::Refunded => {}
        }

        let mut active: OrderActiveModel = order.into();
        active.payment_status = Set(notification.status);
        active.transaction_id = Set(Some(notification.transaction_id.clone()));
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to save payment notification");
            ServiceError::db_error(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit payment notification");
            ServiceError::db_error(e)
        })?;

        info!(
            old_payment_status = old_payment_status.as_str(),
            order_status = new_status.as_str(),
            "Payment notification applied"
        );
        metrics::record_payment_notification(Disposition::Applied.as_str());
        if new_status != old_status {
            metrics::record_status_change(new_status.as_str());
            if new_status == OrderStatus::Cancelled {
                metrics::record_order_cancelled();
            }
        }

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PaymentStatusChanged {
                order_id,
                transaction_id: notification.transaction_id,
                old_status: old_payment_status,
                new_status: notification.status,
            });
            if new_status != old_status {
                sender.send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                });
            }
            if new_status == OrderStatus::Cancelled && old_status != OrderStatus::Cancelled {
                sender.send_or_log(Event::OrderCancelled {
                    order_id,
                    previous_status: old_status,
                });
            }
        }

        Ok(ReconciliationOutcome {
            order: updated,
            disposition: Disposition::Applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PaymentMethod;
    use rust_decimal_macros::dec;

    fn order(payment_status: PaymentStatus, transaction_id: Option<&str>) -> OrderModel {
        OrderModel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            payment_status,
            payment_method: PaymentMethod::Qr,
            transaction_id: transaction_id.map(str::to_string),
            total_amount: dec!(10),
            shipping_address: "1 Main St".to_string(),
            note: None,
            order_date: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn same_reference_and_status_is_duplicate() {
        let order = order(PaymentStatus::Paid, Some("A"));
        let n = PaymentNotification::new(order.id, "A", PaymentStatus::Paid);
        assert_eq!(classify(&order, &n), Disposition::Duplicate);
    }

    #[test]
    fn closed_payment_makes_notifications_stale() {
        let order = order(PaymentStatus::Paid, Some("A"));
        let n = PaymentNotification::new(order.id, "B", PaymentStatus::Failed);
        assert_eq!(classify(&order, &n), Disposition::Stale);
    }

    #[test]
    fn waiting_reference_can_be_paid_with_same_reference() {
        let order = order(PaymentStatus::Waiting, Some("A"));
        let n = PaymentNotification::new(order.id, "A", PaymentStatus::Paid);
        assert_eq!(classify(&order, &n), Disposition::Applied);
    }

    #[test]
    fn repeated_waiting_is_duplicate_but_new_waiting_reference_is_stale() {
        let order = order(PaymentStatus::Waiting, Some("A"));
        let same = PaymentNotification::new(order.id, "A", PaymentStatus::Waiting);
        let other = PaymentNotification::new(order.id, "B", PaymentStatus::Waiting);
        assert_eq!(classify(&order, &same), Disposition::Duplicate);
        assert_eq!(classify(&order, &other), Disposition::Stale);
    }

    #[test]
    fn refund_is_never_driven_by_notification() {
        let order = order(PaymentStatus::Pending, None);
        let n = PaymentNotification::new(order.id, "A", PaymentStatus::Refunded);
        assert_eq!(classify(&order, &n), Disposition::Stale);
    }
}
