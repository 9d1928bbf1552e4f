use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::order::{ActiveModel as OrderActiveModel, Model as OrderModel},
    entities::order_item::{ActiveModel as OrderItemActiveModel, Model as OrderItemModel},
    entities::{OrderStatus, PaymentMethod, PaymentStatus, Rank},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        cart::CartStore,
        customers::RankProvider,
        discount::{self, DiscountCalculation},
        orders::OrderDetail,
        payment_gateway::{PaymentGateway, PaymentIntent, PaymentIntentRequest},
        payments::{PaymentNotification, PaymentReconciliationService},
        stock_ledger,
        stock_validator::{self, CartLine},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    #[validate(length(
        min = 1,
        max = 500,
        message = "Shipping address must be between 1 and 500 characters"
    ))]
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 1000, message = "Note must be at most 1000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderResponse {
    pub order: OrderDetail,
    pub discount: DiscountCalculation,
    /// Present only when an online payment intent was obtained.
    pub payment_intent: Option<PaymentIntent>,
}

fn failure_reason(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::EmptyCart(_) => "empty_cart",
        ServiceError::InsufficientStock { .. } => "insufficient_stock",
        ServiceError::ProductNotFound(_) => "product_not_found",
        ServiceError::ValidationError(_) => "validation",
        _ => "persistence",
    }
}

/// Turns a user's cart into an order in one transaction, then asks the
/// payment provider for an intent outside of it.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    cart: Arc<dyn CartStore>,
    ranks: Arc<dyn RankProvider>,
    gateway: Arc<dyn PaymentGateway>,
    payments: PaymentReconciliationService,
    event_sender: Option<Arc<EventSender>>,
    payment_intent_expire_minutes: u32,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cart: Arc<dyn CartStore>,
        ranks: Arc<dyn RankProvider>,
        gateway: Arc<dyn PaymentGateway>,
        payments: PaymentReconciliationService,
        event_sender: Option<Arc<EventSender>>,
        payment_intent_expire_minutes: u32,
    ) -> Self {
        Self {
            db,
            cart,
            ranks,
            gateway,
            payments,
            event_sender,
            payment_intent_expire_minutes,
        }
    }

    /// Creates an order from the user's cart.
    ///
    /// Fails with `EmptyCart`, `InsufficientStock`, `ProductNotFound` or
    /// `OrderCreationFailed`; on failure nothing is reserved and the cart is
    /// left as it was. A failed payment intent request never fails the order.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, payment_method = request.payment_method.as_str()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        let result = self.create_order_inner(&request).await;
        let (order, items, discount) = match result {
            Ok(created) => created,
            Err(e) => {
                let e = e.into_order_creation_failure();
                warn!(error = %e, "Order creation failed");
                metrics::record_order_creation_failure(failure_reason(&e));
                return Err(e);
            }
        };

        info!(order_id = %order.id, total_amount = %order.total_amount, "Order created successfully");
        metrics::record_order_created();
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id: order.user_id,
                total_amount: order.total_amount,
                created_at: order.order_date,
            });
        }

        let (order, payment_intent) = if order.payment_method.requires_payment_intent() {
            self.request_payment_intent(order).await
        } else {
            (order, None)
        };

        Ok(CreateOrderResponse {
            order: OrderDetail { order, items },
            discount,
            payment_intent,
        })
    }

    async fn create_order_inner(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<(OrderModel, Vec<OrderItemModel>, DiscountCalculation), ServiceError> {
        request.validate()?;
        let shipping_address = request.shipping_address.trim();
        if shipping_address.is_empty() {
            return Err(ServiceError::ValidationError(
                "Shipping address must not be blank".to_string(),
            ));
        }
        let note = request
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        // Looked up before the transaction opens so it never waits on a
        // connection the transaction is holding.
        let rank: Rank = self.ranks.get_rank(request.user_id).await?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::db_error(e)
        })?;

        let entries = self.cart.find_cart(&txn, request.user_id).await?;
        if entries.is_empty() {
            return Err(ServiceError::EmptyCart(request.user_id));
        }
        let lines: Vec<CartLine> = entries.iter().map(CartLine::from).collect();

        let validated = stock_validator::validate(&txn, &lines).await?;
        let discount = discount::calculate(rank, validated.original_amount);

        let order_id = Uuid::new_v4();
        let order = OrderActiveModel {
            id: Set(order_id),
            user_id: Set(request.user_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(request.payment_method),
            transaction_id: Set(None),
            total_amount: Set(discount.final_amount),
            shipping_address: Set(shipping_address.to_string()),
            note: Set(note),
            order_date: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::db_error(e)
        })?;

        let mut items = Vec::with_capacity(validated.lines.len());
        for line in &validated.lines {
            let item = OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price_at_purchase: Set(line.unit_price),
            }
            .insert(&txn)
            .await?;
            items.push(item);

            // Guarded update: re-checks availability against the live row.
            stock_ledger::reserve(&txn, line.product_id, line.quantity).await?;
        }

        self.cart.clear(&txn, request.user_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::db_error(e)
        })?;

        Ok((order, items, discount))
    }

    /// Best effort. The order is already committed; any failure here is
    /// logged and the order is returned without an intent.
    async fn request_payment_intent(
        &self,
        order: OrderModel,
    ) -> (OrderModel, Option<PaymentIntent>) {
        let request = PaymentIntentRequest {
            order_id: order.id,
            amount: order.total_amount,
            method: order.payment_method,
            expire_minutes: self.payment_intent_expire_minutes,
        };

        let intent = match self.gateway.request_payment_intent(&request).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Payment intent request failed");
                metrics::record_payment_intent_failure();
                return (order, None);
            }
        };

        let notification =
            PaymentNotification::new(order.id, intent.reference.clone(), PaymentStatus::Waiting);
        match self.payments.reconcile(notification).await {
            Ok(outcome) => (outcome.order, Some(intent)),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Failed to record payment intent on order");
                (order, Some(intent))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(address: &str, note: Option<&str>) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: Uuid::new_v4(),
            shipping_address: address.to_string(),
            payment_method: PaymentMethod::Cod,
            note: note.map(str::to_string),
        }
    }

    #[test]
    fn request_validation_bounds() {
        assert!(request("1 Main St", None).validate().is_ok());
        assert!(request("", None).validate().is_err());
        assert!(request(&"a".repeat(501), None).validate().is_err());
        assert!(request("1 Main St", Some(&"n".repeat(1001))).validate().is_err());
        assert!(request("1 Main St", Some("leave at door")).validate().is_ok());
    }

    #[test]
    fn failure_reasons_are_stable_labels() {
        assert_eq!(failure_reason(&ServiceError::EmptyCart(Uuid::nil())), "empty_cart");
        assert_eq!(
            failure_reason(&ServiceError::OrderCreationFailed("x".into())),
            "persistence"
        );
    }
}
