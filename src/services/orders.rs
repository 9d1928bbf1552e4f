use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::order::Model as OrderModel,
    entities::order_item::Model as OrderItemModel,
    entities::{OrderStatus, PaymentStatus},
    errors::ServiceError,
    repositories::order_repository::OrderRepository,
    services::{
        checkout::{CheckoutService, CreateOrderRequest, CreateOrderResponse},
        order_status::{CancelScope, OrderStatusService},
        payments::{PaymentNotification, PaymentReconciliationService, ReconciliationOutcome},
    },
};

const MAX_PAGE_SIZE: u64 = 100;

/// An order with its items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Entry point for controllers, webhooks and admin tooling.
#[derive(Clone)]
pub struct OrderService {
    repository: OrderRepository,
    checkout: CheckoutService,
    status: OrderStatusService,
    payments: PaymentReconciliationService,
}

impl OrderService {
    pub fn new(
        repository: OrderRepository,
        checkout: CheckoutService,
        status: OrderStatusService,
        payments: PaymentReconciliationService,
    ) -> Self {
        Self {
            repository,
            checkout,
            status,
            payments,
        }
    }

    /// Turns the user's cart into an order.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        self.checkout.create_order(request).await
    }

    /// Reads one of the user's own orders. Someone else's order is reported
    /// as not found.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self
            .repository
            .find_for_customer(user_id, order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;
        self.with_items(order).await
    }

    /// Admin read, not scoped to a user.
    #[instrument(skip(self))]
    pub async fn find_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = self
            .repository
            .find_by_id(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;
        self.with_items(order).await
    }

    /// Lists a user's orders, newest first. `page` starts at 1.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "page must be at least 1".to_string(),
            ));
        }
        if per_page == 0 || per_page > MAX_PAGE_SIZE {
            return Err(ServiceError::ValidationError(format!(
                "per_page must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let (orders, total) = self
            .repository
            .find_by_customer(user_id, page, per_page)
            .await?;

        info!(total, returned_count = orders.len(), "Orders listed");

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Self-service cancellation.
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        self.status
            .cancel_order(CancelScope::Customer(user_id), order_id)
            .await
    }

    pub async fn cancel_order_as_admin(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        self.status.cancel_order(CancelScope::Admin, order_id).await
    }

    /// Applies a provider notification. Duplicates and stale notifications
    /// return the unchanged order.
    ///
    /// # Errors
    /// `OrderNotFound` for an unknown order, and `ValidationError` when
    /// `transaction_id` is blank: such a notification cannot be told apart
    /// from a redelivery, so it is refused before the order is touched.
    /// Persistence failures surface as `DatabaseError`.
    pub async fn apply_payment_notification(
        &self,
        order_id: Uuid,
        transaction_id: &str,
        payment_status: PaymentStatus,
    ) -> Result<OrderModel, ServiceError> {
        let outcome = self
            .reconcile_payment(PaymentNotification::new(
                order_id,
                transaction_id,
                payment_status,
            ))
            .await?;
        Ok(outcome.order)
    }

    /// Same as [`Self::apply_payment_notification`] but reports whether the
    /// notification was applied.
    pub async fn reconcile_payment(
        &self,
        notification: PaymentNotification,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        self.payments.reconcile(notification).await
    }

    /// Admin status change.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        self.status.update_status(order_id, new_status).await
    }

    async fn with_items(&self, order: OrderModel) -> Result<OrderDetail, ServiceError> {
        let items = self.repository.get_order_items(order.id).await?;
        Ok(OrderDetail { order, items })
    }
}
