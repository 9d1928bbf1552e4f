use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    repositories::order_repository::OrderRepository,
    services::{
        cart::{CartStore, DbCartStore},
        checkout::CheckoutService,
        customers::{DbRankProvider, RankProvider},
        order_status::OrderStatusService,
        orders::OrderService,
        payment_gateway::{DisabledPaymentGateway, HttpPaymentGateway, PaymentGateway},
        payments::PaymentReconciliationService,
    },
};

const DEFAULT_PAYMENT_INTENT_EXPIRE_MINUTES: u32 = 15;

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    cart: Arc<dyn CartStore>,
    ranks: Arc<dyn RankProvider>,
    gateway: Arc<dyn PaymentGateway>,
    payment_intent_expire_minutes: u32,
}

impl ServiceFactory {
    /// Database-backed collaborators and no payment provider.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self {
            cart: Arc::new(DbCartStore),
            ranks: Arc::new(DbRankProvider::new(db_pool.clone())),
            gateway: Arc::new(DisabledPaymentGateway),
            db_pool,
            event_sender: event_sender.map(Arc::new),
            payment_intent_expire_minutes: DEFAULT_PAYMENT_INTENT_EXPIRE_MINUTES,
        }
    }

    /// Like [`Self::new`], with the payment provider and intent expiry taken
    /// from configuration.
    pub fn from_config(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Option<EventSender>,
    ) -> Result<Self, ServiceError> {
        let mut factory = Self::new(db_pool, event_sender);
        factory.payment_intent_expire_minutes = config.payment_intent_expire_minutes;

        if let Some(url) = config.payment_gateway_url.as_deref() {
            info!(payment_gateway_url = %url, "Using HTTP payment gateway");
            let gateway = HttpPaymentGateway::new(
                url,
                Duration::from_secs(config.payment_gateway_timeout_secs),
            )?;
            factory.gateway = Arc::new(gateway);
        } else {
            info!("No payment gateway configured; online payment intents are disabled");
        }

        Ok(factory)
    }

    pub fn with_payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_cart_store(mut self, cart: Arc<dyn CartStore>) -> Self {
        self.cart = cart;
        self
    }

    pub fn with_rank_provider(mut self, ranks: Arc<dyn RankProvider>) -> Self {
        self.ranks = ranks;
        self
    }

    pub fn with_payment_intent_expiry(mut self, minutes: u32) -> Self {
        self.payment_intent_expire_minutes = minutes;
        self
    }

    pub fn order_repository(&self) -> OrderRepository {
        OrderRepository::new(self.db_pool.clone())
    }

    /// Creates an order status service instance
    pub fn order_status_service(&self) -> OrderStatusService {
        OrderStatusService::new(self.db_pool.clone(), self.event_sender.clone())
    }

    pub fn payment_reconciliation_service(&self) -> PaymentReconciliationService {
        PaymentReconciliationService::new(self.db_pool.clone(), self.event_sender.clone())
    }

    pub fn checkout_service(&self) -> CheckoutService {
        CheckoutService::new(
            self.db_pool.clone(),
            self.cart.clone(),
            self.ranks.clone(),
            self.gateway.clone(),
            self.payment_reconciliation_service(),
            self.event_sender.clone(),
            self.payment_intent_expire_minutes,
        )
    }

    /// Creates an order service instance
    pub fn order_service(&self) -> OrderService {
        OrderService::new(
            self.order_repository(),
            self.checkout_service(),
            self.order_status_service(),
            self.payment_reconciliation_service(),
        )
    }
}
