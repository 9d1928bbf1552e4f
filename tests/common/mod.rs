#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use order_engine::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{cart_item, order, product, user, OrderStatus, PaymentMethod, PaymentStatus, Rank},
    events::{Event, EventSender},
    services::checkout::{CreateOrderRequest, CreateOrderResponse},
    OrderService, ServiceFactory,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A migrated file-backed SQLite database with the engine wired on top.
///
/// The pool holds a single connection, so transactions from concurrent
/// tasks queue up instead of failing with `database is locked`.
pub struct TestEngine {
    _dir: TempDir,
    pub config: AppConfig,
    pub db: Arc<DbPool>,
    pub service: OrderService,
    events: mpsc::Receiver<Event>,
}

impl TestEngine {
    pub async fn new() -> Self {
        Self::with_factory(|factory| factory).await
    }

    /// Lets a test swap collaborators (payment gateway, rank provider, ...).
    pub async fn with_factory(customize: impl FnOnce(ServiceFactory) -> ServiceFactory) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("engine.db");

        let mut config = AppConfig::new(
            format!("sqlite://{}?mode=rwc", path.display()),
            "test".to_string(),
        );
        config.db_max_connections = 1;
        config.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (sender, events) = EventSender::channel(256);
        let factory = ServiceFactory::from_config(db.clone(), &config, Some(sender))
            .expect("factory");
        let service = customize(factory).order_service();

        Self {
            _dir: dir,
            config,
            db,
            service,
            events,
        }
    }

    pub async fn seed_user(&self, rank: Rank) -> Uuid {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            email: Set(format!("{}@example.com", id)),
            rank: Set(rank),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("insert user");
        id
    }

    pub async fn seed_product(&self, price: Decimal, stock: i32, reserved: i32) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(format!("Product {}", &id.to_string()[..8])),
            price: Set(price),
            stock_quantity: Set(stock),
            reserved_quantity: Set(reserved),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("insert product");
        id
    }

    pub async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
        self.add_to_cart_at_price(user_id, product_id, quantity, Decimal::ONE)
            .await
    }

    pub async fn add_to_cart_at_price(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        price: Decimal,
    ) {
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            price_at_addition: Set(price),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("insert cart item");
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn order(&self, id: Uuid) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("load order")
            .expect("order exists")
    }

    pub async fn cart_len(&self, user_id: Uuid) -> u64 {
        cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await
            .expect("count cart")
    }

    pub async fn order_count(&self, user_id: Uuid) -> u64 {
        order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await
            .expect("count orders")
    }

    pub fn request(user_id: Uuid, method: PaymentMethod) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id,
            shipping_address: "12 Market Street, Springfield".to_string(),
            payment_method: method,
            note: None,
        }
    }

    pub async fn checkout(&self, user_id: Uuid, method: PaymentMethod) -> CreateOrderResponse {
        self.service
            .create_order(Self::request(user_id, method))
            .await
            .expect("checkout succeeds")
    }

    /// A fresh BRONZE user with one line of `quantity` units in the cart,
    /// checked out cash-on-delivery. Returns `(user_id, order_id)`.
    pub async fn place_order(&self, product_id: Uuid, quantity: i32) -> (Uuid, Uuid) {
        let user_id = self.seed_user(Rank::Bronze).await;
        self.add_to_cart(user_id, product_id, quantity).await;
        let response = self.checkout(user_id, PaymentMethod::Cod).await;
        (user_id, response.order.order.id)
    }

    /// Puts an order into a given state without going through the engine.
    pub async fn force_state(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) {
        let mut active: order::ActiveModel = self.order(order_id).await.into();
        active.status = Set(status);
        active.payment_status = Set(payment_status);
        active.update(&*self.db).await.expect("force order state");
    }

    /// Events emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
