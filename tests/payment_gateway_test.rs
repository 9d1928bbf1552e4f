mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::TestEngine;
use mockall::mock;
use order_engine::{
    entities::{OrderStatus, PaymentMethod, PaymentStatus, Rank},
    services::payment_gateway::{
        HttpPaymentGateway, PaymentGateway, PaymentIntent, PaymentIntentRequest,
    },
    ServiceError,
};
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn request_payment_intent(
            &self,
            request: &PaymentIntentRequest,
        ) -> Result<PaymentIntent, ServiceError>;
    }
}

async fn engine_with(gateway: Arc<dyn PaymentGateway>) -> TestEngine {
    TestEngine::with_factory(move |factory| factory.with_payment_gateway(gateway)).await
}

#[tokio::test]
async fn qr_checkout_gets_an_intent_and_waits_for_payment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment-intents"))
        .and(body_partial_json(json!({ "method": "QR", "expire_minutes": 15 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "reference": "PAY-1",
            "payload": { "qr": "000201010212" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), Duration::from_secs(5)).unwrap();
    let engine = engine_with(Arc::new(gateway)).await;
    let user_id = engine.seed_user(Rank::Bronze).await;
    let product_id = engine.seed_product(dec!(50), 4, 0).await;
    engine.add_to_cart(user_id, product_id, 2).await;

    let response = engine.checkout(user_id, PaymentMethod::Qr).await;

    let intent = response.payment_intent.expect("intent issued");
    assert_eq!(intent.reference, "PAY-1");
    assert_eq!(intent.payload["qr"], "000201010212");
    let order = &response.order.order;
    assert_eq!(order.payment_status, PaymentStatus::Waiting);
    assert_eq!(order.transaction_id.as_deref(), Some("PAY-1"));
    assert_eq!(order.status, OrderStatus::Pending);

    let paid = engine
        .service
        .apply_payment_notification(order.id, "PAY-1", PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Processing);
    let product = engine.product(product_id).await;
    assert_eq!(product.stock_quantity, 2);
    assert_eq!(product.reserved_quantity, 0);
}

#[tokio::test]
async fn provider_error_does_not_fail_checkout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment-intents"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), Duration::from_secs(5)).unwrap();
    let engine = engine_with(Arc::new(gateway)).await;
    let user_id = engine.seed_user(Rank::Bronze).await;
    let product_id = engine.seed_product(dec!(50), 4, 0).await;
    engine.add_to_cart(user_id, product_id, 1).await;

    let response = engine.checkout(user_id, PaymentMethod::BankTransfer).await;

    assert!(response.payment_intent.is_none());
    let stored = engine.order(response.order.order.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(engine.product(product_id).await.reserved_quantity, 1);
    assert_eq!(engine.cart_len(user_id).await, 0);
}

#[tokio::test]
async fn gateway_receives_discounted_amount_and_order_id() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_request_payment_intent()
        .times(1)
        .withf(|req| req.method == PaymentMethod::Qr && req.amount == dec!(90))
        .returning(|req| {
            Ok(PaymentIntent {
                reference: format!("REF-{}", req.order_id),
                payload: json!({}),
                expires_at: None,
            })
        });

    let engine = engine_with(Arc::new(gateway)).await;
    let user_id = engine.seed_user(Rank::Diamond).await;
    let product_id = engine.seed_product(dec!(100), 1, 0).await;
    engine.add_to_cart(user_id, product_id, 1).await;

    let response = engine.checkout(user_id, PaymentMethod::Qr).await;

    let order = &response.order.order;
    assert_eq!(
        order.transaction_id.as_deref(),
        Some(format!("REF-{}", order.id).as_str())
    );
}

#[tokio::test]
async fn intent_expiry_comes_from_the_factory() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_request_payment_intent()
        .times(1)
        .withf(|req| req.method == PaymentMethod::BankTransfer && req.expire_minutes == 60)
        .returning(|_| {
            Ok(PaymentIntent {
                reference: "BT-1".to_string(),
                payload: json!({ "account": "000-111" }),
                expires_at: None,
            })
        });
    let gateway: Arc<dyn PaymentGateway> = Arc::new(gateway);

    let engine = TestEngine::with_factory(move |factory| {
        factory
            .with_payment_gateway(gateway)
            .with_payment_intent_expiry(60)
    })
    .await;
    let user_id = engine.seed_user(Rank::Bronze).await;
    let product_id = engine.seed_product(dec!(10), 1, 0).await;
    engine.add_to_cart(user_id, product_id, 1).await;

    let response = engine.checkout(user_id, PaymentMethod::BankTransfer).await;

    assert_eq!(response.order.order.payment_status, PaymentStatus::Waiting);
}

#[tokio::test]
async fn cash_on_delivery_never_calls_the_gateway() {
    let mut gateway = MockGateway::new();
    gateway.expect_request_payment_intent().times(0);

    let engine = engine_with(Arc::new(gateway)).await;
    let user_id = engine.seed_user(Rank::Bronze).await;
    let product_id = engine.seed_product(dec!(10), 1, 0).await;
    engine.add_to_cart(user_id, product_id, 1).await;

    let response = engine.checkout(user_id, PaymentMethod::Cod).await;

    assert!(response.payment_intent.is_none());
    assert_eq!(response.order.order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn gateway_failure_is_swallowed() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_request_payment_intent()
        .times(1)
        .returning(|_| Err(ServiceError::ExternalServiceError("timeout".to_string())));

    let engine = engine_with(Arc::new(gateway)).await;
    let user_id = engine.seed_user(Rank::Bronze).await;
    let product_id = engine.seed_product(dec!(10), 1, 0).await;
    engine.add_to_cart(user_id, product_id, 1).await;

    let result = engine
        .service
        .create_order(TestEngine::request(user_id, PaymentMethod::Qr))
        .await;

    assert_matches!(result, Ok(ref response) if response.payment_intent.is_none());
    assert_eq!(engine.product(product_id).await.reserved_quantity, 1);
}

#[tokio::test]
async fn unconfigured_gateway_leaves_online_orders_pending() {
    let engine = TestEngine::new().await;
    let user_id = engine.seed_user(Rank::Bronze).await;
    let product_id = engine.seed_product(dec!(10), 1, 0).await;
    engine.add_to_cart(user_id, product_id, 1).await;

    let response = engine.checkout(user_id, PaymentMethod::Qr).await;

    assert!(response.payment_intent.is_none());
    assert_eq!(response.order.order.payment_status, PaymentStatus::Pending);
}
