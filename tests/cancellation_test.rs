mod common;

use assert_matches::assert_matches;
use common::TestEngine;
use order_engine::{
    entities::{OrderStatus, PaymentStatus, Rank},
    events::Event,
    services::payments::{Disposition, PaymentNotification},
    ServiceError,
};
use rust_decimal_macros::dec;

#[tokio::test]
async fn user_cancel_restores_reservation_and_cannot_repeat() {
    let mut engine = TestEngine::new().await;
    let product_id = engine.seed_product(dec!(100), 5, 0).await;
    let (user_id, order_id) = engine.place_order(product_id, 3).await;
    assert_eq!(engine.product(product_id).await.reserved_quantity, 3);
    engine.drain_events();

    let order = engine.service.cancel_order(user_id, order_id).await.unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Cancelled);
    let product = engine.product(product_id).await;
    assert_eq!(product.reserved_quantity, 0);
    assert_eq!(product.stock_quantity, 5);

    assert_matches!(
        engine.drain_events().as_slice(),
        [Event::OrderCancelled { previous_status: OrderStatus::Pending, .. }]
    );

    let err = engine
        .service
        .cancel_order(user_id, order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatusTransition { ref from, .. } if from == "CANCELLED");
    assert!(err.to_string().contains("order is CANCELLED"));
    assert_eq!(engine.product(product_id).await.reserved_quantity, 0);
}

#[tokio::test]
async fn another_users_order_is_not_found() {
    let engine = TestEngine::new().await;
    let product_id = engine.seed_product(dec!(10), 5, 0).await;
    let (_, order_id) = engine.place_order(product_id, 2).await;
    let stranger = engine.seed_user(Rank::Diamond).await;

    let err = engine
        .service
        .cancel_order(stranger, order_id)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::OrderNotFound(id) if id == order_id);
    assert_eq!(engine.order(order_id).await.status, OrderStatus::Pending);
    assert_eq!(engine.product(product_id).await.reserved_quantity, 2);
}

#[tokio::test]
async fn shipped_order_cannot_be_cancelled() {
    let engine = TestEngine::new().await;
    let product_id = engine.seed_product(dec!(10), 5, 0).await;
    let (user_id, order_id) = engine.place_order(product_id, 2).await;
    engine
        .service
        .update_order_status(order_id, OrderStatus::Shipped)
        .await
        .unwrap();

    let err = engine
        .service
        .cancel_order(user_id, order_id)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidStatusTransition { ref from, ref to } if from == "SHIPPED" && to == "CANCELLED");
    assert_eq!(engine.product(product_id).await.reserved_quantity, 2);
}

#[tokio::test]
async fn cancelling_a_paid_order_restocks_and_refunds() {
    let engine = TestEngine::new().await;
    let product_id = engine.seed_product(dec!(10), 5, 0).await;
    let (user_id, order_id) = engine.place_order(product_id, 2).await;
    engine
        .service
        .apply_payment_notification(order_id, "P-1", PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(engine.product(product_id).await.stock_quantity, 3);

    let order = engine.service.cancel_order(user_id, order_id).await.unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    let product = engine.product(product_id).await;
    assert_eq!(product.stock_quantity, 5);
    assert_eq!(product.reserved_quantity, 0);
}

#[tokio::test]
async fn late_payment_after_cancellation_is_stale() {
    let engine = TestEngine::new().await;
    let product_id = engine.seed_product(dec!(10), 5, 0).await;
    let (user_id, order_id) = engine.place_order(product_id, 2).await;
    engine.service.cancel_order(user_id, order_id).await.unwrap();

    let outcome = engine
        .service
        .reconcile_payment(PaymentNotification::new(order_id, "LATE", PaymentStatus::Paid))
        .await
        .unwrap();

    assert_eq!(outcome.disposition, Disposition::Stale);
    assert_eq!(outcome.order.status, OrderStatus::Cancelled);
    let product = engine.product(product_id).await;
    assert_eq!(product.stock_quantity, 5);
    assert_eq!(product.reserved_quantity, 0);
}

#[tokio::test]
async fn admin_cancel_goes_through_the_same_path() {
    let engine = TestEngine::new().await;
    let product_id = engine.seed_product(dec!(10), 5, 0).await;
    let (_, order_id) = engine.place_order(product_id, 4).await;
    engine
        .service
        .update_order_status(order_id, OrderStatus::Processing)
        .await
        .unwrap();

    let order = engine
        .service
        .update_order_status(order_id, OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Cancelled);
    assert_eq!(engine.product(product_id).await.reserved_quantity, 0);

    let err = engine
        .service
        .cancel_order_as_admin(order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatusTransition { .. });
}

#[tokio::test]
async fn cancelling_after_failed_payment_has_nothing_to_release() {
    let engine = TestEngine::new().await;
    let product_id = engine.seed_product(dec!(10), 5, 0).await;
    let (_, order_id) = engine.place_order(product_id, 2).await;
    // Payment failed while an admin had already moved the order on.
    engine
        .force_state(order_id, OrderStatus::Processing, PaymentStatus::Failed)
        .await;
    let reserved_before = engine.product(product_id).await.reserved_quantity;

    let order = engine.service.cancel_order_as_admin(order_id).await.unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(
        engine.product(product_id).await.reserved_quantity,
        reserved_before
    );
}
