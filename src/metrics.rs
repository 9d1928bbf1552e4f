//! Prometheus counters for the order engine.
//!
//! All collectors live in a crate-local [`Registry`] so embedding
//! applications can merge them into their own exporter or dump them with
//! [`gather_text`].

use crate::errors::ServiceError;
use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref ORDERS_CREATED: IntCounter = register(
        IntCounter::new("orders_created_total", "Total number of orders created")
            .expect("metric can be created")
    );
    static ref ORDER_CREATION_FAILURES: IntCounterVec = register(
        IntCounterVec::new(
            Opts::new(
                "order_creation_failures_total",
                "Total number of failed order creations"
            ),
            &["reason"]
        )
        .expect("metric can be created")
    );
    static ref ORDER_CANCELLATIONS: IntCounter = register(
        IntCounter::new(
            "order_cancellations_total",
            "Total number of order cancellations"
        )
        .expect("metric can be created")
    );
    static ref ORDER_STATUS_CHANGES: IntCounterVec = register(
        IntCounterVec::new(
            Opts::new(
                "order_status_changes_total",
                "Order status changes by target status"
            ),
            &["status"]
        )
        .expect("metric can be created")
    );
    static ref PAYMENT_NOTIFICATIONS: IntCounterVec = register(
        IntCounterVec::new(
            Opts::new(
                "payment_notifications_total",
                "Payment notifications by outcome"
            ),
            &["outcome"]
        )
        .expect("metric can be created")
    );
    static ref PAYMENT_INTENT_FAILURES: IntCounter = register(
        IntCounter::new(
            "payment_intent_failures_total",
            "Payment intent requests that failed after checkout"
        )
        .expect("metric can be created")
    );
    static ref STOCK_LEDGER_OPERATIONS: IntCounterVec = register(
        IntCounterVec::new(
            Opts::new(
                "stock_ledger_operations_total",
                "Stock ledger mutations by operation"
            ),
            &["op"]
        )
        .expect("metric can be created")
    );
}

fn register<C>(collector: C) -> C
where
    C: Collector + Clone + 'static,
{
    if let Err(e) = REGISTRY.register(Box::new(collector.clone())) {
        warn!(error = %e, "Failed to register metric");
    }
    collector
}

/// Forces registration of every collector so a scrape lists them even
/// before they are first incremented.
pub fn init() {
    lazy_static::initialize(&ORDERS_CREATED);
    lazy_static::initialize(&ORDER_CREATION_FAILURES);
    lazy_static::initialize(&ORDER_CANCELLATIONS);
    lazy_static::initialize(&ORDER_STATUS_CHANGES);
    lazy_static::initialize(&PAYMENT_NOTIFICATIONS);
    lazy_static::initialize(&PAYMENT_INTENT_FAILURES);
    lazy_static::initialize(&STOCK_LEDGER_OPERATIONS);
}

pub fn record_order_created() {
    ORDERS_CREATED.inc();
}

pub fn record_order_creation_failure(reason: &str) {
    ORDER_CREATION_FAILURES.with_label_values(&[reason]).inc();
}

pub fn record_order_cancelled() {
    ORDER_CANCELLATIONS.inc();
}

pub fn record_status_change(status: &str) {
    ORDER_STATUS_CHANGES.with_label_values(&[status]).inc();
}

pub fn record_payment_notification(outcome: &str) {
    PAYMENT_NOTIFICATIONS.with_label_values(&[outcome]).inc();
}

pub fn record_payment_intent_failure() {
    PAYMENT_INTENT_FAILURES.inc();
}

pub fn record_ledger_operation(op: &str) {
    STOCK_LEDGER_OPERATIONS.with_label_values(&[op]).inc();
}

pub fn orders_created() -> u64 {
    ORDERS_CREATED.get()
}

pub fn payment_notifications(outcome: &str) -> u64 {
    PAYMENT_NOTIFICATIONS.with_label_values(&[outcome]).get()
}

/// Renders the registry in the Prometheus text exposition format.
pub fn gather_text() -> Result<String, ServiceError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ServiceError::InternalError(format!("Metrics are not valid UTF-8: {}", e)))
}
