use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::{OrderStatus, PaymentStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Queues an event without waiting, logging instead of failing. Used
    /// after a transaction has already committed, so a lagging consumer
    /// never holds up the caller.
    pub fn send_or_log(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(order_id = %event.order_id(), "Event channel full; dropping domain event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(order_id = %event.order_id(), "Event channel closed; dropping domain event");
            }
        }
    }
}

/// Domain events emitted after a committed order mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
        created_at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled {
        order_id: Uuid,
        previous_status: OrderStatus,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        transaction_id: String,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
}

impl Event {
    pub fn order_id(&self) -> Uuid {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::OrderCancelled { order_id, .. }
            | Event::PaymentStatusChanged { order_id, .. } => *order_id,
        }
    }
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Default consumer: writes every event to the log.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        match event {
            Event::OrderCreated {
                order_id,
                user_id,
                total_amount,
                ..
            } => {
                info!(%order_id, %user_id, %total_amount, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    %order_id,
                    old_status = old_status.as_str(),
                    new_status = new_status.as_str(),
                    "Order status changed"
                );
            }
            Event::OrderCancelled {
                order_id,
                previous_status,
            } => {
                info!(
                    %order_id,
                    previous_status = previous_status.as_str(),
                    "Order cancelled"
                );
            }
            Event::PaymentStatusChanged {
                order_id,
                transaction_id,
                old_status,
                new_status,
            } => {
                info!(
                    %order_id,
                    %transaction_id,
                    old_status = old_status.as_str(),
                    new_status = new_status.as_str(),
                    "Payment status changed"
                );
            }
        }
        Ok(())
    }
}

/// Drains the channel with the logging handler.
pub async fn process_events(rx: mpsc::Receiver<Event>) {
    process_events_with(rx, Arc::new(LoggingEventHandler)).await
}

/// Drains the channel, handing each event to `handler` until every sender is dropped.
pub async fn process_events_with(mut rx: mpsc::Receiver<Event>, handler: Arc<dyn EventHandler>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let order_id = event.order_id();
        if let Err(e) = handler.handle_event(event).await {
            error!(%order_id, error = %e, "Failed to handle event");
        }
    }

    warn!("Event processing loop has ended");
}
