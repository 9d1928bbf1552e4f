//! Client side of the external payment provider. Only intent creation lives
//! here; status changes come back through payment notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::PaymentMethod;
use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub expire_minutes: u32,
}

/// What the provider hands back for a QR / bank-transfer payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Provider transaction reference. Later notifications carry it.
    pub reference: String,
    /// Provider-specific data for the client (QR content, account details, ...).
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn request_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;
}

/// Posts intents as JSON to `{base_url}/payment-intents`.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build payment client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn intents_url(&self) -> String {
        format!("{}/payment-intents", self.base_url)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self), fields(order_id = %request.order_id))]
    async fn request_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let response = self
            .client
            .post(self.intents_url())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Payment provider unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Payment provider rejected intent request");
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment provider returned error status: {}",
                status
            )));
        }

        let intent = response.json::<PaymentIntent>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Invalid payment provider response: {}", e))
        })?;

        debug!(reference = %intent.reference, "Payment intent issued");
        Ok(intent)
    }
}

/// Used when no provider is configured. Every request fails, which checkout
/// treats like any other provider failure.
#[derive(Debug, Clone, Default)]
pub struct DisabledPaymentGateway;

#[async_trait]
impl PaymentGateway for DisabledPaymentGateway {
    async fn request_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        Err(ServiceError::ExternalServiceError(format!(
            "No payment provider configured for {} payments",
            request.method.as_str()
        )))
    }
}
