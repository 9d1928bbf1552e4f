use http::StatusCode;
use sea_orm::error::DbErr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Cart for user {0} is empty")]
    EmptyCart(Uuid),

    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Invalid status transition: order is {from} and cannot move to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Order creation failed: {0}")]
    OrderCreationFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Inventory error: {0}")]
    InventoryError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Wraps a database error as a generic persistence failure.
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        ServiceError::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Persistence failures during checkout surface as `OrderCreationFailed`;
    /// everything else is already meaningful to the caller.
    pub fn into_order_creation_failure(self) -> Self {
        match self {
            ServiceError::DatabaseError(e) => ServiceError::OrderCreationFailed(e.to_string()),
            ServiceError::InternalError(msg) | ServiceError::InventoryError(msg) => {
                ServiceError::OrderCreationFailed(msg)
            }
            other => other,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::OrderNotFound(_) | Self::ProductNotFound(_) => StatusCode::NOT_FOUND,
            Self::EmptyCart(_) | Self::InvalidStatusTransition { .. } | Self::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::OrderCreationFailed(_)
            | Self::InventoryError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only persistence failures are worth retrying, and only by the caller's
    /// transport (e.g. the payment provider redelivering a webhook).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::OrderCreationFailed(_)
        )
    }

    /// Returns the error message suitable for external callers.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InventoryError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::OrderCreationFailed(_) => "Order creation failed".to_string(),
            _ => self.to_string(),
        }
    }
}
