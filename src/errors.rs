use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error payload returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "No order recorded for this payment session",
    "request_id": "req-abc123xyz",
    "timestamp": "2026-08-07T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A provider-reported amount disagrees with the internally computed
    /// total. The order state is frozen and the event is logged as
    /// security-relevant before this error is constructed.
    #[error("Amount mismatch: {0}")]
    AmountMismatch(String),

    #[error("Payment provider error: {0}")]
    ProviderError(String),

    /// Funds were captured but the order could not be recorded. Must never
    /// be presented to the customer as a payment failure.
    #[error("Post-payment persistence failure: {0}")]
    PostPaymentPersistence(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidTransition(_) | Self::AmountMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::ConfigurationError(_)
            | Self::PostPaymentPersistence(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ProviderError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the message suitable for HTTP responses. Only validation and
    /// configuration messages are safe to show verbatim; everything else is
    /// replaced by a generic message (details stay in the server log), with
    /// a support-contact instruction wherever money may already have moved.
    pub fn response_message(&self) -> String {
        match self {
            Self::ValidationError(_) | Self::ConfigurationError(_) | Self::NotFound(_) => {
                self.to_string()
            }
            Self::AmountMismatch(_) => {
                "Payment amount could not be reconciled; the order was not updated. \
                 Please contact support."
                    .to_string()
            }
            Self::PostPaymentPersistence(_) => {
                "Your payment was received but the order could not be recorded. \
                 Please contact support with your payment reference; do not pay again."
                    .to_string()
            }
            Self::ProviderError(_) => "Payment provider is unavailable".to_string(),
            Self::AuthenticationError(_) => "Authentication failed".to_string(),
            Self::InvalidTransition(_) => self.to_string(),
            Self::DatabaseError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.response_message();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }
}
