use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint except the webhook acknowledgement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "code": "EMPTY_CART",
    "message": "Cart is empty",
    "request_id": "req-abc123xyz",
    "timestamp": "2026-01-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Machine-readable error code
    #[schema(example = "EMPTY_CART")]
    pub code: String,
    /// Human-readable error description
    #[schema(example = "Cart is empty")]
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Order persistence failed for provider order {provider_order_id}: {reason}")]
    PersistenceFailed {
        provider_order_id: String,
        reason: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

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
            Self::DatabaseError(_)
            | Self::PersistenceFailed { .. }
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthenticated(_) | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::EmptyCart
            | Self::ValidationError(_)
            | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code surfaced in [`ErrorResponse::code`].
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::EmptyCart => "EMPTY_CART",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::PersistenceFailed { .. } => "PERSISTENCE_FAILED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::DatabaseError(_) | Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::ProviderUnavailable(_) => {
                "Payment provider is unavailable, please try again".to_string()
            }
            Self::PersistenceFailed { .. } => {
                "Failed to create order. Please try again.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
