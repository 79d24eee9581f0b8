use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "error": "No items in cart" }))]
pub struct ErrorResponse {
    /// Human-readable error description
    #[schema(example = "No items in cart")]
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("No items in cart")]
    EmptyCart,

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing signature or webhook secret")]
    MissingSignature,

    #[error("Webhook signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

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
            Self::EmptyCart
            | Self::ProductUnavailable(_)
            | Self::ValidationError(_)
            | Self::BadRequest(_)
            | Self::MissingSignature
            | Self::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            Self::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration(_)
            | Self::DatabaseError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::EmptyCart | Self::MissingSignature => self.to_string(),
            Self::ProductUnavailable(_) => "Product unavailable".to_string(),
            Self::Configuration(_) => "Server configuration error".to_string(),
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::PaymentProvider(_) => {
                "Unable to start checkout, please try again".to_string()
            }
            Self::CatalogUnavailable(_) => {
                "Product catalog temporarily unavailable".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// True for failures the caller cannot fix by changing the request.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = crate::tracing::current_request_id();
        let request_id = request_id.as_ref().map(|id| id.as_str()).unwrap_or("-");
        if self.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), request_id, "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), request_id, "request rejected");
        }

        let body = ErrorResponse {
            error: self.response_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
