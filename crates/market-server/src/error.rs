//! API error mapping
//!
//! Every failure leaves the server as `{"message": ..., "code": ...}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use market_core::{MarketError, StoreError};
use market_payments::PaymentError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Path segment is not a numeric id
    #[error("Invalid {0} ID")]
    InvalidId(&'static str),

    /// Unreadable JSON body
    #[error("Invalid request body: {0}")]
    Body(String),

    #[error("Missing Stripe signature")]
    MissingSignature,

    #[error("Webhooks are not configured")]
    WebhooksDisabled,

    #[error("Webhook error: {0}")]
    Webhook(PaymentError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Market(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Market(err) => match err {
                MarketError::Unauthorized => StatusCode::UNAUTHORIZED,
                MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
                MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
                MarketError::Conflict(_)
                | MarketError::PaymentNotComplete { .. }
                | MarketError::Validation(_) => StatusCode::BAD_REQUEST,
                MarketError::PaymentsDisabled => StatusCode::SERVICE_UNAVAILABLE,
                MarketError::Gateway(_) | MarketError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InvalidId(_) | Self::Body(_) | Self::MissingSignature => StatusCode::BAD_REQUEST,
            Self::WebhooksDisabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Webhook(PaymentError::Reconcile(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Webhook(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Market(err) => match err {
                MarketError::Unauthorized => "UNAUTHORIZED",
                MarketError::Forbidden(_) => "FORBIDDEN",
                MarketError::NotFound { .. } => "NOT_FOUND",
                MarketError::Conflict(_) => "CONFLICT",
                MarketError::PaymentNotComplete { .. } => "PAYMENT_NOT_COMPLETE",
                MarketError::Validation(_) => "VALIDATION_ERROR",
                MarketError::PaymentsDisabled => "PAYMENTS_DISABLED",
                MarketError::Gateway(_) => "GATEWAY_ERROR",
                MarketError::Store(_) => "INTERNAL_ERROR",
            },
            Self::InvalidId(_) | Self::Body(_) => "VALIDATION_ERROR",
            Self::MissingSignature => "MISSING_SIGNATURE",
            Self::WebhooksDisabled => "WEBHOOKS_DISABLED",
            Self::Webhook(PaymentError::Reconcile(_)) => "WEBHOOK_ERROR",
            Self::Webhook(_) => "INVALID_SIGNATURE",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Market(err) => err.user_message(),
            Self::Webhook(err) => err.user_message().into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "Internal API error");
        }

        let body = ErrorResponse {
            message: self.message(),
            code: self.error_code(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
