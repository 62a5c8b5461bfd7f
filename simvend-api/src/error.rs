use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use simvend_order::OrderError;
use uuid::Uuid;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    /// Checkout could not be opened; the order exists and can be retried.
    PaymentInitiationError { order_id: Uuid },
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentInitiationError { order_id } => {
                let body = Json(json!({
                    "error": "payment initiation failed",
                    "order_id": order_id,
                }));
                return (StatusCode::BAD_GATEWAY, body).into_response();
            }
            AppError::UpstreamError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            },
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match &err {
            OrderError::NotFound(_) | OrderError::UnknownCorrelationKey(_) => {
                AppError::NotFoundError("Order not found".to_string())
            }
            OrderError::Validation(msg) => AppError::ValidationError(msg.clone()),
            OrderError::InvalidTransition { .. } | OrderError::NotProvisioned { .. } => {
                AppError::ConflictError(err.to_string())
            }
            OrderError::PaymentInitiation { order_id, .. } => {
                // Provider text stays in the logs
                tracing::error!("{}", err);
                AppError::PaymentInitiationError { order_id: *order_id }
            }
            OrderError::ActivationLookup { source, .. } => {
                tracing::warn!("{}", err);
                AppError::UpstreamError(format!("Activation lookup failed: {}", source))
            }
            OrderError::ClaimLost { .. } | OrderError::Store { .. } => {
                AppError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
