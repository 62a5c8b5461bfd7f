use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use simvend_order::{IngressError, PaymentNotification};

use crate::error::AppError;
use crate::middleware::SignatureError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments/xendit", post(handle_xendit_webhook))
}

/// POST /v1/webhooks/payments/xendit
///
/// 200 for processed, ignored and unknown-order notifications; the gateway
/// only redelivers on 5xx.
pub async fn handle_xendit_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    // A body signature covers the raw bytes, so verify before parsing
    state
        .webhook_verifier
        .verify_request(&headers, &body)
        .map_err(|e| {
            tracing::warn!("Rejected payment callback: {}", e);
            let message = match e {
                SignatureError::Missing(_) => "Missing callback signature",
                _ => "Invalid callback signature",
            };
            AppError::AuthenticationError(message.to_string())
        })?;

    let notification: PaymentNotification = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(format!("Malformed payment notification: {}", e)))?;

    match state.ingress.handle(&notification).await {
        Ok(outcome) => {
            tracing::debug!(
                "Payment notification {} handled: {:?}",
                notification.provider_event_id,
                outcome.order().map(|o| o.status)
            );
            Ok(StatusCode::OK)
        }
        Err(IngressError::Invalid(msg)) => Err(AppError::ValidationError(msg)),
        Err(IngressError::Processing(e)) => Err(AppError::InternalServerError(e.to_string())),
    }
}
