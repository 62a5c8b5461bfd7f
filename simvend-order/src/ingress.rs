use serde::Deserialize;
use simvend_core::GatewayPaymentStatus;
use std::sync::Arc;

use crate::models::Order;
use crate::state_machine::{FailureOutcome, OrderError, OrderStateMachine, PaymentOutcome};

/// Invoice callback as delivered by the payment gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    /// The gateway's invoice id
    #[serde(rename = "id")]
    pub provider_event_id: String,
    #[serde(rename = "external_id")]
    pub correlation_key: String,
    #[serde(rename = "status")]
    pub reported_status: String,
}

/// What the ingress did with a notification. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum IngressOutcome {
    Confirmed(PaymentOutcome),
    PaymentFailed(FailureOutcome),
    /// Non-final status such as PENDING.
    Acknowledged,
    /// No order carries this correlation key.
    UnknownOrder,
}

impl IngressOutcome {
    pub fn order(&self) -> Option<&Order> {
        match self {
            IngressOutcome::Confirmed(outcome) => Some(outcome.order()),
            IngressOutcome::PaymentFailed(FailureOutcome::Failed(order))
            | IngressOutcome::PaymentFailed(FailureOutcome::Ignored(order)) => Some(order),
            IngressOutcome::Acknowledged | IngressOutcome::UnknownOrder => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("Invalid notification: {0}")]
    Invalid(String),

    /// Local failure; the sender should redeliver.
    #[error(transparent)]
    Processing(OrderError),
}

/// Turns gateway notifications into exactly one state machine call.
///
/// There is no deduplication table here: redelivered notifications are made
/// harmless by the state machine's "already advanced means no-op" rule.
#[derive(Clone)]
pub struct WebhookIngress {
    machine: Arc<OrderStateMachine>,
}

impl WebhookIngress {
    pub fn new(machine: Arc<OrderStateMachine>) -> Self {
        Self { machine }
    }

    pub async fn handle(
        &self,
        notification: &PaymentNotification,
    ) -> Result<IngressOutcome, IngressError> {
        let correlation_key = notification.correlation_key.trim();
        if correlation_key.is_empty() {
            return Err(IngressError::Invalid("external_id is empty".to_string()));
        }

        let status: GatewayPaymentStatus = notification
            .reported_status
            .parse()
            .map_err(|e: simvend_core::CoreError| IngressError::Invalid(e.to_string()))?;

        tracing::info!(
            "Payment notification {} for {} reports {}",
            notification.provider_event_id,
            correlation_key,
            status.as_str()
        );

        let result = if status.is_paid() {
            self.machine
                .handle_invoice_paid(correlation_key, Some(&notification.provider_event_id))
                .await
                .map(IngressOutcome::Confirmed)
        } else if status.is_definitive_failure() {
            self.machine
                .handle_payment_failed(correlation_key, status)
                .await
                .map(IngressOutcome::PaymentFailed)
        } else {
            return Ok(IngressOutcome::Acknowledged);
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(OrderError::UnknownCorrelationKey(key)) => {
                tracing::warn!(
                    "Payment notification {} references unknown invoice {}, acknowledging",
                    notification.provider_event_id,
                    key
                );
                Ok(IngressOutcome::UnknownOrder)
            }
            Err(e) => {
                tracing::error!(
                    "Payment notification {} for {} failed: {}",
                    notification.provider_event_id,
                    correlation_key,
                    e
                );
                Err(IngressError::Processing(e))
            }
        }
    }
}
