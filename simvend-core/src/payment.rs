use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::CoreError;

/// Invoice statuses the payment gateway reports in its callbacks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayPaymentStatus {
    Pending,
    Paid,
    Settled,
    Expired,
    Failed,
}

impl GatewayPaymentStatus {
    /// Funds were captured (`SETTLED` is a later stage of the same success).
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid | Self::Settled)
    }

    /// The invoice can no longer be paid.
    pub fn is_definitive_failure(&self) -> bool {
        matches!(self, Self::Expired | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Settled => "SETTLED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        }
    }
}

impl FromStr for GatewayPaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "SETTLED" => Ok(Self::Settled),
            "EXPIRED" => Ok(Self::Expired),
            "FAILED" => Ok(Self::Failed),
            other => Err(CoreError::ValidationError(format!(
                "unknown payment status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Our correlation key; the gateway echoes it back as `external_id`.
    pub correlation_key: String,
    pub amount: Decimal,
    pub payer_email: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Provider's invoice id (e.g. 579c8d61f23fa4ca35e52da4)
    pub invoice_id: String,
    pub checkout_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentGatewayError {
    #[error("Payment gateway unreachable: {0}")]
    Transport(String),
    #[error("Payment gateway rejected the invoice with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Malformed payment gateway response: {0}")]
    Decode(String),
    #[error("Payment gateway call timed out")]
    Timeout,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payable invoice and return where the buyer should be redirected
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentGatewayError>;
}
