use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Catalog keys identifying what to buy from the numbering service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selector {
    pub service: String,
    pub country: String,
    pub operator: String,
}

impl Selector {
    pub fn new(
        service: impl Into<String>,
        country: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            country: country.into(),
            operator: operator.into(),
        }
    }

    /// Keys are opaque; only emptiness is checked.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("service", &self.service),
            ("country", &self.country),
            ("operator", &self.operator),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::ValidationError(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// A number acquired from the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionedNumber {
    pub provider_order_id: i64,
    pub phone_number: String,
    pub status: String,
    /// Received messages, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms: Option<serde_json::Value>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error("no numbers available: {0}")]
    OutOfStock(String),
    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("provider temporarily unavailable: {0}")]
    Transient(String),
    #[error("provider error: {0}")]
    Unknown(String),
}

impl ProvisioningError {
    /// Only transient failures may be retried; everything else is final for the order.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Buy an activation number for the selector
    async fn acquire(&self, selector: &Selector) -> Result<ProvisionedNumber, ProvisioningError>;

    /// Fetch the live state of a previously acquired number
    async fn check(&self, provider_order_id: i64) -> Result<ProvisionedNumber, ProvisioningError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_validation() {
        assert!(Selector::new("telegram", "russia", "any").validate().is_ok());
        assert!(Selector::new("telegram", " ", "any").validate().is_err());
        assert!(Selector::new("", "russia", "any").validate().is_err());
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProvisioningError::Transient("timeout".into()).is_transient());
        assert!(!ProvisioningError::OutOfStock("no free phones".into()).is_transient());
        assert!(!ProvisioningError::QuotaExceeded("not enough user balance".into()).is_transient());
        assert!(!ProvisioningError::Unknown("bad country".into()).is_transient());
    }
}
