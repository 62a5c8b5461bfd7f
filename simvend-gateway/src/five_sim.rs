use async_trait::async_trait;
use serde::Deserialize;
use simvend_core::{ProvisionedNumber, ProvisioningClient, ProvisioningError, Selector};

use crate::HttpSettings;

/// Activation as returned by `/user/buy/activation` and `/user/check`.
#[derive(Debug, Deserialize)]
struct Activation {
    id: i64,
    phone: String,
    status: String,
    #[serde(default)]
    sms: Option<serde_json::Value>,
}

impl From<Activation> for ProvisionedNumber {
    fn from(a: Activation) -> Self {
        ProvisionedNumber {
            provider_order_id: a.id,
            phone_number: a.phone,
            status: a.status,
            sms: a.sms.filter(|v| !v.is_null()),
        }
    }
}

/// Map a non-JSON or non-2xx provider reply to a failure kind.
///
/// 5sim reports most business errors as a plain-text body, sometimes with
/// HTTP 200, so the body text is checked before the status code.
pub fn classify_failure(status: u16, body: &str) -> ProvisioningError {
    let text = body.trim();
    let message = if text.is_empty() {
        format!("HTTP {}", status)
    } else {
        text.to_string()
    };
    let lowered = text.to_lowercase();

    if lowered.contains("no free phones") {
        ProvisioningError::OutOfStock(message)
    } else if lowered.contains("not enough user balance")
        || lowered.contains("not enough rating")
        || status == 429
    {
        ProvisioningError::QuotaExceeded(message)
    } else if status >= 500 {
        ProvisioningError::Transient(message)
    } else {
        ProvisioningError::Unknown(message)
    }
}

fn transport_failure(e: reqwest::Error) -> ProvisioningError {
    // Connect errors and timeouts never reached the provider's order book
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ProvisioningError::Transient(e.to_string())
    } else {
        ProvisioningError::Unknown(e.to_string())
    }
}

/// 5sim activation API client
pub struct FiveSimClient {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl FiveSimClient {
    pub fn new(settings: HttpSettings) -> Result<Self, ProvisioningError> {
        let client = settings
            .client()
            .map_err(|e| {
                ProvisioningError::Unknown(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client, settings })
    }

    async fn get_activation(&self, path: &str) -> Result<ProvisionedNumber, ProvisioningError> {
        let response = self
            .client
            .get(self.settings.endpoint(path))
            .bearer_auth(self.settings.api_key.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_failure)?;
        let trimmed = body.trim();

        if !(200..300).contains(&status) || !trimmed.starts_with('{') {
            let failure = classify_failure(status, trimmed);
            tracing::warn!("5sim {} failed with HTTP {}: {}", path, status, failure);
            return Err(failure);
        }

        let activation: Activation = serde_json::from_str(trimmed)
            .map_err(|e| ProvisioningError::Unknown(format!("undecodable activation: {}", e)))?;
        if activation.id == 0 {
            return Err(ProvisioningError::Unknown("order not found".to_string()));
        }
        Ok(activation.into())
    }
}

#[async_trait]
impl ProvisioningClient for FiveSimClient {
    async fn acquire(&self, selector: &Selector) -> Result<ProvisionedNumber, ProvisioningError> {
        let path = format!(
            "/user/buy/activation/{}/{}/{}",
            selector.country, selector.operator, selector.service
        );
        let number = self.get_activation(&path).await?;
        tracing::info!(
            "5sim activation {} acquired for {}/{}/{}",
            number.provider_order_id,
            selector.service,
            selector.country,
            selector.operator
        );
        Ok(number)
    }

    async fn check(&self, provider_order_id: i64) -> Result<ProvisionedNumber, ProvisioningError> {
        self.get_activation(&format!("/user/check/{}", provider_order_id))
            .await
    }
}
