use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use simvend_core::{CheckoutRequest, CheckoutSession, PaymentGateway, PaymentGatewayError};

use crate::HttpSettings;

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    external_id: &'a str,
    amount: f64,
    payer_email: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    id: String,
    invoice_url: String,
    #[serde(default)]
    status: Option<String>,
}

/// Hosted-invoice checkout on Xendit. Authenticates with the secret key as
/// the basic-auth user and an empty password.
pub struct XenditGateway {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl XenditGateway {
    pub fn new(settings: HttpSettings) -> Result<Self, PaymentGatewayError> {
        let client = settings
            .client()
            .map_err(|e| {
                PaymentGatewayError::Transport(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client, settings })
    }
}

fn transport_error(e: reqwest::Error) -> PaymentGatewayError {
    if e.is_timeout() {
        PaymentGatewayError::Timeout
    } else {
        PaymentGatewayError::Transport(e.to_string())
    }
}

#[async_trait]
impl PaymentGateway for XenditGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentGatewayError> {
        let amount = request.amount.to_f64().ok_or_else(|| {
            PaymentGatewayError::Decode(format!("amount {} is not representable", request.amount))
        })?;
        let body = CreateInvoiceBody {
            external_id: &request.correlation_key,
            amount,
            payer_email: &request.payer_email,
            description: &request.description,
        };

        let response = self
            .client
            .post(self.settings.endpoint("/v2/invoices"))
            .basic_auth(self.settings.api_key.expose(), Some(""))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                "Xendit rejected invoice {}: HTTP {}",
                request.correlation_key,
                status.as_u16()
            );
            return Err(PaymentGatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let invoice: InvoiceResponse = response
            .json()
            .await
            .map_err(|e| PaymentGatewayError::Decode(e.to_string()))?;

        tracing::debug!(
            "Xendit invoice {} created for {} ({})",
            invoice.id,
            request.correlation_key,
            invoice.status.as_deref().unwrap_or("UNKNOWN")
        );

        Ok(CheckoutSession {
            invoice_id: invoice.id,
            checkout_url: invoice.invoice_url,
        })
    }
}
