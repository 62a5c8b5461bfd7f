use async_trait::async_trait;
use simvend_core::{
    CheckoutRequest, CheckoutSession, PaymentGateway, PaymentGatewayError, ProvisionedNumber,
    ProvisioningClient, ProvisioningError, Selector,
};
use std::sync::atomic::{AtomicI64, Ordering};

/// Payer emails with this local-part prefix make the mock gateway refuse.
pub const FAIL_CHECKOUT_PREFIX: &str = "fail-checkout";
/// Service key the mock provider reports as sold out.
pub const OUT_OF_STOCK_SERVICE: &str = "out-of-stock";

/// Deterministic gateway for development and tests; nothing leaves the process.
#[derive(Debug, Default)]
pub struct MockPaymentGateway;

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentGatewayError> {
        if request.payer_email.starts_with(FAIL_CHECKOUT_PREFIX) {
            return Err(PaymentGatewayError::Rejected {
                status: 400,
                body: "Simulated checkout failure".to_string(),
            });
        }
        Ok(CheckoutSession {
            invoice_id: format!("mock_inv_{}", request.correlation_key),
            checkout_url: format!("https://checkout.mock/{}", request.correlation_key),
        })
    }
}

/// Hands out sequential activation ids and made-up numbers.
#[derive(Debug)]
pub struct MockProvisioningClient {
    next_id: AtomicI64,
}

impl MockProvisioningClient {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
        }
    }
}

impl Default for MockProvisioningClient {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_number(id: i64, status: &str) -> ProvisionedNumber {
    ProvisionedNumber {
        provider_order_id: id,
        phone_number: format!("+7999{:07}", id),
        status: status.to_string(),
        sms: None,
    }
}

#[async_trait]
impl ProvisioningClient for MockProvisioningClient {
    async fn acquire(&self, selector: &Selector) -> Result<ProvisionedNumber, ProvisioningError> {
        if selector.service == OUT_OF_STOCK_SERVICE {
            return Err(ProvisioningError::OutOfStock("no free phones".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(mock_number(id, "PENDING"))
    }

    async fn check(&self, provider_order_id: i64) -> Result<ProvisionedNumber, ProvisioningError> {
        if provider_order_id <= 0 {
            return Err(ProvisioningError::Unknown("order not found".to_string()));
        }
        Ok(mock_number(provider_order_id, "RECEIVED"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(email: &str) -> CheckoutRequest {
        CheckoutRequest {
            correlation_key: "INV-ABC".to_string(),
            amount: dec!(15000),
            payer_email: email.to_string(),
            description: "telegram".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_checkout_is_deterministic() {
        let session = MockPaymentGateway
            .create_checkout(&request("buyer@example.com"))
            .await
            .unwrap();
        assert_eq!(session.invoice_id, "mock_inv_INV-ABC");
        assert_eq!(session.checkout_url, "https://checkout.mock/INV-ABC");

        let failed = MockPaymentGateway
            .create_checkout(&request("fail-checkout@example.com"))
            .await;
        assert!(matches!(failed, Err(PaymentGatewayError::Rejected { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_mock_provider_numbers() {
        let provider = MockProvisioningClient::new();
        let first = provider.acquire(&Selector::new("telegram", "russia", "any")).await.unwrap();
        let second = provider.acquire(&Selector::new("telegram", "russia", "any")).await.unwrap();
        assert_eq!(first.provider_order_id, 1000);
        assert_eq!(first.phone_number, "+79990001000");
        assert_eq!(second.provider_order_id, 1001);

        let sold_out = provider
            .acquire(&Selector::new(OUT_OF_STOCK_SERVICE, "russia", "any"))
            .await;
        assert!(matches!(sold_out, Err(ProvisioningError::OutOfStock(_))));

        assert_eq!(provider.check(1000).await.unwrap().status, "RECEIVED");
    }
}
