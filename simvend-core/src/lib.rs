pub mod payment;
pub mod provisioning;

pub use payment::{
    CheckoutRequest, CheckoutSession, GatewayPaymentStatus, PaymentGateway, PaymentGatewayError,
};
pub use provisioning::{ProvisionedNumber, ProvisioningClient, ProvisioningError, Selector};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
