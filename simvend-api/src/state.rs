use simvend_order::{OrderStateMachine, WebhookIngress};
use simvend_shared::Masked;
use std::sync::Arc;

use crate::middleware::SignatureVerifier;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<OrderStateMachine>,
    pub ingress: WebhookIngress,
    pub webhook_verifier: SignatureVerifier,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        machine: Arc<OrderStateMachine>,
        webhook_verifier: SignatureVerifier,
        jwt_secret: Masked<String>,
    ) -> Self {
        Self {
            ingress: WebhookIngress::new(machine.clone()),
            machine,
            webhook_verifier,
            auth: AuthConfig { secret: jwt_secret },
        }
    }
}
