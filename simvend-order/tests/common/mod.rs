#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use simvend_core::{
    CheckoutRequest, CheckoutSession, PaymentGateway, PaymentGatewayError, ProvisionedNumber,
    ProvisioningClient, ProvisioningError, Selector,
};
use simvend_order::{
    Buyer, FulfillmentSettings, InMemoryOrderStore, NewOrder, Order, OrderFilter, OrderPatch,
    OrderStateMachine, OrderStatus, OrderStore, StoreError, StoreResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Fake payment gateway
// ============================================================================

#[derive(Default)]
pub struct FakeGateway {
    pub failing: AtomicBool,
    pub calls: AtomicUsize,
    delay: Duration,
}

impl FakeGateway {
    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.failing.store(true, Ordering::SeqCst);
        gateway
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentGatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentGatewayError::Rejected {
                status: 401,
                body: "INVALID_API_KEY".to_string(),
            });
        }
        Ok(CheckoutSession {
            invoice_id: format!("inv_{}", n),
            checkout_url: format!("https://checkout.example/{}/{}", request.correlation_key, n),
        })
    }
}

// ============================================================================
// Scripted provisioning client
// ============================================================================

pub fn number(id: i64, phone: &str) -> ProvisionedNumber {
    ProvisionedNumber {
        provider_order_id: id,
        phone_number: phone.to_string(),
        status: "RECEIVED".to_string(),
        sms: None,
    }
}

/// Replies with the scripted results in order, then with number 42.
pub struct ScriptedProvisioning {
    script: Mutex<VecDeque<Result<ProvisionedNumber, ProvisioningError>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedProvisioning {
    pub fn new(script: Vec<Result<ProvisionedNumber, ProvisioningError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(vec![])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvisioningClient for ScriptedProvisioning {
    async fn acquire(&self, _selector: &Selector) -> Result<ProvisionedNumber, ProvisioningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(number(42, "+79990000000")))
    }

    async fn check(&self, provider_order_id: i64) -> Result<ProvisionedNumber, ProvisioningError> {
        Ok(ProvisionedNumber {
            sms: Some(serde_json::json!([{ "code": "12345" }])),
            ..number(provider_order_id, "+79990000000")
        })
    }
}

// ============================================================================
// Store wrappers
// ============================================================================

/// Records every successful guarded update as (from, to).
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryOrderStore,
    pub transitions: Mutex<Vec<(OrderStatus, OrderStatus)>>,
}

impl RecordingStore {
    pub fn transitions(&self) -> Vec<(OrderStatus, OrderStatus)> {
        self.transitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderStore for RecordingStore {
    async fn create(&self, order: NewOrder) -> StoreResult<Order> {
        self.inner.create(order).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        self.inner.get(id).await
    }

    async fn get_by_correlation_key(&self, correlation_key: &str) -> StoreResult<Option<Order>> {
        self.inner.get_by_correlation_key(correlation_key).await
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> StoreResult<Option<Order>> {
        let to = patch.status;
        let result = self.inner.compare_and_set(id, expected, patch).await?;
        if result.is_some() {
            self.transitions.lock().unwrap().push((expected, to));
        }
        Ok(result)
    }

    async fn list_by_customer(&self, customer_id: &str, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        self.inner.list_by_customer(customer_id, filter).await
    }

    async fn list_by_status(&self, status: OrderStatus, limit: i64) -> StoreResult<Vec<Order>> {
        self.inner.list_by_status(status, limit).await
    }
}

/// A store whose backend is down.
pub struct UnavailableStore;

fn down() -> StoreError {
    StoreError::Backend("connection refused".into())
}

#[async_trait]
impl OrderStore for UnavailableStore {
    async fn create(&self, _order: NewOrder) -> StoreResult<Order> {
        Err(down())
    }

    async fn get(&self, _id: Uuid) -> StoreResult<Option<Order>> {
        Err(down())
    }

    async fn get_by_correlation_key(&self, _correlation_key: &str) -> StoreResult<Option<Order>> {
        Err(down())
    }

    async fn compare_and_set(
        &self,
        _id: Uuid,
        _expected: OrderStatus,
        _patch: OrderPatch,
    ) -> StoreResult<Option<Order>> {
        Err(down())
    }

    async fn list_by_customer(&self, _customer_id: &str, _filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        Err(down())
    }

    async fn list_by_status(&self, _status: OrderStatus, _limit: i64) -> StoreResult<Vec<Order>> {
        Err(down())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn buyer() -> Buyer {
    Buyer {
        customer_id: "user-7".to_string(),
        email: "buyer@example.com".to_string(),
    }
}

pub fn telegram() -> Selector {
    Selector::new("telegram", "russia", "any")
}

pub fn price() -> Decimal {
    dec!(15000)
}

pub fn machine(
    store: Arc<dyn OrderStore>,
    gateway: Arc<FakeGateway>,
    provisioning: Arc<ScriptedProvisioning>,
) -> Arc<OrderStateMachine> {
    machine_with(store, gateway, provisioning, FulfillmentSettings::default())
}

pub fn machine_with(
    store: Arc<dyn OrderStore>,
    gateway: Arc<FakeGateway>,
    provisioning: Arc<ScriptedProvisioning>,
    settings: FulfillmentSettings,
) -> Arc<OrderStateMachine> {
    Arc::new(OrderStateMachine::new(store, gateway, provisioning, settings))
}

/// Create an order with an open checkout and return it.
pub async fn pending_order(machine: &OrderStateMachine) -> Order {
    machine
        .create_and_request_payment(buyer(), telegram(), price())
        .await
        .expect("order creation")
        .order
}
