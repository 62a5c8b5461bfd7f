mod common;

use common::*;
use async_trait::async_trait;
use simvend_core::ProvisioningError;
use simvend_order::{
    InMemoryOrderStore, NewOrder, Order, OrderError, OrderFilter, OrderPatch, OrderStatus,
    OrderStore, ReconciliationSweep, StoreError, StoreResult, SweepReport,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Loses its connection whenever a provisioning claim is released.
#[derive(Default)]
struct ReleaseFailingStore {
    inner: InMemoryOrderStore,
}

#[async_trait]
impl OrderStore for ReleaseFailingStore {
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
        if expected == OrderStatus::Provisioning && patch.status == OrderStatus::Paid {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.inner.compare_and_set(id, expected, patch).await
    }

    async fn list_by_customer(&self, customer_id: &str, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        self.inner.list_by_customer(customer_id, filter).await
    }

    async fn list_by_status(&self, status: OrderStatus, limit: i64) -> StoreResult<Vec<Order>> {
        self.inner.list_by_status(status, limit).await
    }
}

#[tokio::test]
async fn test_sweep_resumes_paid_orders() {
    let store = Arc::new(InMemoryOrderStore::new());
    let provisioning = Arc::new(ScriptedProvisioning::new(vec![
        Err(ProvisioningError::Transient("connection reset".to_string())),
        Err(ProvisioningError::Transient("connection reset".to_string())),
    ]));
    let machine = machine(store.clone(), Arc::new(FakeGateway::default()), provisioning.clone());

    let first = pending_order(&machine).await;
    let second = pending_order(&machine).await;
    let untouched = pending_order(&machine).await;
    machine.handle_payment_confirmed(&first.correlation_key).await.unwrap();
    machine.handle_payment_confirmed(&second.correlation_key).await.unwrap();

    let sweep = ReconciliationSweep::new(machine.clone(), 10, Duration::from_secs(300));
    let report = sweep.run_once().await.unwrap();

    assert_eq!(
        report,
        SweepReport { examined: 2, completed: 2, ..Default::default() }
    );
    assert_eq!(store.get(first.id).await.unwrap().unwrap().status, OrderStatus::Completed);
    assert_eq!(store.get(second.id).await.unwrap().unwrap().status, OrderStatus::Completed);
    assert_eq!(store.get(untouched.id).await.unwrap().unwrap().status, OrderStatus::PendingPayment);
    assert_eq!(provisioning.calls(), 4);

    // Nothing left to do
    let idle = sweep.run_once().await.unwrap();
    assert_eq!(idle, SweepReport::default());
}

#[tokio::test]
async fn test_sweep_reports_stale_provisioning_without_retrying() {
    let store = Arc::new(InMemoryOrderStore::new());
    let provisioning = Arc::new(ScriptedProvisioning::succeeding());
    let machine = machine(store.clone(), Arc::new(FakeGateway::default()), provisioning.clone());

    // Simulate a worker that died after claiming the order
    let order = pending_order(&machine).await;
    store
        .compare_and_set(order.id, OrderStatus::PendingPayment, OrderPatch::status(OrderStatus::Paid))
        .await
        .unwrap();
    store
        .compare_and_set(order.id, OrderStatus::Paid, OrderPatch::status(OrderStatus::Provisioning))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = ReconciliationSweep::new(machine, 10, Duration::ZERO)
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.stuck_provisioning, 1);
    assert_eq!(report.examined, 0);
    assert_eq!(provisioning.calls(), 0);
    assert_eq!(store.get(order.id).await.unwrap().unwrap().status, OrderStatus::Provisioning);
}

#[tokio::test]
async fn test_failed_claim_release_surfaces_as_stuck() {
    let store = Arc::new(ReleaseFailingStore::default());
    let provisioning = Arc::new(ScriptedProvisioning::new(vec![Err(ProvisioningError::Transient(
        "connection reset".to_string(),
    ))]));
    let machine = machine(store.clone(), Arc::new(FakeGateway::default()), provisioning.clone());
    let order = pending_order(&machine).await;

    let err = machine.handle_payment_confirmed(&order.correlation_key).await.unwrap_err();
    assert!(matches!(err, OrderError::Store { stage: "release_claim", .. }));
    assert_eq!(store.get(order.id).await.unwrap().unwrap().status, OrderStatus::Provisioning);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let sweep = ReconciliationSweep::new(machine.clone(), 10, Duration::ZERO);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.examined, 0);
    assert_eq!(report.stuck_provisioning, 1);
    assert_eq!(provisioning.calls(), 1);
}
