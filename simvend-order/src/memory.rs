use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{NewOrder, Order, OrderFilter, OrderPatch, OrderStatus};
use crate::repository::{OrderStore, StoreError, StoreResult};

/// A thread-safe in-memory order store.
///
/// The guarded update runs under the write lock, which makes the
/// compare-and-set atomic within this process. Used for tests and for the
/// `memory` storage backend in development.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> StoreResult<Order> {
        let mut orders = self.orders.write().await;

        if orders.values().any(|o| o.correlation_key == order.correlation_key) {
            return Err(StoreError::DuplicateCorrelationKey(order.correlation_key));
        }

        let order = Order::from_new(Uuid::new_v4(), order, Utc::now());
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn get_by_correlation_key(&self, correlation_key: &str) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| o.correlation_key == correlation_key)
            .cloned())
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> StoreResult<Option<Order>> {
        let mut orders = self.orders.write().await;

        match orders.get_mut(&id) {
            Some(order) if order.admits(expected, &patch) => {
                order.apply(&patch, Utc::now());
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_by_customer(
        &self,
        customer_id: &str,
        filter: &OrderFilter,
    ) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await;

        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_by_status(&self, status: OrderStatus, limit: i64) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await;

        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}
