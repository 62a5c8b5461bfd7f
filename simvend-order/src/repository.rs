use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewOrder, Order, OrderFilter, OrderPatch, OrderStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Correlation key already in use: {0}")]
    DuplicateCorrelationKey(String),

    #[error("Stored order {id} is corrupt: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("Order store unavailable: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence capability for orders.
///
/// The only write path after creation is [`OrderStore::compare_and_set`]: it must
/// atomically check that the row is still in `expected` and apply the patch, so
/// that concurrent callers (possibly in different processes) cannot both move an
/// order out of the same status.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order in `PENDING_PAYMENT` and return it with its assigned id.
    async fn create(&self, order: NewOrder) -> StoreResult<Order>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn get_by_correlation_key(&self, correlation_key: &str) -> StoreResult<Option<Order>>;

    /// Guarded update. Returns the updated order, or `None` when the order is
    /// missing, its status is no longer `expected`, or the patch attaches a
    /// checkout to an order that already has one (see [`Order::admits`]).
    ///
    /// [`Order::admits`]: crate::models::Order::admits
    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> StoreResult<Option<Order>>;

    /// A customer's orders, newest first.
    async fn list_by_customer(
        &self,
        customer_id: &str,
        filter: &OrderFilter,
    ) -> StoreResult<Vec<Order>>;

    /// Oldest orders in `status` first; used by the reconciliation sweep.
    async fn list_by_status(&self, status: OrderStatus, limit: i64) -> StoreResult<Vec<Order>>;
}
