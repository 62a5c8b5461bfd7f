use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use simvend_core::Selector;
use simvend_order::{
    NewOrder, Order, OrderFilter, OrderPatch, OrderStatus, OrderStore, StoreError, StoreResult,
};
use sqlx::PgPool;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, correlation_key, customer_id, payer_email, service, country, operator, \
     price_sell, status, checkout_url, payment_reference, provider_order_id, phone_number, \
     error_message, created_at, updated_at";

/// Postgres-backed order store. Statuses are persisted as their enum names.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    correlation_key: String,
    customer_id: String,
    payer_email: String,
    service: String,
    country: String,
    operator: String,
    price_sell: Decimal,
    status: String,
    checkout_url: Option<String>,
    payment_reference: Option<String>,
    provider_order_id: Option<i64>,
    phone_number: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus =
            row.status
                .parse()
                .map_err(|e: simvend_order::models::UnknownStatus| StoreError::Corrupt {
                    id: row.id,
                    reason: e.to_string(),
                })?;

        Ok(Order {
            id: row.id,
            correlation_key: row.correlation_key,
            customer_id: row.customer_id,
            payer_email: row.payer_email,
            selector: Selector {
                service: row.service,
                country: row.country,
                operator: row.operator,
            },
            price_sell: row.price_sell,
            status,
            checkout_url: row.checkout_url,
            payment_reference: row.payment_reference,
            provider_order_id: row.provider_order_id,
            phone_number: row.phone_number,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

fn rows_to_orders(rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: NewOrder) -> StoreResult<Order> {
        let sql = format!(
            r#"
            INSERT INTO sim_orders (id, correlation_key, customer_id, payer_email, service, country, operator, price_sell, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&order.correlation_key)
            .bind(&order.buyer.customer_id)
            .bind(&order.buyer.email)
            .bind(&order.selector.service)
            .bind(&order.selector.country)
            .bind(&order.selector.operator)
            .bind(order.price_sell)
            .bind(OrderStatus::PendingPayment.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    StoreError::DuplicateCorrelationKey(order.correlation_key.clone())
                }
                other => backend(other),
            })?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM sim_orders WHERE id = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Order::try_from)
            .transpose()
    }

    async fn get_by_correlation_key(&self, correlation_key: &str) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM sim_orders WHERE correlation_key = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(correlation_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Order::try_from)
            .transpose()
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> StoreResult<Option<Order>> {
        // Single statement: the WHERE clause is the guard. A checkout is only
        // attached to a row that has none.
        let sql = format!(
            r#"
            UPDATE sim_orders
            SET status = $3,
                checkout_url = COALESCE($4, checkout_url),
                payment_reference = COALESCE($5, payment_reference),
                provider_order_id = COALESCE($6, provider_order_id),
                phone_number = COALESCE($7, phone_number),
                error_message = COALESCE($8, error_message),
                updated_at = NOW()
            WHERE id = $1
              AND status = $2
              AND ($4::TEXT IS NULL OR checkout_url IS NULL)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(patch.status.as_str())
            .bind(patch.checkout_url)
            .bind(patch.payment_reference)
            .bind(patch.provider_order_id)
            .bind(patch.phone_number)
            .bind(patch.error_message)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_by_customer(
        &self,
        customer_id: &str,
        filter: &OrderFilter,
    ) -> StoreResult<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {} FROM sim_orders
            WHERE customer_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            ORDER_COLUMNS
        );

        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(customer_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit)
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows_to_orders(rows)
    }

    async fn list_by_status(&self, status: OrderStatus, limit: i64) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM sim_orders WHERE status = $1 ORDER BY updated_at ASC LIMIT $2",
            ORDER_COLUMNS
        );

        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(status.as_str())
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows_to_orders(rows)
    }
}
