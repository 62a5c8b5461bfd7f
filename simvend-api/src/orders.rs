use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use simvend_core::{ProvisionedNumber, Selector};
use simvend_order::{Buyer, CreatedOrder, Order, OrderError, OrderFilter, OrderStatus};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, CustomerClaims};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub service: String,
    pub country: String,
    pub operator: String,
    pub price_sell: Decimal,
}

/// Customer-facing view of an order.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub invoice_id: String,
    pub service: String,
    pub country: String,
    pub operator: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_sell: Decimal,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            invoice_id: order.correlation_key.clone(),
            service: order.selector.service.clone(),
            country: order.selector.country.clone(),
            operator: order.selector.operator.clone(),
            price_sell: order.price_sell,
            status: order.status,
            checkout_url: order.checkout_url.clone(),
            provider_order_id: order.provider_order_id,
            phone_number: order.phone_number.clone(),
            // Only provisioning failures are explained to the customer
            error_message: order
                .error_message
                .clone()
                .filter(|_| order.status == OrderStatus::FailedProvisioning),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutData {
    pub checkout_url: String,
    pub invoice_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub data: CheckoutData,
    pub order: OrderResponse,
}

impl From<CreatedOrder> for CreateOrderResponse {
    fn from(created: CreatedOrder) -> Self {
        Self {
            success: true,
            data: CheckoutData {
                checkout_url: created.checkout.checkout_url,
                invoice_id: created.order.correlation_key.clone(),
            },
            order: OrderResponse::from(&created.order),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivationResponse {
    pub order_id: Uuid,
    pub provider_order_id: i64,
    pub phone_number: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms: Option<serde_json::Value>,
}

impl ActivationResponse {
    fn new(order_id: Uuid, number: ProvisionedNumber) -> Self {
        Self {
            order_id,
            provider_order_id: number.provider_order_id,
            phone_number: number.phone_number,
            status: number.status,
            sms: number.sms,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_orders))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/checkout", post(retry_checkout))
        .route("/v1/orders/{id}/activation", get(get_activation))
        .route_layer(axum::middleware::from_fn_with_state(state, customer_auth_middleware))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let buyer = Buyer {
        customer_id: claims.sub,
        email: claims.email,
    };
    let selector = Selector::new(req.service, req.country, req.operator);

    let created = state
        .machine
        .create_and_request_payment(buyer, selector, req.price_sell)
        .await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let filter = OrderFilter {
        status,
        limit: Some(query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let orders = state.machine.list_orders(&claims.sub, &filter).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = owned_order(&state, &claims, id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /v1/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    owned_order(&state, &claims, id).await?;
    let order = state.machine.cancel_if_unpaid(id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /v1/orders/{id}/checkout
pub async fn retry_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    owned_order(&state, &claims, id).await?;
    let created = state.machine.request_payment(id).await?;
    Ok(Json(created.into()))
}

/// GET /v1/orders/{id}/activation
pub async fn get_activation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActivationResponse>, AppError> {
    owned_order(&state, &claims, id).await?;
    let number = state.machine.activation(id).await?;
    Ok(Json(ActivationResponse::new(id, number)))
}

/// Other customers' orders are reported as missing.
async fn owned_order(
    state: &AppState,
    claims: &CustomerClaims,
    id: Uuid,
) -> Result<Order, AppError> {
    let order = state.machine.get_order(id).await?;
    if order.customer_id != claims.sub {
        return Err(OrderError::NotFound(id).into());
    }
    Ok(order)
}
