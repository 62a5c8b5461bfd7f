use rust_decimal::Decimal;
use simvend_core::{
    CheckoutRequest, CheckoutSession, GatewayPaymentStatus, PaymentGateway, PaymentGatewayError,
    ProvisionedNumber, ProvisioningClient, ProvisioningError, Selector,
};
use simvend_shared::mask_email;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::models::{Buyer, NewOrder, Order, OrderFilter, OrderPatch, OrderStatus};
use crate::repository::{OrderStore, StoreError};

/// Timeouts for the external calls made while driving an order.
#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    pub gateway_timeout: Duration,
    pub provisioning_timeout: Duration,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(15),
            provisioning_timeout: Duration::from_secs(30),
        }
    }
}

/// An order with a checkout the buyer can be redirected to.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub order: Order,
    pub checkout: CheckoutSession,
}

/// Result of a payment confirmation or a provisioning resume.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// A number was acquired and the order is COMPLETED.
    Completed(Order),
    /// The provider refused for good; payment stays captured.
    FailedProvisioning(Order),
    /// Transient provider failure; the order is back in PAID for the sweep.
    AwaitingRetry(Order),
    /// Someone else already moved the order; nothing was done.
    AlreadyApplied(Order),
}

impl PaymentOutcome {
    pub fn order(&self) -> &Order {
        match self {
            PaymentOutcome::Completed(order)
            | PaymentOutcome::FailedProvisioning(order)
            | PaymentOutcome::AwaitingRetry(order)
            | PaymentOutcome::AlreadyApplied(order) => order,
        }
    }
}

/// Result of a definitive payment failure notification.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    Failed(Order),
    /// Late or conflicting notification; forward progress is kept.
    Ignored(Order),
}

/// Owns every status transition of an order.
///
/// All writes go through the store's guarded update, so any number of
/// instances may drive the same order concurrently: for each status exactly
/// one caller wins and the others observe [`PaymentOutcome::AlreadyApplied`].
pub struct OrderStateMachine {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    provisioning: Arc<dyn ProvisioningClient>,
    settings: FulfillmentSettings,
}

impl OrderStateMachine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        provisioning: Arc<dyn ProvisioningClient>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            provisioning,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    // ========================================================================
    // Payment initiation
    // ========================================================================

    /// Persist a new order in PENDING_PAYMENT and open a checkout for it.
    ///
    /// When the gateway fails the order row is kept without a checkout so
    /// [`Self::request_payment`] can try again.
    pub async fn create_and_request_payment(
        &self,
        buyer: Buyer,
        selector: Selector,
        price_sell: Decimal,
    ) -> Result<CreatedOrder, OrderError> {
        selector
            .validate()
            .map_err(|e| OrderError::Validation(e.to_string()))?;
        if price_sell <= Decimal::ZERO {
            return Err(OrderError::Validation("price_sell must be positive".to_string()));
        }
        if buyer.email.trim().is_empty() {
            return Err(OrderError::Validation("buyer email is required".to_string()));
        }

        let order = self
            .store
            .create(NewOrder::new(buyer, selector, price_sell))
            .await
            .at("create", "new order")?;

        tracing::info!(
            "Order {} created with invoice {} for {}/{}/{} (payer {})",
            order.id,
            order.correlation_key,
            order.selector.service,
            order.selector.country,
            order.selector.operator,
            mask_email(&order.payer_email)
        );

        self.request_checkout(order).await
    }

    /// Re-request a checkout for an unpaid order whose first attempt failed.
    pub async fn request_payment(&self, order_id: Uuid) -> Result<CreatedOrder, OrderError> {
        let order = self.load(order_id).await?;

        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::PendingPayment,
            });
        }

        if let Some(checkout) = order.checkout_session() {
            return Ok(CreatedOrder { order, checkout });
        }

        self.request_checkout(order).await
    }

    async fn request_checkout(&self, order: Order) -> Result<CreatedOrder, OrderError> {
        let request = CheckoutRequest {
            correlation_key: order.correlation_key.clone(),
            amount: order.price_sell,
            payer_email: order.payer_email.clone(),
            description: format!(
                "Payment for {} service in {} by {}",
                order.selector.service, order.selector.country, order.selector.operator
            ),
        };

        let checkout = timeout(
            self.settings.gateway_timeout,
            self.gateway.create_checkout(&request),
        )
        .await;
        let session = match checkout {
            Ok(Ok(session)) => session,
            Ok(Err(source)) => return Err(self.payment_initiation_failed(&order, source)),
            Err(_) => {
                return Err(self.payment_initiation_failed(&order, PaymentGatewayError::Timeout))
            }
        };

        let patch = OrderPatch::status(OrderStatus::PendingPayment).with_checkout(&session);
        if let Some(updated) = self
            .transition(&order, OrderStatus::PendingPayment, patch, "attach_checkout")
            .await?
        {
            tracing::info!("Checkout {} opened for order {}", session.invoice_id, updated.id);
            return Ok(CreatedOrder { order: updated, checkout: session });
        }

        // Lost the guard: either a concurrent attempt attached its checkout
        // first or the order left PENDING_PAYMENT.
        let current = self.load(order.id).await?;
        match current.checkout_session() {
            Some(existing) if current.status == OrderStatus::PendingPayment => {
                tracing::warn!(
                    "Order {} ({}) already has checkout {}; invoice {} is orphaned \
                     and must not be paid",
                    current.id,
                    current.correlation_key,
                    existing.invoice_id,
                    session.invoice_id
                );
                Ok(CreatedOrder { order: current, checkout: existing })
            }
            _ => {
                tracing::warn!(
                    "Order {} moved to {} while its checkout {} was being created",
                    current.id,
                    current.status,
                    session.invoice_id
                );
                Err(OrderError::InvalidTransition {
                    from: current.status,
                    to: OrderStatus::PendingPayment,
                })
            }
        }
    }

    fn payment_initiation_failed(&self, order: &Order, source: PaymentGatewayError) -> OrderError {
        tracing::error!(
            "Checkout creation failed for order {} ({}): {}",
            order.id,
            order.correlation_key,
            source
        );
        OrderError::PaymentInitiation {
            order_id: order.id,
            correlation_key: order.correlation_key.clone(),
            source,
        }
    }

    // ========================================================================
    // Payment notifications
    // ========================================================================

    /// Transition: PENDING_PAYMENT → PAID, then provision synchronously.
    ///
    /// Replays and lost races are successes: if the order is already past
    /// PENDING_PAYMENT nothing happens.
    pub async fn handle_payment_confirmed(
        &self,
        correlation_key: &str,
    ) -> Result<PaymentOutcome, OrderError> {
        self.handle_invoice_paid(correlation_key, None).await
    }

    /// Same as [`Self::handle_payment_confirmed`], naming the gateway invoice
    /// that was paid so a payment on a superseded invoice can be flagged.
    pub async fn handle_invoice_paid(
        &self,
        correlation_key: &str,
        invoice_id: Option<&str>,
    ) -> Result<PaymentOutcome, OrderError> {
        let order = self.load_by_key(correlation_key).await?;

        if order.status != OrderStatus::PendingPayment {
            self.report_late_confirmation(&order, invoice_id);
            return Ok(PaymentOutcome::AlreadyApplied(order));
        }

        let paid = match self
            .transition(
                &order,
                OrderStatus::PendingPayment,
                OrderPatch::status(OrderStatus::Paid),
                "mark_paid",
            )
            .await?
        {
            Some(paid) => paid,
            None => {
                let current = self.load(order.id).await?;
                self.report_late_confirmation(&current, invoice_id);
                return Ok(PaymentOutcome::AlreadyApplied(current));
            }
        };

        tracing::info!("Order {} ({}) marked as PAID", paid.id, correlation_key);
        self.provision(paid).await
    }

    /// A confirmation for an order that is already past PENDING_PAYMENT is a
    /// no-op. It still needs a human when the money cannot be matched to the
    /// order's own payment.
    fn report_late_confirmation(&self, order: &Order, invoice_id: Option<&str>) {
        let foreign_invoice = match (invoice_id, order.payment_reference.as_deref()) {
            (Some(paid), Some(own)) => paid != own,
            _ => false,
        };

        if matches!(order.status, OrderStatus::Canceled | OrderStatus::FailedPayment) {
            tracing::warn!(
                "Payment confirmed for order {} ({}) in {}; needs manual refund",
                order.id,
                order.correlation_key,
                order.status
            );
        } else if foreign_invoice {
            tracing::warn!(
                "Invoice {} paid for order {} ({}) already {} through invoice {}; \
                 needs manual refund",
                invoice_id.unwrap_or_default(),
                order.id,
                order.correlation_key,
                order.status,
                order.payment_reference.as_deref().unwrap_or_default()
            );
        } else {
            tracing::info!(
                "Order {} ({}) already {}, skipping payment confirmation",
                order.id,
                order.correlation_key,
                order.status
            );
        }
    }

    /// Transition: PENDING_PAYMENT → FAILED_PAYMENT for an expired or failed invoice.
    pub async fn handle_payment_failed(
        &self,
        correlation_key: &str,
        reported: GatewayPaymentStatus,
    ) -> Result<FailureOutcome, OrderError> {
        let order = self.load_by_key(correlation_key).await?;

        if order.status != OrderStatus::PendingPayment {
            tracing::warn!(
                "Ignoring late {} notification for order {} ({}) in {}",
                reported.as_str(),
                order.id,
                correlation_key,
                order.status
            );
            return Ok(FailureOutcome::Ignored(order));
        }

        let message = format!("payment {}", reported.as_str().to_lowercase());
        let patch = OrderPatch::status(OrderStatus::FailedPayment).with_error(message);
        match self
            .transition(&order, OrderStatus::PendingPayment, patch, "mark_payment_failed")
            .await?
        {
            Some(failed) => {
                tracing::info!(
                    "Order {} ({}) marked as FAILED_PAYMENT ({})",
                    failed.id,
                    correlation_key,
                    reported.as_str()
                );
                Ok(FailureOutcome::Failed(failed))
            }
            None => {
                let current = self.load(order.id).await?;
                tracing::warn!(
                    "Order {} ({}) moved to {} before the {} notification applied",
                    current.id,
                    correlation_key,
                    current.status,
                    reported.as_str()
                );
                Ok(FailureOutcome::Ignored(current))
            }
        }
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    /// Retry provisioning for an order left in PAID. Any other status is a no-op.
    pub async fn resume_provisioning(&self, order_id: Uuid) -> Result<PaymentOutcome, OrderError> {
        let order = self.load(order_id).await?;

        if order.status != OrderStatus::Paid {
            return Ok(PaymentOutcome::AlreadyApplied(order));
        }

        self.provision(order).await
    }

    /// Transition: PAID → PROVISIONING → COMPLETED | FAILED_PROVISIONING.
    ///
    /// The PAID → PROVISIONING guard is the claim that makes this caller the
    /// only one talking to the provider for this order.
    async fn provision(&self, order: Order) -> Result<PaymentOutcome, OrderError> {
        let claimed = match self
            .transition(
                &order,
                OrderStatus::Paid,
                OrderPatch::status(OrderStatus::Provisioning),
                "claim_provisioning",
            )
            .await?
        {
            Some(claimed) => claimed,
            None => {
                let current = self.load(order.id).await?;
                tracing::info!(
                    "Order {} is {}, another worker owns provisioning",
                    current.id,
                    current.status
                );
                return Ok(PaymentOutcome::AlreadyApplied(current));
            }
        };

        let result = match timeout(
            self.settings.provisioning_timeout,
            self.provisioning.acquire(&claimed.selector),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProvisioningError::Transient(format!(
                "no response within {:?}",
                self.settings.provisioning_timeout
            ))),
        };

        match result {
            Ok(number) => self.complete(&claimed, &number).await,
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "Transient provisioning failure for order {} ({}): {}; returning to PAID",
                    claimed.id,
                    claimed.correlation_key,
                    e
                );
                let released = self
                    .finish(&claimed, OrderPatch::status(OrderStatus::Paid), "release_claim")
                    .await
                    .inspect_err(|release_err| {
                        tracing::error!(
                            "Order {} ({}) left in PROVISIONING after a transient failure: {}; \
                             needs reconciliation",
                            claimed.id,
                            claimed.correlation_key,
                            release_err
                        );
                    })?;
                Ok(PaymentOutcome::AwaitingRetry(released))
            }
            Err(e) => {
                tracing::error!(
                    "Provisioning failed for paid order {} ({}): {}; needs reconciliation",
                    claimed.id,
                    claimed.correlation_key,
                    e
                );
                let patch =
                    OrderPatch::status(OrderStatus::FailedProvisioning).with_error(e.to_string());
                let failed = self.finish(&claimed, patch, "mark_provisioning_failed").await?;
                Ok(PaymentOutcome::FailedProvisioning(failed))
            }
        }
    }

    async fn complete(
        &self,
        claimed: &Order,
        number: &ProvisionedNumber,
    ) -> Result<PaymentOutcome, OrderError> {
        let patch = OrderPatch::status(OrderStatus::Completed).with_number(number);
        let completed = self
            .finish(claimed, patch, "mark_completed")
            .await
            .inspect_err(|_| {
                tracing::error!(
                    "Number {} (provider order {}) acquired for order {} but not recorded",
                    number.phone_number,
                    number.provider_order_id,
                    claimed.id
                );
            })?;

        tracing::info!(
            "Order {} ({}) COMPLETED with provider order {}",
            completed.id,
            completed.correlation_key,
            number.provider_order_id
        );
        Ok(PaymentOutcome::Completed(completed))
    }

    /// Leave PROVISIONING. Only the claim holder gets here, so a rejected
    /// guard means the row was changed behind our back.
    async fn finish(
        &self,
        claimed: &Order,
        patch: OrderPatch,
        stage: &'static str,
    ) -> Result<Order, OrderError> {
        self.transition(claimed, OrderStatus::Provisioning, patch, stage)
            .await?
            .ok_or(OrderError::ClaimLost {
                order_id: claimed.id,
                expected: OrderStatus::Provisioning,
                stage,
            })
    }

    /// Live activation state of a completed order's number.
    pub async fn activation(&self, order_id: Uuid) -> Result<ProvisionedNumber, OrderError> {
        let order = self.load(order_id).await?;

        let provider_order_id = match (order.status, order.provider_order_id) {
            (OrderStatus::Completed, Some(id)) => id,
            (status, _) => return Err(OrderError::NotProvisioned { order_id, status }),
        };

        let lookup = timeout(
            self.settings.provisioning_timeout,
            self.provisioning.check(provider_order_id),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ProvisioningError::Transient(
                "activation check timed out".to_string(),
            ))
        });

        lookup.map_err(|source| OrderError::ActivationLookup { order_id, source })
    }

    // ========================================================================
    // Cancellation & queries
    // ========================================================================

    /// Transition: PENDING_PAYMENT → CANCELED
    pub async fn cancel_if_unpaid(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;

        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Canceled,
            });
        }

        match self
            .transition(
                &order,
                OrderStatus::PendingPayment,
                OrderPatch::status(OrderStatus::Canceled),
                "cancel",
            )
            .await?
        {
            Some(canceled) => {
                tracing::info!("Order {} ({}) canceled", canceled.id, canceled.correlation_key);
                Ok(canceled)
            }
            None => {
                let current = self.load(order.id).await?;
                Err(OrderError::InvalidTransition {
                    from: current.status,
                    to: OrderStatus::Canceled,
                })
            }
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.load(order_id).await
    }

    pub async fn list_orders(
        &self,
        customer_id: &str,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, OrderError> {
        self.store
            .list_by_customer(customer_id, filter)
            .await
            .at("list_orders", customer_id)
    }

    /// Every status write goes through here: the edge must be in the
    /// transition table before the store's guarded update is attempted.
    async fn transition(
        &self,
        order: &Order,
        expected: OrderStatus,
        patch: OrderPatch,
        stage: &'static str,
    ) -> Result<Option<Order>, OrderError> {
        if !expected.can_transition_to(patch.status) {
            tracing::error!(
                "Refusing {} -> {} for order {} ({}) during {}",
                expected,
                patch.status,
                order.id,
                order.correlation_key,
                stage
            );
            return Err(OrderError::InvalidTransition {
                from: expected,
                to: patch.status,
            });
        }

        self.store
            .compare_and_set(order.id, expected, patch)
            .await
            .at(stage, &order.correlation_key)
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .get(order_id)
            .await
            .at("load", order_id)?
            .ok_or(OrderError::NotFound(order_id))
    }

    async fn load_by_key(&self, correlation_key: &str) -> Result<Order, OrderError> {
        self.store
            .get_by_correlation_key(correlation_key)
            .await
            .at("load_by_correlation_key", correlation_key)?
            .ok_or_else(|| OrderError::UnknownCorrelationKey(correlation_key.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("No order for correlation key {0}")]
    UnknownCorrelationKey(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid order request: {0}")]
    Validation(String),

    #[error("Payment initiation failed for order {order_id} ({correlation_key}): {source}")]
    PaymentInitiation {
        order_id: Uuid,
        correlation_key: String,
        #[source]
        source: PaymentGatewayError,
    },

    #[error("Order {order_id} is {status}, no number has been provisioned")]
    NotProvisioned { order_id: Uuid, status: OrderStatus },

    #[error("Activation lookup failed for order {order_id}: {source}")]
    ActivationLookup {
        order_id: Uuid,
        #[source]
        source: ProvisioningError,
    },

    #[error("Order {order_id} left {expected} during {stage}")]
    ClaimLost {
        order_id: Uuid,
        expected: OrderStatus,
        stage: &'static str,
    },

    #[error("Store failure during {stage} for {reference}: {source}")]
    Store {
        stage: &'static str,
        reference: String,
        #[source]
        source: StoreError,
    },
}

/// Attach the stage and the order reference to store errors.
trait StoreContext<T> {
    fn at(self, stage: &'static str, reference: impl fmt::Display) -> Result<T, OrderError>;
}

impl<T> StoreContext<T> for Result<T, StoreError> {
    fn at(self, stage: &'static str, reference: impl fmt::Display) -> Result<T, OrderError> {
        self.map_err(|source| OrderError::Store {
            stage,
            reference: reference.to_string(),
            source,
        })
    }
}
