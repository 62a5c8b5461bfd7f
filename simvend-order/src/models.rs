use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use simvend_core::{CheckoutSession, ProvisionedNumber, Selector};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the lifecycle.
///
/// ```text
/// PENDING_PAYMENT -> PAID -> PROVISIONING -> COMPLETED
///        |            |           |
///        |            |           +-> FAILED_PROVISIONING
///        |            +-> CANCELED
///        +-> FAILED_PAYMENT / CANCELED
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Provisioning,
    Completed,
    FailedPayment,
    FailedProvisioning,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Provisioning,
        OrderStatus::Completed,
        OrderStatus::FailedPayment,
        OrderStatus::FailedProvisioning,
        OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Provisioning => "PROVISIONING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::FailedPayment => "FAILED_PAYMENT",
            OrderStatus::FailedProvisioning => "FAILED_PROVISIONING",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::FailedPayment
                | OrderStatus::FailedProvisioning
                | OrderStatus::Canceled
        )
    }

    /// The transition table. Two edges are bookkeeping rather than progress:
    /// `PENDING_PAYMENT -> PENDING_PAYMENT` attaches a checkout reference and
    /// `PROVISIONING -> PAID` releases the provisioning claim after a transient failure.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, PendingPayment)
                | (PendingPayment, Paid)
                | (PendingPayment, FailedPayment)
                | (PendingPayment, Canceled)
                | (Paid, Provisioning)
                | (Paid, Canceled)
                | (Provisioning, Completed)
                | (Provisioning, FailedProvisioning)
                | (Provisioning, Paid)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Who is paying for the order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Buyer {
    pub customer_id: String,
    pub email: String,
}

/// A purchase of one activation number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub correlation_key: String,
    pub customer_id: String,
    pub payer_email: String,
    #[serde(flatten)]
    pub selector: Selector,
    pub price_sell: Decimal,
    pub status: OrderStatus,
    pub checkout_url: Option<String>,
    pub payment_reference: Option<String>,
    pub provider_order_id: Option<i64>,
    pub phone_number: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materialize a freshly inserted order. Only stores call this.
    pub fn from_new(id: Uuid, new: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            correlation_key: new.correlation_key,
            customer_id: new.buyer.customer_id,
            payer_email: new.buyer.email,
            selector: new.selector,
            price_sell: new.price_sell,
            status: OrderStatus::PendingPayment,
            checkout_url: None,
            payment_reference: None,
            provider_order_id: None,
            phone_number: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a guarded patch after the caller checked the expected status.
    pub fn apply(&mut self, patch: &OrderPatch, now: DateTime<Utc>) {
        self.status = patch.status;
        if let Some(url) = &patch.checkout_url {
            self.checkout_url = Some(url.clone());
        }
        if let Some(reference) = &patch.payment_reference {
            self.payment_reference = Some(reference.clone());
        }
        if let Some(id) = patch.provider_order_id {
            self.provider_order_id = Some(id);
        }
        if let Some(phone) = &patch.phone_number {
            self.phone_number = Some(phone.clone());
        }
        if let Some(message) = &patch.error_message {
            self.error_message = Some(message.clone());
        }
        self.updated_at = now;
    }

    pub fn has_checkout(&self) -> bool {
        self.checkout_url.is_some()
    }

    pub fn checkout_session(&self) -> Option<CheckoutSession> {
        match (&self.checkout_url, &self.payment_reference) {
            (Some(url), Some(reference)) => Some(CheckoutSession {
                invoice_id: reference.clone(),
                checkout_url: url.clone(),
            }),
            _ => None,
        }
    }

    /// Guard of the compare-and-set: the order is still in `expected`, and a
    /// patch carrying a checkout only lands on an order that has none.
    pub fn admits(&self, expected: OrderStatus, patch: &OrderPatch) -> bool {
        self.status == expected && (patch.checkout_url.is_none() || self.checkout_url.is_none())
    }
}

/// Insert payload; the store assigns the id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub correlation_key: String,
    pub buyer: Buyer,
    pub selector: Selector,
    pub price_sell: Decimal,
}

impl NewOrder {
    pub fn new(buyer: Buyer, selector: Selector, price_sell: Decimal) -> Self {
        Self {
            correlation_key: generate_correlation_key(),
            buyer,
            selector,
            price_sell,
        }
    }
}

/// Invoice identifier shared with the payment gateway
pub fn generate_correlation_key() -> String {
    format!("INV-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

/// Fields written together with a guarded status change. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: OrderStatus,
    pub checkout_url: Option<String>,
    pub payment_reference: Option<String>,
    pub provider_order_id: Option<i64>,
    pub phone_number: Option<String>,
    pub error_message: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status,
            checkout_url: None,
            payment_reference: None,
            provider_order_id: None,
            phone_number: None,
            error_message: None,
        }
    }

    pub fn with_checkout(mut self, session: &CheckoutSession) -> Self {
        self.checkout_url = Some(session.checkout_url.clone());
        self.payment_reference = Some(session.invoice_id.clone());
        self
    }

    pub fn with_number(mut self, number: &ProvisionedNumber) -> Self {
        self.provider_order_id = Some(number.provider_order_id);
        self.phone_number = Some(number.phone_number.clone());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Listing filter for a customer's orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_happy_path_edges() {
        assert!(OrderStatus::PendingPayment.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Provisioning));
        assert!(OrderStatus::Provisioning.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_no_status_skips() {
        assert!(!OrderStatus::PendingPayment.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::PendingPayment.can_transition_to(OrderStatus::Provisioning));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::FailedPayment));
        assert!(!OrderStatus::Provisioning.can_transition_to(OrderStatus::Canceled));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {} must be rejected", from, to);
            }
        }
    }

    #[test]
    fn test_status_text_form() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_correlation_keys_are_unique() {
        let a = generate_correlation_key();
        let b = generate_correlation_key();
        assert!(a.starts_with("INV-"));
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_apply_patch_keeps_untouched_fields() {
        let buyer = Buyer { customer_id: "7".into(), email: "buyer@example.com".into() };
        let new = NewOrder::new(buyer, Selector::new("telegram", "russia", "any"), dec!(15000));
        let created = Utc::now();
        let mut order = Order::from_new(Uuid::new_v4(), new, created);

        let session = CheckoutSession {
            invoice_id: "inv_1".into(),
            checkout_url: "https://checkout.example/inv_1".into(),
        };
        order.apply(&OrderPatch::status(OrderStatus::PendingPayment).with_checkout(&session), Utc::now());
        order.apply(&OrderPatch::status(OrderStatus::Paid), Utc::now());

        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.checkout_url.as_deref(), Some("https://checkout.example/inv_1"));
        assert_eq!(order.payment_reference.as_deref(), Some("inv_1"));
        assert!(order.provider_order_id.is_none());
        assert_eq!(order.created_at, created);
        assert!(order.updated_at >= created);

        let replacement = CheckoutSession {
            invoice_id: "inv_2".into(),
            checkout_url: "https://checkout.example/inv_2".into(),
        };
        let attach = OrderPatch::status(OrderStatus::PendingPayment).with_checkout(&replacement);
        order.status = OrderStatus::PendingPayment;
        assert!(!order.admits(OrderStatus::PendingPayment, &attach));
        assert!(order.admits(OrderStatus::PendingPayment, &OrderPatch::status(OrderStatus::Paid)));
        assert_eq!(order.checkout_session(), Some(session));
    }
}
