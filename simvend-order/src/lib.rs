pub mod models;
pub mod repository;
pub mod memory;
pub mod state_machine;
pub mod ingress;
pub mod reconciliation;

pub use models::{Buyer, NewOrder, Order, OrderFilter, OrderPatch, OrderStatus};
pub use repository::{OrderStore, StoreError, StoreResult};
pub use memory::InMemoryOrderStore;
pub use state_machine::{
    CreatedOrder, FailureOutcome, FulfillmentSettings, OrderError, OrderStateMachine,
    PaymentOutcome,
};
pub use ingress::{IngressError, IngressOutcome, PaymentNotification, WebhookIngress};
pub use reconciliation::{ReconciliationSweep, SweepReport};
