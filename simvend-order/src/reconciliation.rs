use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::models::OrderStatus;
use crate::state_machine::{OrderError, OrderStateMachine, PaymentOutcome};

/// Counters for one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Orders sitting in PROVISIONING longer than `stale_after`; they may
    /// already hold a number, so they are reported rather than retried.
    pub stuck_provisioning: usize,
}

/// Resumes provisioning for paid orders left behind by transient failures.
pub struct ReconciliationSweep {
    machine: Arc<OrderStateMachine>,
    batch_size: i64,
    stale_after: Duration,
}

impl ReconciliationSweep {
    pub fn new(machine: Arc<OrderStateMachine>, batch_size: i64, stale_after: Duration) -> Self {
        Self {
            machine,
            batch_size,
            stale_after,
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport, OrderError> {
        let mut report = SweepReport::default();

        let paid = self
            .machine
            .store()
            .list_by_status(OrderStatus::Paid, self.batch_size)
            .await
            .map_err(|source| OrderError::Store {
                stage: "sweep_list_paid",
                reference: "sweep".to_string(),
                source,
            })?;

        for order in paid {
            report.examined += 1;
            match self.machine.resume_provisioning(order.id).await {
                Ok(PaymentOutcome::Completed(_)) => report.completed += 1,
                Ok(PaymentOutcome::FailedProvisioning(_)) => report.failed += 1,
                Ok(PaymentOutcome::AwaitingRetry(_)) => report.still_pending += 1,
                Ok(PaymentOutcome::AlreadyApplied(_)) => report.skipped += 1,
                Err(e) => {
                    tracing::error!("Sweep could not resume order {}: {}", order.id, e);
                    report.errors += 1;
                }
            }
        }

        let stale_after =
            chrono::Duration::from_std(self.stale_after).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - stale_after;
        let stuck: Vec<_> = self
            .machine
            .store()
            .list_by_status(OrderStatus::Provisioning, self.batch_size)
            .await
            .map_err(|source| OrderError::Store {
                stage: "sweep_list_provisioning",
                reference: "sweep".to_string(),
                source,
            })?
            .into_iter()
            .filter(|o| o.updated_at < cutoff)
            .collect();
        for order in &stuck {
            tracing::warn!(
                "Order {} ({}) in PROVISIONING since {}, check the provider manually",
                order.id,
                order.correlation_key,
                order.updated_at
            );
        }
        report.stuck_provisioning = stuck.len();

        if report.examined > 0 {
            tracing::info!("Reconciliation sweep finished: {:?}", report);
        }
        Ok(report)
    }
}
