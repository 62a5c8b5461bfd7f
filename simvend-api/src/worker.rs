use simvend_order::ReconciliationSweep;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Periodically resumes provisioning for orders left in PAID.
pub async fn start_reconciliation_worker(sweep: ReconciliationSweep, every: Duration) {
    info!("Reconciliation worker started, sweeping every {:?}", every);

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match sweep.run_once().await {
            Ok(report) if report.stuck_provisioning > 0 => {
                warn!(
                    "{} order(s) stuck in PROVISIONING need manual attention",
                    report.stuck_provisioning
                );
            }
            Ok(_) => {}
            Err(e) => error!("Reconciliation sweep failed: {}", e),
        }
    }
}
