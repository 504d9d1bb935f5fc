use std::time::Duration;

use chrono::Utc;
use commission_engine::{traits::HoldReleaseResult, LedgerApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the hold-expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_hold_release_worker(ledger: LedgerApi<SqliteDatabase>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Hold-expiry worker started. Checking every {}s", period.as_secs());
        loop {
            timer.tick().await;
            debug!("🕰️ Running hold-expiry job");
            match ledger.release_expired_holds(Utc::now()).await {
                Ok(result) => log_result(&result),
                Err(e) => error!("🕰️ Error running hold-expiry job: {e}"),
            }
        }
    })
}

fn log_result(result: &HoldReleaseResult) {
    if result.count() > 0 {
        info!("🕰️ {} expired holds released: {}", result.count(), hold_list(result));
    } else {
        trace!("🕰️ No expired holds");
    }
    for (id, reason) in &result.failed {
        warn!("🕰️ Could not release expired hold #{id}. {reason}");
    }
}

fn hold_list(result: &HoldReleaseResult) -> String {
    result
        .released
        .iter()
        .map(|u| {
            let hold = u.transaction.related_transaction_id.map(|id| format!("#{id}")).unwrap_or_default();
            format!("[{hold}] partner: {} amount: {}", u.transaction.partner_id, u.transaction.amount)
        })
        .collect::<Vec<String>>()
        .join(", ")
}
