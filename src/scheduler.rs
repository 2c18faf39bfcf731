use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};

use crate::sync::{SyncError, SyncService};

/// Spawn a task running a non-forced sync every `period`.
///
/// The first tick fires immediately, so a fresh deployment fills its store on
/// startup. Providers still inside their TTL are skipped by the sync itself.
pub fn start_sync_scheduler(
    sync: Arc<SyncService>,
    period: Duration,
    deadline: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Sync scheduler started: interval={}s", period.as_secs());

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_scheduled_sync(&sync, deadline).await;
        }
    })
}

async fn run_scheduled_sync(sync: &SyncService, deadline: Duration) {
    info!("Running scheduled sync");
    match sync.sync_all(false, Some(Instant::now() + deadline)).await {
        Ok(report) => info!("Scheduled sync finished: status={:?}", report.status()),
        Err(SyncError::TotalFailure(report)) => {
            error!("Scheduled sync failed for every provider: {:?}", report)
        }
    }
}

/// Interval used when the configured TTL is zero, which `interval` rejects.
pub fn effective_period(ttl: Duration) -> Duration {
    if ttl.is_zero() {
        warn!("Sync interval is zero, falling back to one hour");
        Duration::from_secs(60 * 60)
    } else {
        ttl
    }
}
