use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

/// Counters shared by the webhook handlers, reported by the heartbeat.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    ignored: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub ignored: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl RelayStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Start the hourly heartbeat. The returned scheduler must be kept alive.
pub async fn start(stats: Arc<RelayStats>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let stats = stats.clone();
        Box::pin(async move {
            let s = stats.snapshot();
            info!(
                received = s.received,
                ignored = s.ignored,
                delivered = s.delivered,
                failed = s.failed,
                "Heartbeat: relay is alive"
            );
        })
    })
    .context("Failed to create heartbeat job")?;

    scheduler
        .add(job)
        .await
        .context("Failed to add heartbeat job")?;
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;

    info!("Heartbeat scheduled hourly");
    Ok(scheduler)
}
