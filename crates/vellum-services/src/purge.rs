//! Periodic purge of expired trash entries.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use vellum_core::models::BulkOutcome;
use vellum_core::AppResult;

use crate::trash::TrashService;

pub struct TrashPurgeService {
    trash: TrashService,
    interval: Duration,
    batch_size: i64,
}

impl TrashPurgeService {
    pub fn new(trash: TrashService, interval: Duration, batch_size: i64) -> Self {
        Self {
            trash,
            interval: interval.max(Duration::from_millis(1)),
            batch_size: batch_size.max(1),
        }
    }

    /// Start the background purge loop. It stops once `shutdown` is cancelled;
    /// a sweep already in progress finishes first.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut purge_interval = interval(self.interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Trash purge loop stopped");
                        break;
                    }
                    _ = purge_interval.tick() => {}
                }

                tracing::info!("Starting scheduled purge of expired trash");
                match self.run_once().await {
                    Ok(outcome) => {
                        tracing::info!(
                            purged = outcome.succeeded_count(),
                            failed = outcome.failed_count(),
                            "Trash purge completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Trash purge failed");
                    }
                }
            }
        })
    }

    /// Purge everything expired as of now, one batch at a time. Stops early when
    /// a batch makes no progress so failing entries are not retried in a loop.
    #[tracing::instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn run_once(&self) -> AppResult<BulkOutcome> {
        let start = Instant::now();
        let now = Utc::now();
        let mut total = BulkOutcome::default();

        loop {
            let batch = self.trash.purge_expired(now, self.batch_size).await?;
            let attempted = batch.succeeded_count() + batch.failed_count();
            let progressed = batch.succeeded_count() > 0;

            total.succeeded.extend(batch.succeeded);
            for id in batch.failed {
                if !total.failed.contains(&id) {
                    total.failed.push(id);
                }
            }

            if !progressed || (attempted as i64) < self.batch_size {
                break;
            }
        }

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            purged = total.succeeded_count(),
            "Purge sweep finished"
        );
        Ok(total)
    }
}
