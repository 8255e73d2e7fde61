use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::reset_token_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::telemetry_retention_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Remove used and expired password reset tokens (runs every hour)
    async fn reset_token_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match scheduler.context.credentials.cleanup_reset_tokens().await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} stale reset tokens", count);
                    }
                }
                Err(e) => error!("Failed to clean up reset tokens: {}", e),
            }
        }
    }

    /// Purge telemetry past the retention window (runs daily)
    async fn telemetry_retention_job(scheduler: Arc<Self>) {
        let retention_days = scheduler.context.config.ingest.retention_days;
        if retention_days == 0 {
            info!("Telemetry retention disabled");
            return;
        }

        let mut interval = interval(Duration::from_secs(86400));

        loop {
            interval.tick().await;

            let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
            match scheduler.context.query.purge_older_than(cutoff).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} telemetry records older than {}", count, cutoff);
                    }
                }
                Err(e) => error!("Failed to purge old telemetry: {}", e),
            }
        }
    }
}
