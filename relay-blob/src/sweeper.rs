use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::{BlobResult, BlobStagingService, CleanupConfig};

/// Periodic sweep of expired staged blobs
pub struct BlobSweeper {
    staging: Arc<BlobStagingService>,
    expiration: Duration,
    interval: Duration,
}

impl BlobSweeper {
    pub fn new(staging: Arc<BlobStagingService>, cleanup: &CleanupConfig) -> Self {
        Self {
            staging,
            expiration: cleanup.expiration,
            interval: cleanup.interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run forever, one sweep per interval. The first sweep happens one
    /// interval after start.
    pub async fn start(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);

        info!(
            "Starting blob sweeper with interval {:?}, expiration {:?}",
            self.interval, self.expiration
        );

        loop {
            ticker.tick().await;

            match self.sweep_once().await {
                Ok(deleted) => {
                    if deleted > 0 {
                        info!("Deleted {} expired blobs", deleted);
                    } else {
                        debug!("No expired blobs found");
                    }
                }
                Err(e) => {
                    warn!("Error during blob sweep: {}", e);
                }
            }
        }
    }

    /// Run one sweep cycle
    pub async fn sweep_once(&self) -> BlobResult<usize> {
        self.staging.sweep(self.expiration).await
    }
}
