use std::sync::Arc;

use anyhow::Result;
use relay_axum::{axum, RelayAxumApp};
use relay_blob::{
    BlobRepository, BlobStagingService, BlobSweeper, CleanupConfig, MemoryBlobRepository,
    S3BlobRepository, S3Config, StagingConfig,
};
use relay_core::RelayConfigSnapshot;
use relay_device::{HttpChannelConfig, HttpMethodChannel, RelayOptions, RelayOrchestrator};
use tracing::{info, warn};

async fn blob_repository(config: &RelayConfigSnapshot) -> Result<Arc<dyn BlobRepository>> {
    let backend = config.get_string_or("storage.backend", "s3");
    match backend.to_ascii_lowercase().as_str() {
        "s3" => {
            let s3 = S3Config::from_snapshot(config);
            info!(bucket = %s3.bucket, "Using S3 blob storage");
            Ok(Arc::new(S3BlobRepository::connect(s3).await))
        }
        "memory" => {
            warn!("Using in-memory blob storage; staged blobs are lost on restart");
            Ok(Arc::new(MemoryBlobRepository::new()))
        }
        other => anyhow::bail!("Unknown storage.backend '{other}'"),
    }
}

/// Wire storage, the device channel and the sweeper into an HTTP app.
pub async fn relay_app(config: &RelayConfigSnapshot) -> Result<RelayAxumApp> {
    let repository = blob_repository(config).await?;
    let staging = Arc::new(BlobStagingService::from_arc(
        repository,
        StagingConfig::from_snapshot(config),
    ));

    let cleanup = CleanupConfig::from_snapshot(config);
    if cleanup.disabled {
        info!("Blob cleanup disabled");
    } else {
        tokio::spawn(BlobSweeper::new(Arc::clone(&staging), &cleanup).start());
    }

    let channel = HttpMethodChannel::new(HttpChannelConfig::from_snapshot(config)?);
    let relay = RelayOrchestrator::new(
        Arc::new(channel),
        staging,
        RelayOptions::from_snapshot(config),
    );

    Ok(axum(relay))
}
