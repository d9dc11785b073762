use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    BlobError, BlobInfo, BlobRepository, BlobResult, BlobUpload, OpenedBlob, StagingConfig,
};

/// A body written to the store for the counterpart to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBlob {
    pub path: String,
    /// Delegated read URL handed to the device.
    pub url: String,
}

/// Staging area for bodies too large for the command channel
pub struct BlobStagingService {
    repository: Arc<dyn BlobRepository>,
    config: StagingConfig,
}

impl BlobStagingService {
    pub fn new<R: BlobRepository + 'static>(repository: R, config: StagingConfig) -> Self {
        Self {
            repository: Arc::new(repository),
            config,
        }
    }

    pub fn from_arc(repository: Arc<dyn BlobRepository>, config: StagingConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn BlobRepository> {
        &self.repository
    }

    /// A fresh server-bound path for `owner_id`.
    pub fn staged_path(&self, owner_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.server_folder,
            owner_id,
            self.config.server_sub_folder,
            Uuid::new_v4()
        )
    }

    /// Path of a blob the device uploaded under `name`.
    pub fn device_path(&self, owner_id: &str, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.device_folder,
            owner_id,
            name.trim_start_matches('/')
        )
    }

    /// Write `upload` under a unique path and mint a read URL for it.
    ///
    /// Never overwrites. A collision, or the blob vanishing before the URL
    /// is minted, fails with `Transient`.
    pub async fn stage(&self, owner_id: &str, upload: BlobUpload) -> BlobResult<StagedBlob> {
        let path = self.staged_path(owner_id);

        match self.repository.write(&path, upload, false).await {
            Ok(()) => {}
            Err(err @ BlobError::Conflict { .. }) => {
                return Err(BlobError::transient(
                    format!("staging path '{path}' already exists"),
                    err,
                ));
            }
            Err(err) => return Err(err),
        }

        let url = match self
            .repository
            .delegated_read_url(&path, self.config.read_access_ttl)
            .await
        {
            Ok(url) => url,
            Err(err @ BlobError::NotFound { .. }) => {
                return Err(BlobError::transient(
                    format!("staged blob '{path}' vanished before a read URL was issued"),
                    err,
                ));
            }
            Err(err) => return Err(err),
        };

        debug!(owner_id, path = %path, "Staged request body");
        Ok(StagedBlob { path, url })
    }

    /// Open a blob the device uploaded, by device-relative name.
    pub async fn fetch(&self, owner_id: &str, name: &str) -> BlobResult<OpenedBlob> {
        self.repository.open(&self.device_path(owner_id, name)).await
    }

    /// Delete staged blobs last modified more than `max_age` ago.
    ///
    /// Covers everything under the server-bound root plus relay-owned
    /// sub-folders of the device-bound root. Returns the number actually
    /// deleted; individual delete failures are logged and skipped.
    pub async fn sweep(&self, max_age: Duration) -> BlobResult<usize> {
        if max_age.is_zero() {
            return Err(BlobError::invalid_argument("sweep max age must be positive"));
        }
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|_| BlobError::invalid_argument("sweep max age is out of range"))?;
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .ok_or_else(|| BlobError::invalid_argument("sweep max age is out of range"))?;

        let server_root = format!("{}/", self.config.server_folder);
        let device_root = format!("{}/", self.config.device_folder);
        let marker = &self.config.server_sub_folder;

        let mut candidates: Vec<BlobInfo> = self.repository.list(&server_root).await?;
        candidates.extend(
            self.repository
                .list(&device_root)
                .await?
                .into_iter()
                .filter(|info| info.path.contains(marker.as_str())),
        );

        let expired: Vec<String> = candidates
            .into_iter()
            .filter(|info| info.last_modified < cutoff)
            .map(|info| info.path)
            .collect();

        debug!(expired = expired.len(), cutoff = %cutoff, "Sweeping staged blobs");

        let outcomes: Vec<(String, BlobResult<bool>)> = stream::iter(expired)
            .map(|path| {
                let repository = Arc::clone(&self.repository);
                async move {
                    let outcome = repository.delete(&path).await;
                    (path, outcome)
                }
            })
            .buffer_unordered(self.config.sweep_concurrency.max(1))
            .collect()
            .await;

        let mut deleted = 0;
        for (path, outcome) in outcomes {
            match outcome {
                Ok(true) => deleted += 1,
                Ok(false) => debug!(path = %path, "Blob already gone"),
                Err(e) => warn!(path = %path, error = %e, "Failed to delete expired blob"),
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlobRepository;

    #[test]
    fn paths_follow_direction_and_owner_layout() {
        let service = BlobStagingService::new(MemoryBlobRepository::new(), StagingConfig::default());

        let staged = service.staged_path("dev-1");
        let parts: Vec<_> = staged.split('/').collect();
        assert_eq!(parts[..3], ["server-uploads", "dev-1", "RestApi"]);
        assert!(Uuid::parse_str(parts[3]).is_ok());
        assert_ne!(staged, service.staged_path("dev-1"));

        assert_eq!(
            service.device_path("dev-1", "/logs/today.txt"),
            "device-uploads/dev-1/logs/today.txt"
        );
    }

    #[tokio::test]
    async fn zero_max_age_is_rejected() {
        let service = BlobStagingService::new(MemoryBlobRepository::new(), StagingConfig::default());
        assert!(matches!(
            service.sweep(Duration::ZERO).await.unwrap_err(),
            BlobError::InvalidArgument { .. }
        ));
    }
}
