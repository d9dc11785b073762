use async_trait::async_trait;
use std::time::Duration;

use crate::{BlobInfo, BlobResult, BlobUpload, OpenedBlob};

/// Storage primitives the relay needs from a blob backend.
///
/// Paths are `/`-separated; a leading `/` is ignored.
#[async_trait]
pub trait BlobRepository: Send + Sync {
    /// Info for one blob, `None` if absent.
    async fn get_info(&self, path: &str) -> BlobResult<Option<BlobInfo>>;

    /// Every blob under `prefix`, whatever the depth.
    ///
    /// An empty prefix is rejected with `InvalidArgument`. A missing
    /// container yields an empty list.
    async fn list(&self, prefix: &str) -> BlobResult<Vec<BlobInfo>>;

    /// Fails with `NotFound` if absent.
    async fn open(&self, path: &str) -> BlobResult<OpenedBlob>;

    /// Store `upload` at `path`. Without `overwrite`, an existing blob
    /// fails the write with `Conflict`.
    async fn write(&self, path: &str, upload: BlobUpload, overwrite: bool) -> BlobResult<()>;

    /// `true` if a blob was deleted, `false` if there was nothing there.
    async fn delete(&self, path: &str) -> BlobResult<bool>;

    /// A time-limited URL granting read access to an existing blob.
    async fn delegated_read_url(&self, path: &str, ttl: Duration) -> BlobResult<String>;
}
