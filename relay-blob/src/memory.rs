use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::{
    collect_stream, normalize_path, stream_from_bytes, BlobError, BlobInfo, BlobMetadata,
    BlobRepository, BlobResult, BlobUpload, OpenedBlob,
};

struct StoredBlob {
    data: Bytes,
    info: BlobInfo,
}

/// In-memory repository for tests and local development
#[derive(Clone)]
pub struct MemoryBlobRepository {
    blobs: Arc<RwLock<BTreeMap<String, StoredBlob>>>,
    base_url: String,
}

impl MemoryBlobRepository {
    /// Empty repository handing out `memory://blobs` URLs.
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(BTreeMap::new())),
            base_url: "memory://blobs".to_string(),
        }
    }

    /// Prefix used when handing out delegated read URLs.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Seed a blob with an explicit modification time.
    pub fn insert_with_last_modified(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
        last_modified: DateTime<Utc>,
    ) {
        let key = normalize_path(path).to_string();
        let data = data.into();
        let info = BlobInfo {
            path: key.clone(),
            content_type: content_type.map(str::to_string),
            metadata: BlobMetadata::default(),
            last_modified,
            length: data.len() as u64,
            checksum: Some(checksum(&data)),
        };
        self.blobs.write().insert(key, StoredBlob { data, info });
    }

    /// Whether a blob exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.read().contains_key(normalize_path(path))
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether no blob is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Raw content of a stored blob.
    pub fn bytes(&self, path: &str) -> Option<Bytes> {
        self.blobs
            .read()
            .get(normalize_path(path))
            .map(|blob| blob.data.clone())
    }
}

impl Default for MemoryBlobRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl BlobRepository for MemoryBlobRepository {
    async fn get_info(&self, path: &str) -> BlobResult<Option<BlobInfo>> {
        let blobs = self.blobs.read();
        Ok(blobs.get(normalize_path(path)).map(|blob| blob.info.clone()))
    }

    async fn list(&self, prefix: &str) -> BlobResult<Vec<BlobInfo>> {
        let prefix = normalize_path(prefix);
        if prefix.is_empty() {
            return Err(BlobError::invalid_argument("list prefix must not be empty"));
        }

        let blobs = self.blobs.read();
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, blob)| blob.info.clone())
            .collect())
    }

    async fn open(&self, path: &str) -> BlobResult<OpenedBlob> {
        let key = normalize_path(path);
        let blobs = self.blobs.read();
        let blob = blobs.get(key).ok_or_else(|| BlobError::not_found(key))?;

        Ok(OpenedBlob {
            info: blob.info.clone(),
            stream: stream_from_bytes(blob.data.clone()),
        })
    }

    async fn write(&self, path: &str, upload: BlobUpload, overwrite: bool) -> BlobResult<()> {
        let key = normalize_path(path).to_string();
        if key.is_empty() {
            return Err(BlobError::invalid_argument("blob path must not be empty"));
        }

        let data = collect_stream(upload.stream).await?;
        let info = BlobInfo {
            path: key.clone(),
            content_type: upload.content_type,
            metadata: upload.metadata,
            last_modified: Utc::now(),
            length: data.len() as u64,
            checksum: Some(checksum(&data)),
        };

        let mut blobs = self.blobs.write();
        if !overwrite && blobs.contains_key(&key) {
            return Err(BlobError::conflict(key));
        }
        blobs.insert(key, StoredBlob { data, info });
        Ok(())
    }

    async fn delete(&self, path: &str) -> BlobResult<bool> {
        Ok(self.blobs.write().remove(normalize_path(path)).is_some())
    }

    async fn delegated_read_url(&self, path: &str, ttl: Duration) -> BlobResult<String> {
        let key = normalize_path(path);
        if !self.blobs.read().contains_key(key) {
            return Err(BlobError::not_found(key));
        }

        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("{}/{}?se={}", self.base_url, key, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_without_overwrite_conflicts() {
        let repo = MemoryBlobRepository::new();
        repo.write("/a/b", BlobUpload::from_bytes("one"), false)
            .await
            .unwrap();

        let err = repo
            .write("a/b", BlobUpload::from_bytes("two"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Conflict { .. }));
        assert_eq!(repo.bytes("a/b").unwrap(), Bytes::from("one"));

        repo.write("a/b", BlobUpload::from_bytes("three"), true)
            .await
            .unwrap();
        assert_eq!(repo.bytes("a/b").unwrap(), Bytes::from("three"));
    }

    #[tokio::test]
    async fn list_requires_prefix_and_recurses() {
        let repo = MemoryBlobRepository::new();
        for path in ["root/x", "root/nested/deep/y", "rooted/z", "other/w"] {
            repo.write(path, BlobUpload::from_bytes("."), false)
                .await
                .unwrap();
        }

        assert!(matches!(
            repo.list("").await.unwrap_err(),
            BlobError::InvalidArgument { .. }
        ));
        assert!(matches!(
            repo.list("/").await.unwrap_err(),
            BlobError::InvalidArgument { .. }
        ));

        let mut paths: Vec<_> = repo
            .list("/root/")
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["root/nested/deep/y", "root/x"]);

        assert!(repo.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let repo = MemoryBlobRepository::new();
        repo.write("a", BlobUpload::from_bytes("."), false)
            .await
            .unwrap();

        assert!(repo.delete("/a").await.unwrap());
        assert!(!repo.delete("/a").await.unwrap());
    }

    #[tokio::test]
    async fn open_and_delegate_require_existing_blob() {
        let repo = MemoryBlobRepository::new();
        assert!(repo.open("nope").await.unwrap_err().is_not_found());
        assert!(repo
            .delegated_read_url("nope", Duration::from_secs(60))
            .await
            .unwrap_err()
            .is_not_found());

        repo.write(
            "f/report.csv",
            BlobUpload::from_bytes("a,b").with_content_type("text/csv"),
            false,
        )
        .await
        .unwrap();

        let opened = repo.open("/f/report.csv").await.unwrap();
        assert_eq!(opened.info.content_type.as_deref(), Some("text/csv"));
        assert_eq!(opened.info.length, 3);
        assert_eq!(
            collect_stream(opened.stream).await.unwrap(),
            Bytes::from("a,b")
        );

        let url = repo
            .delegated_read_url("f/report.csv", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("memory://blobs/f/report.csv?se="));
    }

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
