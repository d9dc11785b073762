use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_core::Stream;
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::pin::Pin;

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Metadata key holding the caller-supplied file name.
pub const ORIGINAL_FILE_NAME_KEY: &str = "OriginalFileName";

/// Free-form string metadata attached to a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMetadata {
    values: BTreeMap<String, String>,
}

impl BlobMetadata {
    /// No entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the name the caller uploaded the body under.
    pub fn with_original_file_name(mut self, name: impl Into<String>) -> Self {
        self.insert(ORIGINAL_FILE_NAME_KEY, name);
        self
    }

    /// The caller's file name, if one was recorded.
    pub fn original_file_name(&self) -> Option<&str> {
        self.get(ORIGINAL_FILE_NAME_KEY)
    }

    /// Set `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    /// Whether no entry is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for BlobMetadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// What a repository knows about a stored blob.
#[derive(Debug, Clone)]
pub struct BlobInfo {
    /// Normalized path, without a leading `/`.
    pub path: String,
    pub content_type: Option<String>,
    pub metadata: BlobMetadata,
    pub last_modified: DateTime<Utc>,
    pub length: u64,
    pub checksum: Option<String>,
}

/// Content plus decorators for a write.
pub struct BlobUpload {
    pub stream: ByteStream,
    pub content_type: Option<String>,
    pub metadata: BlobMetadata,
}

impl BlobUpload {
    /// Upload of `stream` with no content type or metadata.
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            content_type: None,
            metadata: BlobMetadata::default(),
        }
    }

    /// Upload of an in-memory buffer.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(stream_from_bytes(data))
    }

    /// Set the stored content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: BlobMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl std::fmt::Debug for BlobUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobUpload")
            .field("content_type", &self.content_type)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// An open blob: its info and a readable stream.
pub struct OpenedBlob {
    pub info: BlobInfo,
    pub stream: ByteStream,
}

impl std::fmt::Debug for OpenedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedBlob")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Strip leading separators so `/a/b` and `a/b` name the same blob.
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Single-chunk stream over `data`.
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures_util::stream::once(async move { Ok(data) }))
}

/// Drain a stream into one buffer.
pub async fn collect_stream(mut stream: ByteStream) -> std::io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
