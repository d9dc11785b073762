//! # relay-blob: staging area for oversized relay payloads
//!
//! The command channel to a device is size-limited, so large bodies travel
//! out of band: the relay writes them to an object store and sends only a
//! time-limited read URL. Devices do the same in the other direction.
//!
//! ```text
//! ┌──────────────────────┐
//! │  BlobStagingService  │  ← unique paths, read URLs, expiry sweep
//! ├──────────────────────┤
//! │    BlobRepository    │  ← storage primitives (S3, memory)
//! └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let staging = BlobStagingService::new(MemoryBlobRepository::new(), StagingConfig::default());
//!
//! let upload = BlobUpload::from_bytes("a large body").with_content_type("text/plain");
//! let staged = staging.stage("device-42", upload).await?;
//!
//! assert!(staged.path.starts_with("server-uploads/device-42/RestApi/"));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod memory;
mod s3;
mod staging;
pub mod store;
mod sweeper;
mod types;

pub use config::{CleanupConfig, StagingConfig};
pub use error::{BlobError, BlobResult};
pub use memory::MemoryBlobRepository;
pub use s3::{S3BlobRepository, S3Config};
pub use staging::{BlobStagingService, StagedBlob};
pub use store::BlobRepository;
pub use sweeper::BlobSweeper;
pub use types::{
    collect_stream, normalize_path, stream_from_bytes, BlobInfo, BlobMetadata, BlobUpload,
    ByteStream, OpenedBlob, ORIGINAL_FILE_NAME_KEY,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobError, BlobRepository, BlobResult, BlobStagingService, BlobUpload, ByteStream,
        MemoryBlobRepository, StagingConfig,
    };
}
