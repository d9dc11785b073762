use relay_core::{ErrorCode, RelayError};
use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob not found: {path}")]
    NotFound { path: String },

    #[error("Blob already exists: {path}")]
    Conflict { path: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The staging write collided or lost its blob; retrying the whole
    /// relay operation is safe.
    #[error("Transient staging failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Box<BlobError>,
    },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn conflict<S: Into<String>>(path: S) -> Self {
        Self::Conflict { path: path.into() }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn transient<S: Into<String>>(message: S, source: BlobError) -> Self {
        Self::Transient {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound { .. })
    }

    /// Translate into the relay taxonomy.
    ///
    /// Backend and I/O failures stay untranslated so the HTTP edge reports
    /// them as unhandled.
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            BlobError::NotFound { ref path } => {
                let err = RelayError::id_not_found(ErrorCode::BlobNotFound, path);
                err.with_source(anyhow::Error::new(self)).into_anyhow()
            }
            BlobError::Conflict { .. } => RelayError::conflict(ErrorCode::BlobAlreadyExists)
                .with_source(anyhow::Error::new(self))
                .into_anyhow(),
            BlobError::InvalidArgument { ref message } => {
                let err = RelayError::invalid_argument(message.clone());
                err.with_source(anyhow::Error::new(self)).into_anyhow()
            }
            BlobError::Transient { ref message, .. } => {
                let err = RelayError::transient(message.clone());
                err.with_source(anyhow::Error::new(self)).into_anyhow()
            }
            other => anyhow::Error::new(other),
        }
    }
}
