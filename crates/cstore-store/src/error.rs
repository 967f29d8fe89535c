use cstore_types::{ContentUrl, UrlError};

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The URL failed protocol or length validation.
    #[error("invalid content URL: {0}")]
    InvalidUrl(#[from] UrlError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No content is stored at the URL.
    #[error("content not found: {0}")]
    NotFound(ContentUrl),

    /// The URL is already occupied or reserved by another writer.
    #[error("content already exists: {0}")]
    AlreadyExists(ContentUrl),

    /// Storage backend is read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// Backend-specific failure that is not an I/O error.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend declines the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Store configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns `true` for backend failures: I/O errors, missing or occupied
    /// content, and read-only violations. These are never caller data errors.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::NotFound(_) | Self::AlreadyExists(_) | Self::ReadOnly | Self::Backend(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
