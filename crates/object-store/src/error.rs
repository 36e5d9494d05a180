//! Error types for the blob store.

use common::blob::{BlobError, BlobLocator};

/// Errors that can occur when working with the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob not found
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Locator was not issued by this store
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bucket or container not found - must be created before use
    #[error("bucket '{0}' does not exist. Create it before starting the daemon.")]
    BucketNotFound(String),
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;

impl From<BlobStoreError> for BlobError {
    fn from(e: BlobStoreError) -> Self {
        match e {
            BlobStoreError::NotFound(locator) => BlobError::NotFound(BlobLocator::new(locator)),
            BlobStoreError::InvalidLocator(locator) => BlobError::InvalidLocator(locator),
            other => BlobError::Backend(other.to_string()),
        }
    }
}
