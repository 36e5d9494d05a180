use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque handle returned by a blob store for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobLocator(String);

impl BlobLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlobLocator {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(BlobLocator),
    #[error("invalid blob locator: {0}")]
    InvalidLocator(String),
    #[error("blob store error: {0}")]
    Backend(String),
}

/// Bulk storage for ciphertext
///
/// Implementations pick the locator; callers treat it as opaque and hand
///  it back unchanged to `get`. Nothing behind this trait sees plaintext.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug + 'static {
    /// Store `data` and return the locator it can be fetched with
    async fn put(&self, data: Bytes) -> Result<BlobLocator, BlobError>;

    /// Fetch the bytes previously stored under `locator`
    async fn get(&self, locator: &BlobLocator) -> Result<Bytes, BlobError>;

    async fn exists(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        match self.get(locator).await {
            Ok(_) => Ok(true),
            Err(BlobError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
