//! ObjectBlobStore - the vault's ciphertext store over object storage.
//!
//! Every `put` lands under a freshly generated object key, so a stored blob
//! is never overwritten and locators are never reused. The store holds
//! ciphertext only and has no encryption responsibility.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use common::blob::{BlobError, BlobLocator, BlobStore};
use object_store::path::Path as ObjectPath;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{BlobStoreError, Result};
use crate::storage::{ObjectStoreConfig, Storage};

/// Prefix every blob object key lives under
const BLOB_PREFIX: &str = "blobs";

/// Blob store backed by S3, Azure, the local filesystem or memory.
#[derive(Debug, Clone)]
pub struct ObjectBlobStore {
    storage: Storage,
}

impl ObjectBlobStore {
    /// Create a store from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let storage = Storage::new(config).await?;
        Ok(Self { storage })
    }

    /// Create a store backed by the local filesystem.
    pub async fn new_local(data_dir: &Path) -> Result<Self> {
        Self::new(ObjectStoreConfig::Local {
            path: data_dir.to_path_buf(),
        })
        .await
    }

    /// Create a fully ephemeral in-memory store.
    pub async fn new_ephemeral() -> Result<Self> {
        Self::new(ObjectStoreConfig::Memory).await
    }

    /// Map a locator back to its object path, refusing anything this store
    /// could not have issued.
    fn object_path(locator: &BlobLocator) -> Result<ObjectPath> {
        let name = locator
            .as_str()
            .strip_prefix(BLOB_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| BlobStoreError::InvalidLocator(locator.to_string()))?;
        let id = Uuid::parse_str(name)
            .map_err(|_| BlobStoreError::InvalidLocator(locator.to_string()))?;
        Ok(ObjectPath::from(format!("{}/{}", BLOB_PREFIX, id)))
    }

    /// Store ciphertext and return its locator.
    pub async fn put_blob(&self, data: Bytes) -> Result<BlobLocator> {
        let size = data.len();
        let locator = BlobLocator::new(format!("{}/{}", BLOB_PREFIX, Uuid::new_v4()));
        let path = Self::object_path(&locator)?;

        debug!(%locator, size, "storing blob");
        self.storage.put(&path, data).await?;
        info!(%locator, size, "blob stored successfully");

        Ok(locator)
    }

    /// Fetch ciphertext by locator.
    pub async fn get_blob(&self, locator: &BlobLocator) -> Result<Bytes> {
        let path = Self::object_path(locator)?;
        self.storage
            .get(&path)
            .await?
            .ok_or_else(|| BlobStoreError::NotFound(locator.to_string()))
    }

    /// Check whether a blob exists.
    pub async fn has_blob(&self, locator: &BlobLocator) -> Result<bool> {
        let path = Self::object_path(locator)?;
        self.storage.has(&path).await
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(&self, data: Bytes) -> std::result::Result<BlobLocator, BlobError> {
        Ok(self.put_blob(data).await?)
    }

    async fn get(&self, locator: &BlobLocator) -> std::result::Result<Bytes, BlobError> {
        Ok(self.get_blob(locator).await?)
    }

    async fn exists(&self, locator: &BlobLocator) -> std::result::Result<bool, BlobError> {
        Ok(self.has_blob(locator).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = ObjectBlobStore::new_ephemeral().await.unwrap();
        let data = Bytes::from_static(b"ciphertext || tag");

        let locator = store.put(data.clone()).await.unwrap();
        assert!(locator.as_str().starts_with("blobs/"));
        assert_eq!(store.get(&locator).await.unwrap(), data);
        assert!(store.exists(&locator).await.unwrap());
    }

    #[tokio::test]
    async fn test_locators_are_never_reused() {
        let store = ObjectBlobStore::new_ephemeral().await.unwrap();
        let data = Bytes::from_static(b"same bytes");

        let a = store.put(data.clone()).await.unwrap();
        let b = store.put(data).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = ObjectBlobStore::new_ephemeral().await.unwrap();
        let locator = BlobLocator::new(format!("blobs/{}", Uuid::new_v4()));

        assert!(matches!(
            store.get(&locator).await,
            Err(BlobError::NotFound(_))
        ));
        assert!(!store.exists(&locator).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_locators_are_rejected() {
        let store = ObjectBlobStore::new_ephemeral().await.unwrap();
        for raw in ["", "blobs/", "blobs/../etc/passwd", "other/abc", "blobs/not-a-uuid"] {
            let locator = BlobLocator::new(raw);
            assert!(
                matches!(store.get(&locator).await, Err(BlobError::InvalidLocator(_))),
                "locator {:?} was accepted",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_local_store_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data = Bytes::from_static(b"persisted");

        let locator = {
            let store = ObjectBlobStore::new_local(temp_dir.path()).await.unwrap();
            store.put(data.clone()).await.unwrap()
        };

        let reopened = ObjectBlobStore::new_local(temp_dir.path()).await.unwrap();
        assert_eq!(reopened.get(&locator).await.unwrap(), data);
    }
}
