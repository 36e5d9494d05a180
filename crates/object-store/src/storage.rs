//! Object storage backend abstraction (S3/MinIO/Azure/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{BlobStoreError, Result};

/// Configuration for the object storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },

    /// Azure blob storage
    Azure {
        /// Storage account name
        account: String,
        /// Storage account access key
        access_key: String,
        /// Container name
        container: String,
    },
}

/// Wrapper around different object storage backends.
#[derive(Debug, Clone)]
pub(crate) struct Storage {
    inner: Arc<dyn ObjectStore>,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let store: Arc<dyn ObjectStore> = Arc::new(
                    AmazonS3Builder::new()
                        .with_endpoint(endpoint)
                        .with_access_key_id(access_key)
                        .with_secret_access_key(secret_key)
                        .with_bucket_name(bucket)
                        .with_region(region.as_deref().unwrap_or("us-east-1"))
                        .with_allow_http(endpoint.starts_with("http://"))
                        .build()
                        .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?,
                );
                Self::verify_bucket(store.as_ref(), bucket).await?;
                store
            }

            ObjectStoreConfig::Azure {
                account,
                access_key,
                container,
            } => {
                let store: Arc<dyn ObjectStore> = Arc::new(
                    MicrosoftAzureBuilder::new()
                        .with_account(account)
                        .with_access_key(access_key)
                        .with_container_name(container)
                        .build()
                        .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?,
                );
                Self::verify_bucket(store.as_ref(), container).await?;
                store
            }
        };

        Ok(Self { inner })
    }

    /// Fail fast if the bucket (or container) doesn't exist
    async fn verify_bucket(store: &dyn ObjectStore, bucket: &str) -> Result<()> {
        use futures::TryStreamExt;

        let prefix = ObjectPath::from("");
        let mut stream = store.list(Some(&prefix));
        match stream.try_next().await {
            Ok(_) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(BlobStoreError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("NoSuchBucket")
                    || msg.contains("ContainerNotFound")
                    || msg.contains("bucket") && msg.contains("not")
                {
                    return Err(BlobStoreError::BucketNotFound(bucket.to_string()));
                }
                Err(e.into())
            }
        }
    }

    /// Put an object into storage.
    pub async fn put(&self, path: &ObjectPath, data: Bytes) -> Result<()> {
        self.inner.put(path, data.into()).await?;
        Ok(())
    }

    /// Get an object from storage.
    pub async fn get(&self, path: &ObjectPath) -> Result<Option<Bytes>> {
        match self.inner.get(path).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(bytes))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if an object exists in storage.
    pub async fn has(&self, path: &ObjectPath) -> Result<bool> {
        match self.inner.head(path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
impl Storage {
    /// Create an in-memory storage backend (test-only).
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = Storage::memory();

        let path = ObjectPath::from("blobs/abc123");
        let data = Bytes::from("hello world");

        storage.put(&path, data.clone()).await.unwrap();
        let retrieved = storage.get(&path).await.unwrap().unwrap();
        assert_eq!(retrieved, data);

        assert!(storage.has(&path).await.unwrap());
        assert!(!storage
            .has(&ObjectPath::from("blobs/missing"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_local_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig::Local {
            path: temp_dir.path().to_path_buf(),
        };

        let storage = Storage::new(config).await.unwrap();

        let path = ObjectPath::from("blobs/def456");
        let data = Bytes::from("test data");

        storage.put(&path, data.clone()).await.unwrap();
        let retrieved = storage.get(&path).await.unwrap().unwrap();
        assert_eq!(retrieved, data);

        // Verify file exists on disk
        let file_path = temp_dir.path().join("blobs").join("def456");
        assert!(file_path.exists());
    }

    #[test]
    fn test_config_from_toml_style_json() {
        let config: ObjectStoreConfig =
            serde_json::from_str(r#"{"type":"local","path":"/var/lib/anchor/blobs"}"#).unwrap();
        assert_eq!(
            config,
            ObjectStoreConfig::Local {
                path: PathBuf::from("/var/lib/anchor/blobs")
            }
        );
    }
}
