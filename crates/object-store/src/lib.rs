//! Object Storage Backend
//!
//! This crate provides the vault's ciphertext blob store, implementing
//! [`common::blob::BlobStore`] on top of pluggable object storage
//! (S3/MinIO/Azure/local filesystem/memory).
//!
//! # Example
//!
//! ```rust,no_run
//! use anchor_object_store::ObjectBlobStore;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), anchor_object_store::BlobStoreError> {
//! // Create a local file-based store
//! let store = ObjectBlobStore::new_local(Path::new("/tmp/blobs")).await?;
//! let _locator = store.put_blob(bytes::Bytes::from_static(b"ciphertext")).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod object_store;
mod storage;

pub use error::{BlobStoreError, Result};
pub use object_store::ObjectBlobStore;
pub use storage::ObjectStoreConfig;
