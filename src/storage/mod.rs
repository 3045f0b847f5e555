//! Object storage for page images and thumbnails
//! Uses Apache Arrow object_store crate

pub mod keys;

use std::sync::Arc;

use bytes::Bytes;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, path::Path as StoragePath};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{StorageConfig, StorageProvider};
use crate::fetch::ErrorClass;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} already holds different bytes")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

impl StorageError {
    /// Backend failures may clear up; a conflict or a missing object will not.
    pub fn class(&self) -> ErrorClass {
        match self {
            StorageError::ObjectStoreError(_) => ErrorClass::Transient,
            StorageError::Conflict(_)
            | StorageError::NotFound(_)
            | StorageError::InvalidConfig(_) => ErrorClass::Terminal,
        }
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// What a `put` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// The key already held identical bytes
    Unchanged,
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "mangabox-local".to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::in_memory()),
            StorageProvider::Local => {
                let root = config.root.as_ref().ok_or_else(|| {
                    StorageError::InvalidConfig("local provider requires storage.root".into())
                })?;
                std::fs::create_dir_all(root)
                    .map_err(|e| StorageError::InvalidConfig(format!("{}: {e}", root.display())))?;
                let store = object_store::local::LocalFileSystem::new_with_prefix(root)?;
                Ok(Self::new(Arc::new(store), config.bucket.clone()))
            }
            StorageProvider::S3 => {
                let mut builder = object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(&config.bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint).with_allow_http(true);
                }
                if let (Some(access), Some(secret)) = (&config.access_key, &config.secret_key) {
                    builder = builder
                        .with_access_key_id(access)
                        .with_secret_access_key(secret);
                }
                Ok(Self::new(Arc::new(builder.build()?), config.bucket.clone()))
            }
        }
    }

    /// Create-if-absent write. Re-putting identical bytes is a no-op; putting
    /// different bytes under an existing key is a conflict.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<PutOutcome> {
        let path = StoragePath::from(key);
        let size = data.len();
        let options = PutOptions::from(PutMode::Create);

        match self
            .store
            .put_opts(&path, PutPayload::from(data.clone()), options)
            .await
        {
            Ok(_) => {
                info!(key, size, "Stored object");
                Ok(PutOutcome::Created)
            }
            Err(object_store::Error::AlreadyExists { .. }) => self.compare_existing(key, &data).await,
            Err(object_store::Error::NotImplemented) => {
                // backend without conditional writes
                if self.exists(key).await? {
                    return self.compare_existing(key, &data).await;
                }
                self.store.put(&path, PutPayload::from(data)).await?;
                info!(key, size, "Stored object");
                Ok(PutOutcome::Created)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn compare_existing(&self, key: &str, data: &Bytes) -> Result<PutOutcome> {
        let existing = self.get(key).await?;
        if existing == *data {
            debug!(key, "Object already present with identical bytes");
            Ok(PutOutcome::Unchanged)
        } else {
            Err(StorageError::Conflict(key.to_string()))
        }
    }

    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;

        debug!(key, size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_get() {
        let storage = StorageClient::in_memory();
        let outcome = storage
            .put("work/a/chapter/1/page_001.jpg", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Created);

        let bytes = storage.get("work/a/chapter/1/page_001.jpg").await.unwrap();
        assert_eq!(&bytes[..], b"abc");
    }

    #[tokio::test]
    async fn test_identical_put_is_noop() {
        let storage = StorageClient::in_memory();
        storage.put("k", Bytes::from_static(b"same")).await.unwrap();
        let outcome = storage.put("k", Bytes::from_static(b"same")).await.unwrap();
        assert_eq!(outcome, PutOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_different_bytes_conflict() {
        let storage = StorageClient::in_memory();
        storage.put("k", Bytes::from_static(b"one")).await.unwrap();
        let err = storage.put("k", Bytes::from_static(b"two")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(err.class(), ErrorClass::Terminal);
        assert_eq!(&storage.get("k").await.unwrap()[..], b"one");
    }

    #[tokio::test]
    async fn test_exists_and_missing_get() {
        let storage = StorageClient::in_memory();
        assert!(!storage.exists("missing").await.unwrap());
        assert!(matches!(
            storage.get("missing").await,
            Err(StorageError::NotFound(_))
        ));
        storage.put("present", Bytes::from_static(b"x")).await.unwrap();
        assert!(storage.exists("present").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_provider_writes_files() {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig {
            provider: StorageProvider::Local,
            root: Some(temp.path().join("objects")),
            ..StorageConfig::default()
        };
        let storage = StorageClient::from_config(&config).unwrap();

        storage
            .put("work/w/chapter/2/page_003.jpg", Bytes::from_static(b"img"))
            .await
            .unwrap();

        let on_disk = temp.path().join("objects/work/w/chapter/2/page_003.jpg");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"img");
    }

    #[test]
    fn test_local_provider_requires_root() {
        let config = StorageConfig {
            provider: StorageProvider::Local,
            root: None,
            ..StorageConfig::default()
        };
        assert!(matches!(
            StorageClient::from_config(&config),
            Err(StorageError::InvalidConfig(_))
        ));
    }
}
