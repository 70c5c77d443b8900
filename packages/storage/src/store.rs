//! Read access to uploaded resources through `object_store`.

use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path;
use object_store::{GetResult, ObjectStore, ObjectStoreExt};

use crate::StorageError;
use crate::config::{ResourceSource, SourceConfig};

/// Resource objects behind one handle, whichever backend holds them.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl Storage {
    pub async fn open(cfg: &SourceConfig) -> Result<Self, StorageError> {
        let store: Arc<dyn ObjectStore> = match &cfg.source {
            ResourceSource::Bucket(bucket) => Arc::new(
                object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?,
            ),
            ResourceSource::Directory(root) => {
                tokio::fs::create_dir_all(root).await?;
                Arc::new(object_store::local::LocalFileSystem::new_with_prefix(root)?)
            }
            ResourceSource::Memory => Arc::new(object_store::memory::InMemory::new()),
        };

        tracing::debug!(source = ?cfg.source, prefix = ?cfg.key_prefix, "Opened resource storage");
        Ok(Self {
            store,
            prefix: cfg.key_prefix.clone(),
        })
    }

    /// Object path for `key`, under the configured prefix.
    pub fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "object key must not be empty".to_string(),
            ));
        }

        Ok(match &self.prefix {
            Some(prefix) => Path::from(format!("{prefix}/{key}")),
            None => Path::from(key),
        })
    }

    pub async fn put_bytes(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    /// Open `key` for streaming.
    pub async fn get(&self, key: &str) -> Result<GetResult, StorageError> {
        let path = self.to_path(key)?;
        Ok(self.store.get(&path).await?)
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        Ok(self.get(key).await?.bytes().await?)
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store.delete(&path).await?;
        Ok(())
    }
}
