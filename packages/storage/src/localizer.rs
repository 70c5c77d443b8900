//! Copies resources out of object storage so they can be read and seeked locally.

use std::path::{Path as FsPath, PathBuf};

use futures_util::StreamExt;
use queue_core::{BoxFuture, FetchError, LocalResource, ResourceDescriptor, ResourceFetcher};
use tokio::io::AsyncWriteExt;

use crate::{SourceConfig, Storage, StorageError};

/// [`ResourceFetcher`] backed by a [`Storage`].
///
/// Each resource is downloaded once into `<local_dir>/<identifier>_<version>/`
/// and reused by later invocations until [`ResourceFetcher::release`] removes
/// it.
#[derive(Clone)]
pub struct ResourceLocalizer {
    storage: Storage,
    local_dir: PathBuf,
}

impl ResourceLocalizer {
    pub fn new(storage: Storage, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            local_dir: local_dir.into(),
        }
    }

    pub async fn from_config(cfg: SourceConfig) -> Result<Self, StorageError> {
        Ok(Self::new(Storage::open(&cfg).await?, cfg.local_dir))
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::from_config(SourceConfig::from_env()?).await
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Directory holding the local copy of `resource`.
    pub fn resource_dir(&self, resource: &ResourceDescriptor) -> PathBuf {
        self.local_dir
            .join(format!("{}_{}", resource.identifier, resource.version))
    }

    /// Where the local copy of `resource` lives.
    pub fn local_path(&self, resource: &ResourceDescriptor) -> PathBuf {
        let name = FsPath::new(&resource.path)
            .file_name()
            .map_or_else(|| "resource".into(), |n| n.to_os_string());
        self.resource_dir(resource).join(name)
    }

    async fn download(&self, resource: &ResourceDescriptor, target: &FsPath) -> Result<u64, StorageError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write under a temporary name so an interrupted copy is never reused.
        let partial = target.with_extension("part");
        let mut stream = self.storage.get(&resource.path).await?.into_stream();
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, target).await?;

        tracing::info!(
            resource = %resource.unique_identifier(),
            path = %target.display(),
            size,
            "Resource localized"
        );
        Ok(size)
    }

    async fn localize_resource(&self, resource: &ResourceDescriptor) -> Result<LocalResource, StorageError> {
        let path = self.local_path(resource);
        let size = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => self.download(resource, &path).await?,
        };
        Ok(LocalResource { path, size })
    }

    /// Remove the local copy of `resource`, if any.
    pub async fn remove_local(&self, resource: &ResourceDescriptor) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(self.resource_dir(resource)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => {
                tracing::debug!(resource = %resource.unique_identifier(), "Local copy removed");
                Ok(())
            }
        }
    }
}

impl From<StorageError> for FetchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectStore(object_store::Error::NotFound { path, .. }) => FetchError::NotFound(path),
            StorageError::Io(e) => FetchError::Io(e),
            other => FetchError::Backend(other.to_string()),
        }
    }
}

impl ResourceFetcher for ResourceLocalizer {
    fn localize<'a>(
        &'a self,
        resource: &'a ResourceDescriptor,
    ) -> BoxFuture<'a, Result<LocalResource, FetchError>> {
        Box::pin(async move { Ok(self.localize_resource(resource).await?) })
    }

    fn release<'a>(&'a self, resource: &'a ResourceDescriptor) -> BoxFuture<'a, Result<(), FetchError>> {
        Box::pin(async move { Ok(self.remove_local(resource).await?) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use bytes::Bytes;

    use super::*;

    async fn localizer(dir: &FsPath) -> Result<ResourceLocalizer, StorageError> {
        ResourceLocalizer::from_config(SourceConfig::memory().with_local_dir(dir)).await
    }

    #[tokio::test]
    async fn downloads_once_and_releases() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let localizer = localizer(dir.path()).await?;
        localizer
            .storage()
            .put_bytes("uploads/prices.csv", Bytes::from("a,b\n1,2\n"))
            .await?;

        let resource = ResourceDescriptor::new("uploads/prices.csv", "abc", "42");
        let local = localizer.localize(&resource).await?;
        assert_eq!(local.size, 8);
        assert_eq!(local.path, dir.path().join("abc_42").join("prices.csv"));
        assert_eq!(std::fs::read(&local.path)?, b"a,b\n1,2\n");

        // The local copy is reused even once the object is gone.
        localizer.storage().delete("uploads/prices.csv").await?;
        assert_eq!(localizer.localize(&resource).await?, local);

        localizer.release(&resource).await?;
        assert!(!dir.path().join("abc_42").exists());
        localizer.release(&resource).await?;
        Ok(())
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let localizer = localizer(dir.path()).await?;
        let resource = ResourceDescriptor::new("nowhere.csv", "x", "1");

        assert!(matches!(
            localizer.localize(&resource).await,
            Err(FetchError::NotFound(_))
        ));
        assert!(!localizer.local_path(&resource).exists());
        Ok(())
    }
}
