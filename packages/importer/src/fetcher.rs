//! Resource retrieval from the local filesystem.

use std::path::{Path, PathBuf};

use queue_core::{BoxFuture, FetchError, LocalResource, ResourceDescriptor, ResourceFetcher};

/// Resolves descriptors whose path already points at a local file.
///
/// Relative paths are resolved against an optional base directory and a
/// leading `file://` is ignored.
#[derive(Debug, Clone, Default)]
pub struct LocalFileFetcher {
    base_dir: Option<PathBuf>,
}

impl LocalFileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    pub fn resolve(&self, resource: &ResourceDescriptor) -> PathBuf {
        let raw = resource.path.strip_prefix("file://").unwrap_or(&resource.path);
        let path = Path::new(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ResourceFetcher for LocalFileFetcher {
    fn localize<'a>(
        &'a self,
        resource: &'a ResourceDescriptor,
    ) -> BoxFuture<'a, Result<LocalResource, FetchError>> {
        Box::pin(async move {
            let path = self.resolve(resource);
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(FetchError::NotFound(path.display().to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                return Err(FetchError::NotFound(path.display().to_string()));
            }
            Ok(LocalResource {
                path,
                size: metadata.len(),
            })
        })
    }
}
