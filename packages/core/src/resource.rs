//! Resource identity and the retrieval seam that turns it into a local file.

use std::path::PathBuf;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::job::JobId;

/// Identifies one version of an input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Where the file lives: a local path or an object key.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub identifier: String,
    pub version: String,
}

impl ResourceDescriptor {
    pub fn new(
        path: impl Into<String>,
        identifier: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            mime_type: None,
            identifier: identifier.into(),
            version: version.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// `<identifier>__<version>`.
    pub fn unique_identifier(&self) -> String {
        format!("{}__{}", self.identifier, self.version)
    }

    pub fn job_id(&self) -> JobId {
        JobId::for_resource(&self.unique_identifier())
    }

    /// Read a descriptor out of a queue payload.
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }

    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "path": self.path,
            "mime_type": self.mime_type,
            "identifier": self.identifier,
            "version": self.version,
        })
    }
}

/// A resource made available on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResource {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Retrieval backend error: {0}")]
    Backend(String),
}

/// Resolves a descriptor to a seekable local file and its size.
pub trait ResourceFetcher: Send + Sync {
    fn localize<'a>(
        &'a self,
        resource: &'a ResourceDescriptor,
    ) -> BoxFuture<'a, Result<LocalResource, FetchError>>;

    /// Give back any local copy made for `resource`.
    fn release<'a>(&'a self, _resource: &'a ResourceDescriptor) -> BoxFuture<'a, Result<(), FetchError>> {
        Box::pin(async { Ok(()) })
    }
}
