//! Where resources are read from and where their local copies go.

use std::path::PathBuf;

use crate::StorageError;

/// Default directory localized resources are copied into.
pub const DEFAULT_LOCAL_DIR: &str = "./data/datastore_local";

/// Backend holding uploaded resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSource {
    /// S3-compatible bucket. Region, endpoint and credentials come from the
    /// usual `AWS_*` variables.
    Bucket(String),
    /// Directory on the local filesystem.
    Directory(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source: ResourceSource,
    /// Prepended to every resource path before lookup.
    pub key_prefix: Option<String>,
    /// Where resources are copied before import.
    pub local_dir: PathBuf,
}

impl SourceConfig {
    pub fn new(source: ResourceSource) -> Self {
        Self {
            source,
            key_prefix: None,
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIR),
        }
    }

    pub fn memory() -> Self {
        Self::new(ResourceSource::Memory)
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = non_empty(prefix.into().trim().trim_matches('/').to_string());
        self
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    /// Parse a source location.
    ///
    /// Accepted forms are `s3://bucket[/prefix]`, `file:///dir[/]`, a bare
    /// directory path, and `memory://[prefix]`.
    pub fn parse(location: &str) -> Result<Self, StorageError> {
        let location = location.trim();
        let Some((scheme, rest)) = location.split_once("://") else {
            if location.is_empty() {
                return Err(StorageError::InvalidConfig(
                    "resource source must not be empty".into(),
                ));
            }
            return Ok(Self::new(ResourceSource::Directory(location.into())));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "s3" => {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(StorageError::InvalidConfig(format!(
                        "missing bucket name in {location}"
                    )));
                }
                Ok(Self::new(ResourceSource::Bucket(bucket.to_string())).with_key_prefix(prefix))
            }
            "file" if !rest.is_empty() => Ok(Self::new(ResourceSource::Directory(rest.into()))),
            "memory" | "mem" => Ok(Self::memory().with_key_prefix(rest)),
            _ => Err(StorageError::InvalidConfig(format!(
                "unsupported resource source {location} (expected s3://, file:// or memory://)"
            ))),
        }
    }

    /// Read `DATASTORE_OBJECT_STORE` (default `./data/object_store`) and
    /// `DATASTORE_LOCAL_DIR` (default [`DEFAULT_LOCAL_DIR`]).
    pub fn from_env() -> Result<Self, StorageError> {
        let source = env_var("DATASTORE_OBJECT_STORE")?.unwrap_or_else(|| "./data/object_store".into());
        let cfg = Self::parse(&source)?;
        Ok(match env_var("DATASTORE_LOCAL_DIR")? {
            Some(dir) => cfg.with_local_dir(dir),
            None => cfg,
        })
    }
}

fn env_var(name: &str) -> Result<Option<String>, StorageError> {
    match std::env::var(name) {
        Ok(v) => Ok(non_empty(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(StorageError::InvalidConfig(format!("failed reading {name}: {e}"))),
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn bucket_locations_carry_their_prefix() -> Result<(), StorageError> {
        let cfg = SourceConfig::parse("s3://datasets/uploads/public/")?;
        assert_eq!(cfg.source, ResourceSource::Bucket("datasets".into()));
        assert_eq!(cfg.key_prefix.as_deref(), Some("uploads/public"));
        assert_eq!(cfg.local_dir, PathBuf::from(DEFAULT_LOCAL_DIR));

        let cfg = SourceConfig::parse("S3://datasets")?;
        assert!(cfg.key_prefix.is_none());
        Ok(())
    }

    #[test]
    fn directories_keep_the_whole_path() -> Result<(), StorageError> {
        let cfg = SourceConfig::parse("file:///srv/files/")?;
        assert_eq!(cfg.source, ResourceSource::Directory("/srv/files/".into()));
        assert!(cfg.key_prefix.is_none());

        let cfg = SourceConfig::parse("./data/object_store")?;
        assert_eq!(cfg.source, ResourceSource::Directory("./data/object_store".into()));
        Ok(())
    }

    #[test]
    fn memory_and_bad_locations() -> Result<(), StorageError> {
        let cfg = SourceConfig::parse("memory://uploads")?.with_local_dir("/tmp/local");
        assert_eq!(cfg.source, ResourceSource::Memory);
        assert_eq!(cfg.key_prefix.as_deref(), Some("uploads"));
        assert_eq!(cfg.local_dir, PathBuf::from("/tmp/local"));

        for bad in ["", "   ", "s3://", "s3:///x", "ftp://host/x", "file://"] {
            assert!(
                matches!(SourceConfig::parse(bad), Err(StorageError::InvalidConfig(_))),
                "{bad:?} should be rejected"
            );
        }
        Ok(())
    }
}
