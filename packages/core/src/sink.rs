//! The storage engine that imported rows are written to.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::ResourceDescriptor;

/// One column of a sink table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Original header text on a single line.
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldSpec {
    /// A text column.
    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            field_type: "text".to_string(),
        }
    }
}

/// Ordered column list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSchema {
    pub fields: Vec<FieldSpec>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("No schema has been set")]
    SchemaNotSet,
    #[error("Row has {found} values but the table has {expected} columns")]
    ColumnMismatch { expected: usize, found: usize },
    #[error("Sink backend error: {0}")]
    Backend(String),
}

/// Bulk-insert target for one resource.
///
/// Rows are positional and match the schema's column order. The sink assigns
/// each stored row its own record number.
pub trait Sink: Send + Sync {
    fn set_schema<'a>(&'a self, schema: &'a TableSchema) -> BoxFuture<'a, Result<(), SinkError>>;

    fn schema(&self) -> BoxFuture<'_, Result<Option<TableSchema>, SinkError>>;

    /// Insert rows, returning how many were stored.
    fn store_multiple(&self, rows: Vec<Vec<String>>) -> BoxFuture<'_, Result<u64, SinkError>>;

    fn count(&self) -> BoxFuture<'_, Result<u64, SinkError>>;

    /// Whether the resource has already been fully imported.
    fn has_been_imported(&self) -> BoxFuture<'_, Result<bool, SinkError>>;

    /// Record that the import completed.
    fn mark_imported(&self) -> BoxFuture<'_, Result<(), SinkError>>;

    /// Remove all rows, the schema and the imported marker.
    fn drop_all(&self) -> BoxFuture<'_, Result<(), SinkError>>;
}

/// Hands out the sink for a resource.
pub trait SinkProvider: Send + Sync {
    fn sink_for(&self, resource: &ResourceDescriptor) -> Arc<dyn Sink>;
}
