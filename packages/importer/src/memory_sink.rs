//! In-process sink for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use queue_core::{BoxFuture, ResourceDescriptor, Sink, SinkError, SinkProvider, TableSchema};

#[derive(Debug, Default)]
struct Table {
    schema: Option<TableSchema>,
    rows: Vec<(u64, Vec<String>)>,
    next_record: u64,
    imported: bool,
}

/// Sink holding its rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    table: Mutex<Table>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored rows with their record numbers.
    pub fn rows(&self) -> Vec<(u64, Vec<String>)> {
        self.table().rows.clone()
    }

    pub fn current_schema(&self) -> Option<TableSchema> {
        self.table().schema.clone()
    }
}

impl Sink for MemorySink {
    fn set_schema<'a>(&'a self, schema: &'a TableSchema) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.table().schema = Some(schema.clone());
            Ok(())
        })
    }

    fn schema(&self) -> BoxFuture<'_, Result<Option<TableSchema>, SinkError>> {
        Box::pin(async move { Ok(self.current_schema()) })
    }

    fn store_multiple(&self, rows: Vec<Vec<String>>) -> BoxFuture<'_, Result<u64, SinkError>> {
        Box::pin(async move {
            let mut table = self.table();
            let expected = table.schema.as_ref().ok_or(SinkError::SchemaNotSet)?.fields.len();
            if let Some(bad) = rows.iter().find(|row| row.len() != expected) {
                return Err(SinkError::ColumnMismatch {
                    expected,
                    found: bad.len(),
                });
            }

            let stored = rows.len() as u64;
            for row in rows {
                table.next_record += 1;
                let number = table.next_record;
                table.rows.push((number, row));
            }
            Ok(stored)
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, SinkError>> {
        Box::pin(async move { Ok(self.table().rows.len() as u64) })
    }

    fn has_been_imported(&self) -> BoxFuture<'_, Result<bool, SinkError>> {
        Box::pin(async move { Ok(self.table().imported) })
    }

    fn mark_imported(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.table().imported = true;
            Ok(())
        })
    }

    fn drop_all(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            *self.table() = Table::default();
            Ok(())
        })
    }
}

/// One [`MemorySink`] per resource, created on first use.
#[derive(Default)]
pub struct MemorySinks {
    sinks: Mutex<HashMap<String, Arc<MemorySink>>>,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sink for `resource`, typed for inspection.
    pub fn get(&self, resource: &ResourceDescriptor) -> Arc<MemorySink> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(resource.unique_identifier())
            .or_default()
            .clone()
    }
}

impl SinkProvider for MemorySinks {
    fn sink_for(&self, resource: &ResourceDescriptor) -> Arc<dyn Sink> {
        self.get(resource)
    }
}
