//! Per-resource datastore tables: the sink imported rows land in.

use std::sync::Arc;

use queue_core::{BoxFuture, ResourceDescriptor, Sink, SinkError, SinkProvider, TableSchema};
use serde::{Deserialize, Serialize};

use crate::schema::datastore_table_schema;
use crate::{Database, DbError};

/// Stored row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RowRecord {
    record_number: i64,
    cells: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetaRecord {
    #[serde(default)]
    table_schema: TableSchema,
    #[serde(default)]
    next_record: i64,
    #[serde(default)]
    imported: bool,
}

#[derive(Deserialize)]
struct CountResult {
    count: i64,
}

/// Shape of a datastore table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub num_columns: usize,
    pub columns: Vec<String>,
    pub num_rows: u64,
}

/// Rows of one resource, stored in `datastore_<job id>`.
///
/// Record numbers are handed out from a counter kept in `datastore_meta`, so
/// they are unique within the table but not necessarily contiguous.
#[derive(Clone)]
pub struct DatastoreTable {
    db: Database,
    table: String,
}

impl DatastoreTable {
    pub fn new(db: Database, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    /// The table holding `resource`'s rows.
    pub fn for_resource(db: Database, resource: &ResourceDescriptor) -> Self {
        Self::new(db, Self::table_name_for(resource))
    }

    /// `datastore_` followed by the MD5 of the resource's unique identifier.
    pub fn table_name_for(resource: &ResourceDescriptor) -> String {
        format!("datastore_{}", resource.job_id())
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    async fn meta(&self) -> Result<Option<MetaRecord>, DbError> {
        let record: Option<MetaRecord> = self
            .db
            .select(("datastore_meta", self.table.as_str()))
            .await?;
        Ok(record)
    }

    /// The column layout, or `None` before a schema was set.
    pub async fn get_schema(&self) -> Result<Option<TableSchema>, DbError> {
        Ok(self
            .meta()
            .await?
            .map(|m| m.table_schema)
            .filter(|s| !s.fields.is_empty()))
    }

    /// Define the row table and remember its columns.
    pub async fn put_schema(&self, schema: &TableSchema) -> Result<(), DbError> {
        self.db
            .query(datastore_table_schema(&self.table))
            .await?
            .check()?;

        self.db
            .query("UPSERT type::thing('datastore_meta', $table) MERGE { table_schema: $schema } RETURN NONE")
            .bind(("table", self.table.clone()))
            .bind(("schema", schema.clone()))
            .await?
            .check()?;

        tracing::debug!(table = %self.table, columns = schema.fields.len(), "Datastore schema set");
        Ok(())
    }

    /// Insert rows, numbering them from the table's counter.
    pub async fn insert_rows(&self, rows: Vec<Vec<String>>) -> Result<u64, SinkError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let schema = self.get_schema().await?.ok_or(SinkError::SchemaNotSet)?;
        let expected = schema.fields.len();
        if let Some(bad) = rows.iter().find(|row| row.len() != expected) {
            return Err(SinkError::ColumnMismatch {
                expected,
                found: bad.len(),
            });
        }

        let start = self.reserve(rows.len() as i64).await?;
        let records: Vec<RowRecord> = rows
            .into_iter()
            .enumerate()
            .map(|(offset, cells)| RowRecord {
                record_number: start + offset as i64 + 1,
                cells,
            })
            .collect();
        let stored = records.len() as u64;

        self.db
            .query(
                "BEGIN TRANSACTION; FOR $row IN $rows { CREATE type::table($table) CONTENT $row RETURN NONE; }; COMMIT TRANSACTION;",
            )
            .bind(("table", self.table.clone()))
            .bind(("rows", records))
            .await
            .and_then(|response| response.check())
            .map_err(DbError::from)?;

        Ok(stored)
    }

    /// Advance the record counter by `n`, returning its previous value.
    async fn reserve(&self, n: i64) -> Result<i64, DbError> {
        let mut result = self
            .db
            .query("UPSERT type::thing('datastore_meta', $table) SET next_record += $n RETURN AFTER")
            .bind(("table", self.table.clone()))
            .bind(("n", n))
            .await?;

        let after: Vec<MetaRecord> = result.take(0)?;
        let next = after
            .first()
            .map(|m| m.next_record)
            .ok_or_else(|| DbError::Query(format!("No record counter for {}", self.table)))?;
        Ok(next - n)
    }

    /// Number of stored rows.
    pub async fn row_count(&self) -> Result<u64, DbError> {
        let mut result = self
            .db
            .query("SELECT count() FROM type::table($table) GROUP ALL")
            .bind(("table", self.table.clone()))
            .await?;

        let counts: Vec<CountResult> = result.take(0)?;
        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }

    /// All rows ordered by record number.
    pub async fn retrieve_all(&self) -> Result<Vec<(i64, Vec<String>)>, DbError> {
        let mut result = self
            .db
            .query("SELECT record_number, cells FROM type::table($table) ORDER BY record_number ASC")
            .bind(("table", self.table.clone()))
            .await?;

        let rows: Vec<RowRecord> = result.take(0)?;
        Ok(rows.into_iter().map(|r| (r.record_number, r.cells)).collect())
    }

    pub async fn summary(&self) -> Result<TableSummary, DbError> {
        let columns = self
            .get_schema()
            .await?
            .map(|s| s.column_names())
            .unwrap_or_default();
        let num_rows = if columns.is_empty() {
            0
        } else {
            self.row_count().await?
        };

        Ok(TableSummary {
            num_columns: columns.len(),
            columns,
            num_rows,
        })
    }

    pub async fn is_imported(&self) -> Result<bool, DbError> {
        Ok(self.meta().await?.is_some_and(|m| m.imported))
    }

    pub async fn set_imported(&self) -> Result<(), DbError> {
        self.db
            .query("UPSERT type::thing('datastore_meta', $table) SET imported = true RETURN NONE")
            .bind(("table", self.table.clone()))
            .await?
            .check()?;
        Ok(())
    }

    /// Drop the rows, the table definition and the bookkeeping.
    pub async fn destroy(&self) -> Result<(), DbError> {
        self.db
            .query(format!("REMOVE TABLE IF EXISTS {};", self.table))
            .await?
            .check()?;
        let _: Option<MetaRecord> = self
            .db
            .delete(("datastore_meta", self.table.as_str()))
            .await?;

        tracing::info!(table = %self.table, "Datastore table dropped");
        Ok(())
    }
}

impl From<DbError> for SinkError {
    fn from(err: DbError) -> Self {
        SinkError::Backend(err.to_string())
    }
}

impl Sink for DatastoreTable {
    fn set_schema<'a>(&'a self, schema: &'a TableSchema) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move { Ok(self.put_schema(schema).await?) })
    }

    fn schema(&self) -> BoxFuture<'_, Result<Option<TableSchema>, SinkError>> {
        Box::pin(async move { Ok(self.get_schema().await?) })
    }

    fn store_multiple(&self, rows: Vec<Vec<String>>) -> BoxFuture<'_, Result<u64, SinkError>> {
        Box::pin(self.insert_rows(rows))
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, SinkError>> {
        Box::pin(async move { Ok(self.row_count().await?) })
    }

    fn has_been_imported(&self) -> BoxFuture<'_, Result<bool, SinkError>> {
        Box::pin(async move { Ok(self.is_imported().await?) })
    }

    fn mark_imported(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move { Ok(self.set_imported().await?) })
    }

    fn drop_all(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move { Ok(self.destroy().await?) })
    }
}

/// Hands out a [`DatastoreTable`] per resource on one connection.
#[derive(Clone)]
pub struct DatastoreTables {
    db: Database,
}

impl DatastoreTables {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn table(&self, resource: &ResourceDescriptor) -> DatastoreTable {
        DatastoreTable::for_resource(self.db.clone(), resource)
    }
}

impl SinkProvider for DatastoreTables {
    fn sink_for(&self, resource: &ResourceDescriptor) -> Arc<dyn Sink> {
        Arc::new(self.table(resource))
    }
}
