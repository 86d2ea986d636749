//! Export of a run's job records into a table.
//!
//! Two passes over the collection: the first infers one column per scalar
//! field, the second writes one row per record. Nothing is created in the sink
//! unless the first pass succeeds.

pub mod schema;
pub mod sink;

pub use schema::{
    Cell, Column, ColumnType, DropReason, DroppedField, FieldType, InferredSchema,
    SchemaInference,
};
pub use sink::{SqliteSink, TableSink};

use crate::cursor::FullScanCursor;
use crate::jobs::JOB_KIND;
use crate::store::{Document, DocumentStore, StoreError};
use thiserror::Error;
use tracing::{debug, info};

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A field was seen with two incompatible types.
    #[error("field '{field}' has incompatible types {first} and {second}")]
    TypeAmbiguity {
        /// Field name.
        field: String,
        /// Type seen first.
        first: FieldType,
        /// Conflicting type.
        second: FieldType,
    },

    /// No field survived inference.
    #[error("no exportable columns")]
    NoColumns,

    /// Reading the collection failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The sink was used out of order or rejected its input.
    #[error("sink error: {0}")]
    Sink(String),

    /// `SQLite` error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What to export and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Run whose records are exported.
    pub run: String,
    /// Destination table.
    pub table: String,
    /// Scan window size.
    pub window: usize,
    /// Stop inference after this many matching records.
    pub scan_max: Option<usize>,
    /// Let integer and real values of one field share a real column.
    pub widen_numbers: bool,
}

impl ExportOptions {
    /// Export `run` into the `data` table.
    #[must_use]
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            table: "data".to_string(),
            window: 1000,
            scan_max: None,
            widen_numbers: false,
        }
    }

    /// Override the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Override the scan window.
    #[must_use]
    pub const fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Limit schema inference to the first `scan_max` matching records.
    #[must_use]
    pub const fn with_scan_max(mut self, scan_max: usize) -> Self {
        self.scan_max = Some(scan_max);
        self
    }

    /// Widen fields mixing integers and reals to a real column instead of
    /// rejecting them as ambiguous.
    #[must_use]
    pub const fn with_numeric_widening(mut self, widen: bool) -> Self {
        self.widen_numbers = widen;
        self
    }
}

/// Summary of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    /// Rows written.
    pub rows: usize,
    /// Columns of the table.
    pub columns: Vec<Column>,
    /// Fields left out.
    pub dropped: Vec<DroppedField>,
}

/// Copies job records of one run into a [`TableSink`].
pub struct Exporter<'a> {
    store: &'a dyn DocumentStore,
    options: ExportOptions,
}

impl<'a> Exporter<'a> {
    /// Exporter reading from `store`.
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore, options: ExportOptions) -> Self {
        Self { store, options }
    }

    fn matches(&self, doc: &Document) -> bool {
        doc.get_str("type") == Some(JOB_KIND) && doc.get_str("run") == Some(self.options.run.as_str())
    }

    /// First pass: infer the table schema.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::TypeAmbiguity`] on conflicting field types, or a
    /// store error.
    pub async fn infer_schema(&self) -> ExportResult<InferredSchema> {
        let mut cursor = FullScanCursor::new(self.store, self.options.window)?;
        let mut inference = SchemaInference::new().with_numeric_widening(self.options.widen_numbers);
        while let Some(doc) = cursor.next_document().await? {
            if !self.matches(&doc) {
                continue;
            }
            inference.observe(&doc)?;
            if self.options.scan_max.is_some_and(|max| inference.records() >= max) {
                debug!(records = inference.records(), "schema scan limit reached");
                break;
            }
        }
        let records = inference.records();
        let schema = inference.finish();
        info!(
            run = %self.options.run,
            records,
            columns = schema.columns.len(),
            dropped = schema.dropped.len(),
            "schema inferred"
        );
        Ok(schema)
    }

    /// Infer the schema, then write every matching record into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails, no column survives, or the store
    /// or sink fail.
    pub async fn export(&self, sink: &mut dyn TableSink) -> ExportResult<ExportReport> {
        let schema = self.infer_schema().await?;
        if schema.columns.is_empty() {
            return Err(ExportError::NoColumns);
        }
        sink.create_table(&self.options.table, &schema.columns).await?;

        let mut rows = 0;
        let mut cursor = FullScanCursor::new(self.store, self.options.window)?;
        while let Some(doc) = cursor.next_document().await? {
            if self.matches(&doc) {
                sink.insert_row(schema.row(&doc)).await?;
                rows += 1;
            }
        }
        sink.commit().await?;

        info!(run = %self.options.run, table = %self.options.table, rows, "export complete");
        Ok(ExportReport {
            rows,
            columns: schema.columns,
            dropped: schema.dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn store_with(records: &[(&str, &str, serde_json::Value)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (id, run, body) in records {
            let mut doc = Document::with_fields(*id, body.as_object().cloned().unwrap_or_default());
            doc = doc.set("type", "job").set("run", *run);
            store.put(doc).await.unwrap();
        }
        store.put(Document::new("other").set("x", "text")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_only_matching_run_is_inferred() {
        let store = store_with(&[
            ("a", "r1", json!({"x": 1})),
            ("b", "r2", json!({"x": "not an int"})),
        ])
        .await;
        let schema = Exporter::new(&store, ExportOptions::new("r1"))
            .infer_schema()
            .await
            .unwrap();
        let names: Vec<_> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["_id", "run", "x"]);
    }

    #[tokio::test]
    async fn test_scan_max_limits_inference() {
        let store = store_with(&[("a", "r", json!({"x": 1})), ("b", "r", json!({"x": "s"}))]).await;
        let exporter = Exporter::new(&store, ExportOptions::new("r").with_scan_max(1));
        assert!(exporter.infer_schema().await.is_ok());

        let full = Exporter::new(&store, ExportOptions::new("r"));
        assert!(matches!(
            full.infer_schema().await,
            Err(ExportError::TypeAmbiguity { .. })
        ));
    }

    #[tokio::test]
    async fn test_export_writes_one_row_per_record() {
        let store = store_with(&[
            ("a", "r", json!({"x": 1, "y": 2.0})),
            ("b", "r", json!({"x": 2})),
            ("c", "q", json!({"x": 3})),
        ])
        .await;
        let mut sink = SqliteSink::in_memory().await.unwrap();
        let report = Exporter::new(&store, ExportOptions::new("r").with_window(1))
            .export(&mut sink)
            .await
            .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.columns.len(), 4);
    }

    #[tokio::test]
    async fn test_mixed_numbers_need_widening() {
        let store = store_with(&[("a", "r", json!({"x": 1})), ("b", "r", json!({"x": 1.5}))]).await;
        let strict = Exporter::new(&store, ExportOptions::new("r"));
        assert!(matches!(
            strict.infer_schema().await,
            Err(ExportError::TypeAmbiguity { first: FieldType::Integer, second: FieldType::Real, .. })
        ));

        let widened = Exporter::new(&store, ExportOptions::new("r").with_numeric_widening(true));
        let schema = widened.infer_schema().await.unwrap();
        assert_eq!(schema.column("x").unwrap().column_type, ColumnType::Real);
    }
}
