//! Tabular destinations for exported records.

use super::schema::{Cell, Column};
use super::{ExportError, ExportResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a write waits for a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A destination that accepts one table of fixed-width rows.
#[async_trait]
pub trait TableSink: Send {
    /// Create the table. Called once, before any row.
    async fn create_table(&mut self, table: &str, columns: &[Column]) -> ExportResult<()>;

    /// Append one row with one cell per column.
    async fn insert_row(&mut self, row: Vec<Cell>) -> ExportResult<()>;

    /// Make everything written so far durable.
    async fn commit(&mut self) -> ExportResult<()>;
}

/// Double embedded quotes and wrap in quotes.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// [`TableSink`] writing into a `SQLite` database.
///
/// Everything between [`create_table`](TableSink::create_table) and
/// [`commit`](TableSink::commit) runs in one transaction.
pub struct SqliteSink {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    insert_sql: Option<String>,
}

impl SqliteSink {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: &Path) -> ExportResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        debug!(path = %path.display(), "opened export database");
        Ok(Self::from_pool(pool))
    }

    /// Private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot be initialized.
    pub async fn in_memory() -> ExportResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            tx: None,
            insert_sql: None,
        }
    }

    /// Pool the sink writes through.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn transaction(&mut self) -> ExportResult<&mut Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| ExportError::Sink("no table has been created".to_string()))
    }
}

#[async_trait]
impl TableSink for SqliteSink {
    async fn create_table(&mut self, table: &str, columns: &[Column]) -> ExportResult<()> {
        if table.is_empty() {
            return Err(ExportError::Sink("table name is empty".to_string()));
        }
        if columns.is_empty() {
            return Err(ExportError::NoColumns);
        }

        let table = quote_identifier(table);
        let definitions = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let names = columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("CREATE TABLE {table} ({definitions})"))
            .execute(&mut *tx)
            .await?;
        self.tx = Some(tx);
        self.insert_sql = Some(format!("INSERT INTO {table} ({names}) VALUES ({placeholders})"));
        Ok(())
    }

    async fn insert_row(&mut self, row: Vec<Cell>) -> ExportResult<()> {
        let sql = self
            .insert_sql
            .clone()
            .ok_or_else(|| ExportError::Sink("no table has been created".to_string()))?;
        let mut query = sqlx::query(&sql);
        for cell in row {
            query = match cell {
                Cell::Null => query.bind(None::<String>),
                Cell::Text(s) => query.bind(s),
                Cell::Integer(i) => query.bind(i),
                Cell::Real(r) => query.bind(r),
            };
        }
        query.execute(&mut **self.transaction()?).await?;
        Ok(())
    }

    async fn commit(&mut self) -> ExportResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::schema::ColumnType;

    fn columns() -> Vec<Column> {
        vec![
            Column {
                name: "name".into(),
                column_type: ColumnType::Text,
            },
            Column {
                name: "n".into(),
                column_type: ColumnType::Integer,
            },
        ]
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_rows_visible_after_commit() {
        let mut sink = SqliteSink::in_memory().await.unwrap();
        sink.create_table("data", &columns()).await.unwrap();
        sink.insert_row(vec![Cell::Text("a".into()), Cell::Integer(1)])
            .await
            .unwrap();
        sink.insert_row(vec![Cell::Text("b".into()), Cell::Null])
            .await
            .unwrap();
        sink.commit().await.unwrap();

        let rows: Vec<(String, Option<i64>)> =
            sqlx::query_as("SELECT name, n FROM data ORDER BY name")
                .fetch_all(sink.pool())
                .await
                .unwrap();
        assert_eq!(rows, vec![("a".into(), Some(1)), ("b".into(), None)]);
    }

    #[tokio::test]
    async fn test_insert_before_create_fails() {
        let mut sink = SqliteSink::in_memory().await.unwrap();
        assert!(sink.insert_row(vec![Cell::Null]).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_empty_schema() {
        let mut sink = SqliteSink::in_memory().await.unwrap();
        assert!(matches!(
            sink.create_table("data", &[]).await,
            Err(ExportError::NoColumns)
        ));
    }
}
