//! Integration tests for exporting a run to `SQLite`.

use docqueue::export::{ExportError, ExportOptions, Exporter, SqliteSink};
use docqueue::store::{Document, DocumentStore, MemoryStore};
use serde_json::{json, Value};

async fn job(store: &MemoryStore, id: &str, run: &str, body: Value) {
    let doc = Document::with_fields(id, body.as_object().cloned().unwrap_or_default())
        .set("type", "job")
        .set("run", run);
    store.put(doc).await.unwrap();
}

async fn table_count(sink: &SqliteSink) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
        .fetch_one(sink.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ambiguous_field_creates_nothing() {
    let store = MemoryStore::new();
    job(&store, "a", "r", json!({"x": 1})).await;
    job(&store, "b", "r", json!({"x": "one"})).await;

    let mut sink = SqliteSink::in_memory().await.unwrap();
    let err = Exporter::new(&store, ExportOptions::new("r"))
        .export(&mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::TypeAmbiguity { ref field, .. } if field == "x"));
    assert_eq!(table_count(&sink).await, 0);
}

#[tokio::test]
async fn test_missing_field_becomes_null() {
    let store = MemoryStore::new();
    job(&store, "a", "r", json!({"x": 1.5, "y": "p"})).await;
    job(&store, "b", "r", json!({"x": 2.5})).await;
    job(&store, "c", "r", json!({"x": 3.5, "y": "q", "tags": ["t"]})).await;

    let mut sink = SqliteSink::in_memory().await.unwrap();
    let report = Exporter::new(&store, ExportOptions::new("r").with_window(2))
        .export(&mut sink)
        .await
        .unwrap();

    assert_eq!(report.rows, 3);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].name, "tags");

    let rows: Vec<(String, Option<f64>, Option<String>)> =
        sqlx::query_as("SELECT _id, x, y FROM data ORDER BY _id")
            .fetch_all(sink.pool())
            .await
            .unwrap();
    assert_eq!(
        rows,
        vec![
            ("a".into(), Some(1.5), Some("p".into())),
            ("b".into(), Some(2.5), None),
            ("c".into(), Some(3.5), Some("q".into())),
        ]
    );
}

#[tokio::test]
async fn test_mixed_integer_and_real_field() {
    let store = MemoryStore::new();
    job(&store, "a", "r", json!({"x": 1})).await;
    job(&store, "b", "r", json!({"x": 3.5})).await;

    let mut strict = SqliteSink::in_memory().await.unwrap();
    let err = Exporter::new(&store, ExportOptions::new("r"))
        .export(&mut strict)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::TypeAmbiguity { ref field, .. } if field == "x"));
    assert_eq!(table_count(&strict).await, 0);

    let mut sink = SqliteSink::in_memory().await.unwrap();
    Exporter::new(&store, ExportOptions::new("r").with_numeric_widening(true))
        .export(&mut sink)
        .await
        .unwrap();
    let xs: Vec<f64> = sqlx::query_scalar("SELECT x FROM data ORDER BY _id")
        .fetch_all(sink.pool())
        .await
        .unwrap();
    assert_eq!(xs, vec![1.0, 3.5]);
}

#[tokio::test]
async fn test_run_without_records_has_no_columns() {
    let store = MemoryStore::new();
    job(&store, "a", "other", json!({"x": 1})).await;

    let mut sink = SqliteSink::in_memory().await.unwrap();
    let err = Exporter::new(&store, ExportOptions::new("r"))
        .export(&mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::NoColumns));
}

#[tokio::test]
async fn test_export_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.sqlite");

    let store = MemoryStore::new();
    for n in 0..25 {
        job(&store, &format!("{n:03}"), "r", json!({"n": n, "ok": n % 2 == 0})).await;
    }

    let mut sink = SqliteSink::open(&path).await.unwrap();
    let report = Exporter::new(&store, ExportOptions::new("r").with_table("results"))
        .export(&mut sink)
        .await
        .unwrap();
    assert_eq!(report.rows, 25);
    drop(sink);

    let reopened = SqliteSink::open(&path).await.unwrap();
    let even: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE ok = 1")
        .fetch_one(reopened.pool())
        .await
        .unwrap();
    assert_eq!(even, 13);
}
