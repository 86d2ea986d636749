//! In-process document store.
//!
//! Behaves like a single `CouchDB` node: revisions are `generation-hash`
//! tokens, stale writes are rejected, and indexes are declared through design
//! documents. Index freshness is configurable so tests can reproduce a
//! secondary index that trails the primary data.

use super::index::IndexDefinition;
use super::types::{Document, IndexKey, IndexRow, KeyRange, Revision, WriteOutcome};
use super::{DocumentStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;
use uuid::Uuid;

/// Materialized state of one index.
#[derive(Debug)]
struct IndexState {
    definition: IndexDefinition,
    /// Last materialized view; `None` until the first query.
    snapshot: Option<BTreeMap<IndexKey, String>>,
    queries_since_refresh: usize,
}

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, Document>,
    /// Keyed by `(design, name)`.
    indexes: HashMap<(String, String), IndexState>,
}

impl Inner {
    fn write(&mut self, mut doc: Document) -> Result<Revision, StoreError> {
        let current = self.docs.get(&doc.id).and_then(|stored| stored.rev.clone());
        if current != doc.rev {
            return Err(StoreError::Conflict(doc.id));
        }

        let generation = current.as_ref().map_or(0, Revision::generation) + 1;
        let rev = Revision::new(format!("{generation}-{}", Uuid::new_v4().simple()));
        doc.rev = Some(rev.clone());

        if doc.is_design() {
            self.register_indexes(&doc);
        }
        self.docs.insert(doc.id.clone(), doc);
        Ok(rev)
    }

    fn register_indexes(&mut self, design_doc: &Document) {
        for definition in IndexDefinition::from_document(design_doc) {
            let key = (definition.design.clone(), definition.name.clone());
            let unchanged = self
                .indexes
                .get(&key)
                .is_some_and(|state| state.definition == definition);
            if !unchanged {
                self.indexes.insert(
                    key,
                    IndexState {
                        definition,
                        snapshot: None,
                        queries_since_refresh: 0,
                    },
                );
            }
        }
    }
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    refresh_every: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store whose indexes are always current.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            refresh_every: 1,
        }
    }

    /// Create an empty store whose indexes are only rebuilt every `queries`
    /// queries, so writes in between are invisible to index readers.
    #[must_use]
    pub fn with_index_lag(queries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            refresh_every: queries.max(1),
        }
    }

    /// Number of stored documents, design documents included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().docs.len()
    }

    /// Whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().docs.is_empty()
    }

    /// Copy of every stored document, ordered by id.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.inner.lock().docs.values().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, doc: Document) -> StoreResult<Revision> {
        self.inner.lock().write(doc)
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        self.inner
            .lock()
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn bulk_write(&self, docs: Vec<Document>) -> StoreResult<Vec<WriteOutcome>> {
        let mut inner = self.inner.lock();
        let outcomes = docs
            .into_iter()
            .map(|doc| {
                let id = doc.id.clone();
                match inner.write(doc) {
                    Ok(rev) => WriteOutcome::Written { id, rev },
                    Err(StoreError::Conflict(_)) => WriteOutcome::Conflict { id },
                    Err(e) => WriteOutcome::Failed {
                        id,
                        reason: e.to_string(),
                    },
                }
            })
            .collect();
        drop(inner);
        Ok(outcomes)
    }

    async fn query_index(
        &self,
        index: &IndexDefinition,
        range: &KeyRange,
        limit: usize,
    ) -> StoreResult<Vec<IndexRow>> {
        let mut guard = self.inner.lock();
        let Inner { docs, indexes } = &mut *guard;

        let state = indexes
            .get_mut(&(index.design.clone(), index.name.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", index.design_id(), index.name)))?;

        let stale = state.queries_since_refresh >= self.refresh_every;
        if state.snapshot.is_none() || stale {
            let view: BTreeMap<IndexKey, String> = docs
                .values()
                .filter_map(|doc| state.definition.key_for(doc).map(|key| (key, doc.id.clone())))
                .collect();
            trace!(index = %state.definition.name, entries = view.len(), "rebuilt index snapshot");
            state.snapshot = Some(view);
            state.queries_since_refresh = 0;
        }
        state.queries_since_refresh += 1;

        let Some(snapshot) = &state.snapshot else {
            return Ok(Vec::new());
        };
        if range.start >= range.end {
            return Ok(Vec::new());
        }

        let rows = snapshot
            .range(range.start.clone()..range.end.clone())
            .filter_map(|(key, id)| {
                docs.get(id).map(|doc| IndexRow {
                    key: key.clone(),
                    id: id.clone(),
                    doc: doc.clone(),
                })
            })
            .take(limit)
            .collect();
        drop(guard);
        Ok(rows)
    }

    async fn scan_all(
        &self,
        start_key: Option<String>,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        let inner = self.inner.lock();
        let docs = match start_key {
            Some(start) => inner
                .docs
                .range(start..)
                .take(limit)
                .map(|(_, doc)| doc.clone())
                .collect(),
            None => inner.docs.values().take(limit).cloned().collect(),
        };
        drop(inner);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, state: &str) -> Document {
        Document::new(id)
            .set("type", "job")
            .set("state", state)
            .set("run", "r")
    }

    fn definition() -> IndexDefinition {
        IndexDefinition::new("job_queue", "available-jobs", "job", "available")
    }

    #[tokio::test]
    async fn test_put_rejects_stale_revision() {
        let store = MemoryStore::new();
        let first = store.put(Document::new("a")).await.unwrap();
        assert_eq!(first.generation(), 1);

        let mut update = Document::new("a");
        update.rev = Some(first.clone());
        let second = store.put(update.clone()).await.unwrap();
        assert_eq!(second.generation(), 2);

        let err = store.put(update).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == "a"));

        let err = store.put(Document::new("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bulk_write_reports_per_document() {
        let store = MemoryStore::new();
        store.put(Document::new("b")).await.unwrap();

        let outcomes = store
            .bulk_write(vec![Document::new("a"), Document::new("b"), Document::new("c")])
            .await
            .unwrap();

        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1], WriteOutcome::Conflict { id: "b".into() });
        assert!(outcomes[2].is_ok());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_query_undefined_index() {
        let store = MemoryStore::new();
        let err = store
            .query_index(&definition(), &KeyRange::whole_run("r"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_query_index_respects_range_and_limit() {
        let store = MemoryStore::new();
        store.put(definition().to_document()).await.unwrap();
        for id in ["01", "55", "a0", "ff"] {
            store.put(job(id, "available")).await.unwrap();
        }
        store.put(job("77", "done")).await.unwrap();

        let range = KeyRange::new(IndexKey::new("r", "5"), IndexKey::new("r", "z"));
        let rows = store.query_index(&definition(), &range, 2).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["55", "a0"]);

        let all = store
            .query_index(&definition(), &KeyRange::whole_run("r"), 100)
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_lagging_index_serves_stale_entries() {
        let store = MemoryStore::with_index_lag(3);
        store.put(definition().to_document()).await.unwrap();
        let rev = store.put(job("01", "available")).await.unwrap();

        let range = KeyRange::whole_run("r");
        assert_eq!(store.query_index(&definition(), &range, 10).await.unwrap().len(), 1);

        let mut done = job("01", "done");
        done.rev = Some(rev);
        store.put(done).await.unwrap();

        // Still listed, but the attached document is current.
        let rows = store.query_index(&definition(), &range, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc.get_str("state"), Some("done"));

        store.query_index(&definition(), &range, 10).await.unwrap();
        assert!(store.query_index(&definition(), &range, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_all_is_inclusive_of_start_key() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c", "d"] {
            store.put(Document::new(id)).await.unwrap();
        }
        let page = store.scan_all(Some("b".into()), 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let first = store.scan_all(None, 10).await.unwrap();
        assert_eq!(first.len(), 4);
    }
}
