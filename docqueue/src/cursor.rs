//! Windowed scan over every document of a collection.
//!
//! Listing a large collection in one request is not safe, so the scan reads
//! fixed-size windows ordered by id. Each window after the first starts at the
//! last id already returned (the list API's start key is inclusive), so that
//! boundary document reappears at the head of the window and is skipped.

use crate::store::{Document, DocumentStore, StoreError, StoreResult};
use futures_util::stream::{self, Stream};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use tracing::trace;

/// Pull-based iterator over every document, in id order.
///
/// Holds at most one window of documents in memory.
pub struct FullScanCursor<'a> {
    store: &'a dyn DocumentStore,
    window: NonZeroUsize,
    /// Id of the last document handed out.
    boundary: Option<String>,
    buffer: VecDeque<Document>,
    exhausted: bool,
}

impl<'a> FullScanCursor<'a> {
    /// Scan from the start of the keyspace, `window` documents at a time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRequest`] if `window` is zero.
    pub fn new(store: &'a dyn DocumentStore, window: usize) -> StoreResult<Self> {
        let window = NonZeroUsize::new(window)
            .ok_or_else(|| StoreError::InvalidRequest("scan window must be positive".into()))?;
        Ok(Self {
            store,
            window,
            boundary: None,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Continue a scan after a previously returned id.
    #[must_use]
    pub fn resume_after(mut self, id: impl Into<String>) -> Self {
        self.boundary = Some(id.into());
        self.buffer.clear();
        self.exhausted = false;
        self
    }

    /// Id of the last document returned, usable with [`resume_after`](Self::resume_after).
    #[must_use]
    pub fn last_seen(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// Next document, or `None` once the collection is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a window cannot be read. The cursor can be
    /// polled again afterwards.
    pub async fn next_document(&mut self) -> StoreResult<Option<Document>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        let next = self.buffer.pop_front();
        if let Some(doc) = &next {
            self.boundary = Some(doc.id.clone());
        }
        Ok(next)
    }

    async fn fill(&mut self) -> StoreResult<()> {
        let (start, limit) = match &self.boundary {
            // One extra row covers the repeated boundary document.
            Some(id) => (Some(id.clone()), self.window.get() + 1),
            None => (None, self.window.get()),
        };
        let mut page: VecDeque<Document> = self.store.scan_all(start, limit).await?.into();

        if let (Some(boundary), Some(first)) = (&self.boundary, page.front()) {
            if &first.id == boundary {
                page.pop_front();
            }
        }
        trace!(boundary = ?self.boundary, fetched = page.len(), "scan window read");

        if page.is_empty() {
            self.exhausted = true;
        }
        self.buffer = page;
        Ok(())
    }

    /// Turn the cursor into a stream of documents.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = StoreResult<Document>> + 'a {
        stream::try_unfold(self, |mut cursor| async move {
            Ok::<_, StoreError>(cursor.next_document().await?.map(|doc| (doc, cursor)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures_util::TryStreamExt;

    async fn seeded(ids: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for id in ids {
            store.put(Document::new(*id)).await.unwrap();
        }
        store
    }

    async fn collect(cursor: &mut FullScanCursor<'_>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(doc) = cursor.next_document().await.unwrap() {
            ids.push(doc.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_window_of_one() {
        let store = seeded(&["a", "b", "c"]).await;
        let mut cursor = FullScanCursor::new(&store, 1).unwrap();
        assert_eq!(collect(&mut cursor).await, vec!["a", "b", "c"]);
        assert_eq!(cursor.last_seen(), Some("c"));
    }

    #[tokio::test]
    async fn test_zero_window_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            FullScanCursor::new(&store, 0),
            Err(StoreError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let store = MemoryStore::new();
        let mut cursor = FullScanCursor::new(&store, 10).unwrap();
        assert!(cursor.next_document().await.unwrap().is_none());
        assert!(cursor.next_document().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_after() {
        let store = seeded(&["a", "b", "c", "d"]).await;
        let mut cursor = FullScanCursor::new(&store, 2).unwrap().resume_after("b");
        assert_eq!(collect(&mut cursor).await, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_deleted_boundary_does_not_drop_successor() {
        let store = seeded(&["b", "c"]).await;
        // "a" is not stored, so nothing at the head of the window is skipped.
        let mut cursor = FullScanCursor::new(&store, 5).unwrap().resume_after("a");
        assert_eq!(collect(&mut cursor).await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_stream() {
        let store = seeded(&["x", "y", "z"]).await;
        let docs: Vec<Document> = FullScanCursor::new(&store, 2)
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(docs.len(), 3);
    }
}
