//! Document store abstraction.
//!
//! The queue never talks to a database directly. Everything goes through
//! [`DocumentStore`], a small contract that any replicated document store with
//! per-document optimistic versioning and a range-queryable secondary index can
//! satisfy:
//!
//! - Every write presents the revision it expects to replace; a stale revision
//!   is rejected with [`StoreError::Conflict`] instead of overwriting.
//! - Bulk writes are evaluated per document and report one [`WriteOutcome`]
//!   per input, in input order.
//! - Index queries may lag behind writes. Callers must tolerate both missing
//!   and outdated matches.
//!
//! Two backends ship with the crate: [`MemoryStore`] for tests and local runs,
//! and [`CouchStore`] for `CouchDB` over HTTP.

mod couch;
mod index;
mod memory;
mod types;

pub use couch::CouchStore;
pub use index::IndexDefinition;
pub use memory::MemoryStore;
pub use types::{
    Document, IndexKey, IndexRow, KeyRange, Revision, WriteOutcome, MAX_ID_SENTINEL,
};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The presented revision does not match the stored one.
    #[error("version conflict on document {0}")]
    Conflict(String),

    /// No document with this id exists.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A conflict-retry loop gave up.
    #[error("gave up on document {id} after {attempts} conflicting writes")]
    RetryExhausted {
        /// Document id.
        id: String,
        /// Number of write attempts made.
        attempts: u32,
    },

    /// The request was rejected before reaching the store.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with something we could not interpret.
    #[error("unexpected response from store ({status}): {body}")]
    Unexpected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Contract required of the underlying document store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write one document.
    ///
    /// `doc.rev` is the revision being replaced, `None` for a new document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the revision is stale.
    async fn put(&self, doc: Document) -> StoreResult<Revision>;

    /// Read one document, including its current revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such document exists.
    async fn get(&self, id: &str) -> StoreResult<Document>;

    /// Write many documents. Each is evaluated independently.
    ///
    /// # Errors
    ///
    /// Only transport-level failures are errors; per-document rejections are
    /// reported in the returned outcomes, one per input, in input order.
    async fn bulk_write(&self, docs: Vec<Document>) -> StoreResult<Vec<WriteOutcome>>;

    /// Query an index over the half-open `range`, returning at most `limit`
    /// rows ordered by key, each with its current document attached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the index has not been defined.
    async fn query_index(
        &self,
        index: &IndexDefinition,
        range: &KeyRange,
        limit: usize,
    ) -> StoreResult<Vec<IndexRow>>;

    /// Return up to `limit` documents ordered by id, starting at `start_key`
    /// inclusive (or at the beginning of the keyspace).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn scan_all(&self, start_key: Option<String>, limit: usize)
        -> StoreResult<Vec<Document>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn put(&self, doc: Document) -> StoreResult<Revision> {
        (**self).put(doc).await
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        (**self).get(id).await
    }

    async fn bulk_write(&self, docs: Vec<Document>) -> StoreResult<Vec<WriteOutcome>> {
        (**self).bulk_write(docs).await
    }

    async fn query_index(
        &self,
        index: &IndexDefinition,
        range: &KeyRange,
        limit: usize,
    ) -> StoreResult<Vec<IndexRow>> {
        (**self).query_index(index, range, limit).await
    }

    async fn scan_all(
        &self,
        start_key: Option<String>,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        (**self).scan_all(start_key, limit).await
    }
}
