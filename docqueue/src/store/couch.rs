//! `CouchDB` backend over the HTTP API.

use super::index::IndexDefinition;
use super::types::{Document, IndexKey, IndexRow, KeyRange, Revision, WriteOutcome};
use super::{DocumentStore, StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Reply to a single-document write.
#[derive(Debug, Deserialize)]
struct PutReply {
    rev: Revision,
}

/// One entry of a `_bulk_docs` reply.
#[derive(Debug, Deserialize)]
struct BulkReply {
    id: String,
    #[serde(default)]
    rev: Option<Revision>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewReply {
    rows: Vec<ViewRow>,
}

#[derive(Debug, Deserialize)]
struct ViewRow {
    id: String,
    #[serde(default)]
    key: Option<IndexKey>,
    #[serde(default)]
    doc: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct AllDocsReply {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    #[serde(default)]
    doc: Option<Document>,
}

/// [`DocumentStore`] backed by one `CouchDB` database.
#[derive(Debug, Clone)]
pub struct CouchStore {
    client: Client,
    endpoint: Url,
    database: String,
}

impl CouchStore {
    /// Connect to `database` on the server at `endpoint`.
    ///
    /// No request is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid base URL or the HTTP
    /// client cannot be built.
    pub fn new(endpoint: &str, database: &str, connect_timeout: Duration) -> StoreResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StoreError::InvalidRequest(format!("invalid endpoint '{endpoint}': {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::InvalidRequest(format!(
                "endpoint '{endpoint}' cannot be used as a base URL"
            )));
        }
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            database: database.to_string(),
        })
    }

    /// Name of the database this store writes to.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// URL of `segments` below the database root.
    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::InvalidRequest(format!("bad endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .push(&self.database)
            .extend(segments);
        Ok(url)
    }

    /// URL of a document. Design documents keep their literal slash.
    fn doc_url(&self, id: &str) -> StoreResult<Url> {
        match id.strip_prefix("_design/") {
            Some(name) => self.url(&["_design", name]),
            None => self.url(&[id]),
        }
    }

    async fn unexpected(response: Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::Unexpected { status, body }
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn put(&self, doc: Document) -> StoreResult<Revision> {
        let response = self.client.put(self.doc_url(&doc.id)?).json(&doc).send().await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => Ok(response.json::<PutReply>().await?.rev),
            StatusCode::CONFLICT => Err(StoreError::Conflict(doc.id)),
            _ => Err(Self::unexpected(response).await),
        }
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        let response = self.client.get(self.doc_url(id)?).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id.to_string())),
            _ => Err(Self::unexpected(response).await),
        }
    }

    async fn bulk_write(&self, docs: Vec<Document>) -> StoreResult<Vec<WriteOutcome>> {
        let submitted = docs.len();
        let response = self
            .client
            .post(self.url(&["_bulk_docs"])?)
            .json(&json!({ "docs": docs }))
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            return Err(Self::unexpected(response).await);
        }

        let replies: Vec<BulkReply> = response.json().await?;
        debug!(submitted, replies = replies.len(), "bulk write answered");
        Ok(replies
            .into_iter()
            .map(|reply| match (reply.rev, reply.error) {
                (Some(rev), None) => WriteOutcome::Written { id: reply.id, rev },
                (_, Some(error)) if error == "conflict" => WriteOutcome::Conflict { id: reply.id },
                (_, error) => WriteOutcome::Failed {
                    id: reply.id,
                    reason: reply
                        .reason
                        .or(error)
                        .unwrap_or_else(|| "no revision returned".to_string()),
                },
            })
            .collect())
    }

    async fn query_index(
        &self,
        index: &IndexDefinition,
        range: &KeyRange,
        limit: usize,
    ) -> StoreResult<Vec<IndexRow>> {
        let url = self.url(&["_design", &index.design, "_view", &index.name])?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("include_docs", "true".to_string()),
                ("limit", limit.to_string()),
                ("startkey", serde_json::to_string(&range.start)?),
                ("endkey", serde_json::to_string(&range.end)?),
                ("inclusive_end", "false".to_string()),
            ])
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(StoreError::NotFound(index.design_id())),
            _ => return Err(Self::unexpected(response).await),
        }

        let reply: ViewReply = response.json().await?;
        Ok(reply
            .rows
            .into_iter()
            .filter_map(|row| {
                Some(IndexRow {
                    key: row.key?,
                    id: row.id,
                    doc: row.doc?,
                })
            })
            .collect())
    }

    async fn scan_all(
        &self,
        start_key: Option<String>,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        let mut params = vec![
            ("include_docs", "true".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(start) = start_key {
            params.push(("startkey", serde_json::to_string(&start)?));
        }

        let response = self
            .client
            .get(self.url(&["_all_docs"])?)
            .query(&params)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(Self::unexpected(response).await);
        }

        let reply: AllDocsReply = response.json().await?;
        Ok(reply.rows.into_iter().filter_map(|row| row.doc).collect())
    }
}
