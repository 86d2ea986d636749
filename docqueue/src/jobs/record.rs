//! Job records as stored in the collection.

use super::{JobError, JobId, JobResult, WorkerIdentity};
use crate::store::{Document, IndexDefinition, Revision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Value of the `type` field marking a job record.
pub const JOB_KIND: &str = "job";

/// Design document holding the job index.
pub const INDEX_DESIGN: &str = "job_queue";

/// Name of the available-jobs index.
pub const INDEX_NAME: &str = "available-jobs";

/// Keys owned by the record itself. Extensions, parameters and results may
/// not use them.
pub const RESERVED_FIELDS: &[&str] = &[
    "_id",
    "_rev",
    "type",
    "state",
    "run",
    "created_at",
    "payload",
    "started_at",
    "finished_at",
    "worker",
];

/// Index emitting `(run, id)` for every available job record.
#[must_use]
pub fn job_queue_index() -> IndexDefinition {
    IndexDefinition::new(INDEX_DESIGN, INDEX_NAME, JOB_KIND, JobState::Available.as_str())
}

/// Lifecycle state. Only ever moves from `Available` to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed.
    Available,
    /// Executed and committed.
    Done,
}

impl JobState {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constant `type` marker. Deserializing anything else fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum RecordKind {
    #[default]
    #[serde(rename = "job")]
    Job,
}

/// Scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    /// Boolean.
    Boolean(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// Text.
    Text(String),
}

impl From<bool> for ExtensionValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for ExtensionValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for ExtensionValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<f64> for ExtensionValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for ExtensionValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for ExtensionValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<ExtensionValue> for Value {
    fn from(v: ExtensionValue) -> Self {
        match v {
            ExtensionValue::Boolean(b) => Self::Bool(b),
            ExtensionValue::Integer(i) => Self::from(i),
            ExtensionValue::Real(r) => Self::from(r),
            ExtensionValue::Text(s) => Self::String(s),
        }
    }
}

/// Caller-supplied metadata merged into every record of an enqueue call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions(BTreeMap<String, ExtensionValue>);

impl Extensions {
    /// No metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, returning the map for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Add or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtensionValue)> {
        self.0.iter()
    }

    /// Check every key against the record schema.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidExtension`] for an empty key, a reserved
    /// key, or a non-finite real.
    pub fn validate(&self) -> JobResult<()> {
        for (key, value) in &self.0 {
            let reason = if key.is_empty() {
                Some("key is empty")
            } else if RESERVED_FIELDS.contains(&key.as_str()) {
                Some("key is reserved for the job record")
            } else if matches!(value, ExtensionValue::Real(r) if !r.is_finite()) {
                Some("real value is not finite")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(JobError::InvalidExtension {
                    key: key.clone(),
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// One unit of work and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Record id.
    #[serde(rename = "_id")]
    pub id: JobId,

    /// Revision the next write must present.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Revision>,

    #[serde(rename = "type", default)]
    kind: RecordKind,

    /// Lifecycle state.
    pub state: JobState,

    /// Run the record belongs to.
    pub run: String,

    /// When the record was enqueued.
    pub created_at: DateTime<Utc>,

    /// Encoded job. Dropped once a worker decodes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// When execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Loop that completed the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerIdentity>,

    /// Extensions, parameters and results.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl JobRecord {
    /// New available record carrying `payload`.
    #[must_use]
    pub fn new(run: impl Into<String>, payload: String, extensions: &Extensions) -> Self {
        Self {
            id: JobId::new(),
            rev: None,
            kind: RecordKind::Job,
            state: JobState::Available,
            run: run.into(),
            created_at: Utc::now(),
            payload: Some(payload),
            started_at: None,
            finished_at: None,
            worker: None,
            fields: extensions
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect(),
        }
    }

    /// Parse a stored document.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::MalformedRecord`] if the document is not a job record.
    pub fn from_document(doc: Document) -> JobResult<Self> {
        let id = doc.id.clone();
        let value = serde_json::to_value(doc)?;
        serde_json::from_value(value).map_err(|e| JobError::MalformedRecord {
            id,
            reason: e.to_string(),
        })
    }

    /// Render as a store document.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be serialized.
    pub fn to_document(&self) -> JobResult<Document> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// Copy `fields` into the record, skipping reserved keys.
    pub fn merge_fields(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                warn!(job_id = %self.id, field = %key, "ignoring reserved field");
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    /// Mark the record done.
    ///
    /// Object results are merged field by field; `null` adds nothing; any
    /// other value is stored under `result`.
    pub fn complete(
        &mut self,
        worker: &WorkerIdentity,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        result: Value,
    ) {
        match result {
            Value::Object(fields) => self.merge_fields(fields),
            Value::Null => {}
            other => {
                self.fields.insert("result".to_string(), other);
            }
        }
        self.payload = None;
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self.worker = Some(worker.clone());
        self.state = JobState::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> JobRecord {
        let ext = Extensions::new().with("batch", 7).with("owner", "lab");
        JobRecord::new("sleep", "cGF5bG9hZA==".into(), &ext)
    }

    #[test]
    fn test_new_record_document_shape() {
        let doc = record().to_document().unwrap();
        assert_eq!(doc.id.len(), 32);
        assert_eq!(doc.rev, None);
        assert_eq!(doc.get_str("type"), Some("job"));
        assert_eq!(doc.get_str("state"), Some("available"));
        assert_eq!(doc.get_str("run"), Some("sleep"));
        assert_eq!(doc.get("batch"), Some(&json!(7)));
        assert!(doc.get_str("created_at").is_some());
        assert!(doc.get("started_at").is_none());
        assert_eq!(job_queue_index().key_for(&doc).unwrap().run, "sleep");
    }

    #[test]
    fn test_document_round_trip() {
        let original = record();
        let mut doc = original.to_document().unwrap();
        doc.rev = Some(Revision::new("1-a"));
        let parsed = JobRecord::from_document(doc).unwrap();
        assert_eq!(parsed.id, original.id);
        assert_eq!(parsed.rev, Some(Revision::new("1-a")));
        assert_eq!(parsed.fields, original.fields);
    }

    #[test]
    fn test_foreign_documents_are_malformed() {
        let doc = Document::new("abc").set("type", "note");
        assert!(matches!(
            JobRecord::from_document(doc),
            Err(JobError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_complete_drops_payload_and_merges_result() {
        let mut rec = record();
        let worker = WorkerIdentity::current();
        let now = Utc::now();
        rec.complete(&worker, now, now, json!({"start": 1.0, "state": "bogus"}));

        let doc = rec.to_document().unwrap();
        assert_eq!(doc.get_str("state"), Some("done"));
        assert!(doc.get("payload").is_none());
        assert_eq!(doc.get("start"), Some(&json!(1.0)));
        assert_eq!(doc.get("worker").and_then(Value::as_array).map(Vec::len), Some(3));
        assert_eq!(job_queue_index().key_for(&doc), None);
    }

    #[test]
    fn test_scalar_result_goes_under_result_key() {
        let mut rec = record();
        let now = Utc::now();
        rec.complete(&WorkerIdentity::current(), now, now, json!(42));
        assert_eq!(rec.fields.get("result"), Some(&json!(42)));
    }

    #[test]
    fn test_extension_validation() {
        assert!(Extensions::new().with("owner", "x").validate().is_ok());
        for bad in ["", "state", "_id", "payload"] {
            let err = Extensions::new().with(bad, 1).validate().unwrap_err();
            assert!(matches!(err, JobError::InvalidExtension { key, .. } if key == bad));
        }
        assert!(Extensions::new().with("w", f64::NAN).validate().is_err());
    }
}
