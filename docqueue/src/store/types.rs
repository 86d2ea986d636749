//! Document, revision, and index types shared by every store backend.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Upper bound for the id half of an index key.
///
/// Generated ids only use lowercase hex digits, all of which sort before `z`.
pub const MAX_ID_SENTINEL: &str = "z";

/// Opaque, store-assigned version token of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Wrap a revision string returned by the store.
    #[must_use]
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generation counter encoded in `CouchDB`-style `N-hash` tokens.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(generation, _)| generation.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A schemaless document as stored in the collection.
///
/// `_id` and `_rev` are lifted into typed fields; every other key lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Primary key.
    #[serde(rename = "_id")]
    pub id: String,

    /// Version token the next write must present. `None` for documents not yet stored.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Revision>,

    /// Remaining document body.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            fields: Map::new(),
        }
    }

    /// Create a document from an id and a body.
    #[must_use]
    pub fn with_fields(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            fields,
        }
    }

    /// Look up a body field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a body field holding a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Set a body field, returning the document for chaining.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Whether this is a design document (index definitions and the like).
    #[must_use]
    pub fn is_design(&self) -> bool {
        self.id.starts_with("_design/")
    }
}

/// Per-document result of a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document was stored under a new revision.
    Written {
        /// Document id.
        id: String,
        /// Revision assigned by the store.
        rev: Revision,
    },
    /// The presented revision did not match the stored one.
    Conflict {
        /// Document id.
        id: String,
    },
    /// Any other per-document rejection.
    Failed {
        /// Document id.
        id: String,
        /// Reason reported by the store.
        reason: String,
    },
}

impl WriteOutcome {
    /// Whether the write went through.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    /// Id of the document this outcome refers to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Written { id, .. } | Self::Conflict { id } | Self::Failed { id, .. } => id,
        }
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written { id, rev } => write!(f, "{id} written as {rev}"),
            Self::Conflict { id } => write!(f, "{id}: version conflict"),
            Self::Failed { id, reason } => write!(f, "{id}: {reason}"),
        }
    }
}

/// Composite `(run, id)` ordering key emitted by the job index.
///
/// A key without an id sorts before every key of the same run that has one,
/// matching `CouchDB` array collation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    /// Run (partition) component.
    pub run: String,
    /// Id component; `None` for the bare `(run,)` prefix.
    pub id: Option<String>,
}

impl IndexKey {
    /// Key `(run, id)`.
    #[must_use]
    pub fn new(run: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            id: Some(id.into()),
        }
    }

    /// Key `(run,)`, the lowest key of a run.
    #[must_use]
    pub fn run_only(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            id: None,
        }
    }
}

impl Serialize for IndexKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.id.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.run)?;
        if let Some(id) = &self.id {
            seq.serialize_element(id)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for IndexKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = IndexKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of one or two strings")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<IndexKey, A::Error> {
                let run: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let id: Option<String> = seq.next_element()?;
                Ok(IndexKey { run, id })
            }
        }

        deserializer.deserialize_seq(KeyVisitor)
    }
}

/// Half-open key range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub start: IndexKey,
    /// Exclusive upper bound.
    pub end: IndexKey,
}

impl KeyRange {
    /// Range between two keys.
    #[must_use]
    pub const fn new(start: IndexKey, end: IndexKey) -> Self {
        Self { start, end }
    }

    /// Every key of one run.
    #[must_use]
    pub fn whole_run(run: &str) -> Self {
        Self::new(IndexKey::run_only(run), IndexKey::new(run, MAX_ID_SENTINEL))
    }

    /// Whether `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &IndexKey) -> bool {
        &self.start <= key && key < &self.end
    }
}

/// One match returned by an index query, with the current document attached.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    /// Key the index emitted.
    pub key: IndexKey,
    /// Id of the matching document.
    pub id: String,
    /// The document as currently stored.
    pub doc: Document,
}
