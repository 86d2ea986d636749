//! Declarative secondary index definitions.
//!
//! An index is stored as a design document. `CouchDB` evaluates the generated
//! `JavaScript` map function; in-process backends read the declarative
//! `selectors` section instead, so both agree on what gets emitted.

use super::types::{Document, IndexKey};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Body key holding the declarative selectors of a design document.
const SELECTORS_KEY: &str = "selectors";

/// Which documents an index emits.
#[derive(Debug, Deserialize)]
struct Selector {
    kind: String,
    state: String,
}

/// An index emitting `(run, id)` for every document whose `type` and `state`
/// match the configured values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDefinition {
    /// Design document name (without the `_design/` prefix).
    pub design: String,
    /// Index (view) name inside the design document.
    pub name: String,
    /// Required value of the `type` field.
    pub kind: String,
    /// Required value of the `state` field.
    pub state: String,
}

impl IndexDefinition {
    /// Build a definition.
    #[must_use]
    pub fn new(
        design: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            design: design.into(),
            name: name.into(),
            kind: kind.into(),
            state: state.into(),
        }
    }

    /// Id of the design document holding this index.
    #[must_use]
    pub fn design_id(&self) -> String {
        format!("_design/{}", self.design)
    }

    /// Key this index emits for `doc`, if any.
    #[must_use]
    pub fn key_for(&self, doc: &Document) -> Option<IndexKey> {
        if doc.get_str("type") != Some(self.kind.as_str())
            || doc.get_str("state") != Some(self.state.as_str())
        {
            return None;
        }
        let run = doc.get_str("run")?;
        Some(IndexKey::new(run, doc.id.clone()))
    }

    /// `JavaScript` map function equivalent to [`key_for`](Self::key_for).
    #[must_use]
    pub fn map_function(&self) -> String {
        format!(
            "function(doc) {{ if (doc.type == {kind} && doc.state == {state}) emit([doc.run, doc._id], null); }}",
            kind = Value::from(self.kind.as_str()),
            state = Value::from(self.state.as_str()),
        )
    }

    /// Design document declaring this index.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut views = Map::new();
        views.insert(self.name.clone(), json!({ "map": self.map_function() }));

        let mut selectors = Map::new();
        selectors.insert(
            self.name.clone(),
            json!({ "kind": self.kind, "state": self.state }),
        );

        Document::new(self.design_id())
            .set("language", "javascript")
            .set("views", Value::Object(views))
            .set(SELECTORS_KEY, Value::Object(selectors))
    }

    /// Recover the definitions declared by a design document.
    ///
    /// Returns an empty list for ordinary documents and for design documents
    /// written by other tools.
    #[must_use]
    pub fn from_document(doc: &Document) -> Vec<Self> {
        let Some(design) = doc.id.strip_prefix("_design/") else {
            return Vec::new();
        };
        let Some(Value::Object(selectors)) = doc.get(SELECTORS_KEY) else {
            return Vec::new();
        };
        selectors
            .iter()
            .filter_map(|(name, raw)| {
                let selector: Selector = serde_json::from_value(raw.clone()).ok()?;
                Some(Self::new(design, name.as_str(), selector.kind, selector.state))
            })
            .collect()
    }
}
