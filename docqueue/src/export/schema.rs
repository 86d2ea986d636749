//! Column inference over schemaless records.

use super::{ExportError, ExportResult};
use crate::store::Document;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Fields never turned into columns.
const EXCLUDED_FIELDS: &[&str] = &["type", "_rev"];

/// Type of one observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// String.
    Text,
    /// Number without a fractional part that fits in an `i64`.
    Integer,
    /// Any other number.
    Real,
    /// `true` or `false`.
    Boolean,
    /// Object or array.
    Composite,
}

impl FieldType {
    /// Type of `value`, or `None` for null.
    #[must_use]
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_i64() => Some(Self::Integer),
            Value::Number(_) => Some(Self::Real),
            Value::String(_) => Some(Self::Text),
            Value::Array(_) | Value::Object(_) => Some(Self::Composite),
        }
    }

    /// Common type of two observations. Only identical types are compatible.
    #[must_use]
    pub fn unify(self, other: Self) -> Option<Self> {
        (self == other).then_some(self)
    }

    /// Like [`unify`](Self::unify), but integers and reals meet at real.
    #[must_use]
    pub fn unify_widening(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Self::Integer, Self::Real) | (Self::Real, Self::Integer) => Some(Self::Real),
            (a, b) => a.unify(b),
        }
    }

    const fn column_type(self) -> Option<ColumnType> {
        match self {
            Self::Text => Some(ColumnType::Text),
            Self::Integer | Self::Boolean => Some(ColumnType::Integer),
            Self::Real => Some(ColumnType::Real),
            Self::Composite => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Boolean => "boolean",
            Self::Composite => "composite",
        };
        f.write_str(name)
    }
}

/// Storage type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit integer. Booleans are stored as 0 or 1.
    Integer,
    /// Double precision float.
    Real,
}

impl ColumnType {
    /// SQL type name.
    #[must_use]
    pub const fn sql(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Field name, used verbatim as the column name.
    pub name: String,
    /// Storage type.
    pub column_type: ColumnType,
}

/// Why a field did not become a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// Objects and arrays have no column representation.
    Composite,
    /// Only null was ever observed, so there is no type.
    OnlyNull,
}

/// A field left out of the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedField {
    /// Field name.
    pub name: String,
    /// Why it was left out.
    pub reason: DropReason,
}

/// A single cell value ready for the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing or unrepresentable value.
    Null,
    /// Text.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Real.
    Real(f64),
}

/// Accumulates field types over a sequence of records.
#[derive(Debug, Default)]
pub struct SchemaInference {
    /// `None` while only nulls have been seen.
    fields: BTreeMap<String, Option<FieldType>>,
    records: usize,
    widen_numbers: bool,
}

impl SchemaInference {
    /// Empty inference.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept integer and real observations of one field as a real column.
    #[must_use]
    pub const fn with_numeric_widening(mut self, widen: bool) -> Self {
        self.widen_numbers = widen;
        self
    }

    /// Records observed so far.
    #[must_use]
    pub const fn records(&self) -> usize {
        self.records
    }

    /// Fold one record into the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::TypeAmbiguity`] when a field has now been seen
    /// with two incompatible types. Integer and real are incompatible unless
    /// numeric widening is enabled.
    pub fn observe(&mut self, doc: &Document) -> ExportResult<()> {
        self.records += 1;
        self.observe_value("_id", &Value::String(doc.id.clone()))?;
        for (name, value) in &doc.fields {
            if EXCLUDED_FIELDS.contains(&name.as_str()) {
                continue;
            }
            self.observe_value(name, value)?;
        }
        Ok(())
    }

    fn observe_value(&mut self, name: &str, value: &Value) -> ExportResult<()> {
        let observed = FieldType::of(value);
        let widen = self.widen_numbers;
        let slot = self.fields.entry(name.to_string()).or_insert(None);
        *slot = match (*slot, observed) {
            (current, None) => current,
            (None, Some(new)) => Some(new),
            (Some(current), Some(new)) => {
                let unified = if widen {
                    current.unify_widening(new)
                } else {
                    current.unify(new)
                };
                Some(unified.ok_or_else(|| ExportError::TypeAmbiguity {
                    field: name.to_string(),
                    first: current,
                    second: new,
                })?)
            }
        };
        Ok(())
    }

    /// Decide the output columns.
    #[must_use]
    pub fn finish(self) -> InferredSchema {
        let mut columns = Vec::new();
        let mut dropped = Vec::new();
        for (name, field_type) in self.fields {
            match field_type.map(FieldType::column_type) {
                Some(Some(column_type)) => columns.push(Column { name, column_type }),
                Some(None) => {
                    warn!(field = %name, "dropping field with composite values");
                    dropped.push(DroppedField {
                        name,
                        reason: DropReason::Composite,
                    });
                }
                None => {
                    warn!(field = %name, "dropping field that is always null");
                    dropped.push(DroppedField {
                        name,
                        reason: DropReason::OnlyNull,
                    });
                }
            }
        }
        InferredSchema { columns, dropped }
    }
}

/// Result of schema inference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferredSchema {
    /// Output columns, ordered by name.
    pub columns: Vec<Column>,
    /// Fields left out.
    pub dropped: Vec<DroppedField>,
}

impl InferredSchema {
    /// Column named `name`, if any.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// One cell per column for `doc`. Missing fields become null.
    #[must_use]
    pub fn row(&self, doc: &Document) -> Vec<Cell> {
        self.columns
            .iter()
            .map(|column| {
                let value = if column.name == "_id" {
                    Some(Value::String(doc.id.clone()))
                } else {
                    doc.get(&column.name).cloned()
                };
                match value {
                    Some(value) => to_cell(&doc.id, column, value),
                    None => {
                        warn!(record = %doc.id, field = %column.name, "record lacks field, writing null");
                        Cell::Null
                    }
                }
            })
            .collect()
    }
}

fn to_cell(record: &str, column: &Column, value: Value) -> Cell {
    let cell = match (column.column_type, value) {
        (_, Value::Null) => Some(Cell::Null),
        (ColumnType::Text, Value::String(s)) => Some(Cell::Text(s)),
        (ColumnType::Integer, Value::Bool(b)) => Some(Cell::Integer(i64::from(b))),
        (ColumnType::Integer, Value::Number(n)) => n.as_i64().map(Cell::Integer),
        (ColumnType::Real, Value::Number(n)) => n.as_f64().map(Cell::Real),
        _ => None,
    };
    cell.unwrap_or_else(|| {
        warn!(record, field = %column.name, "value does not fit the column type, writing null");
        Cell::Null
    })
}
