//! Columnar data frames.
//!
//! Query results and remote-write batches are column oriented: a [`Frame`]
//! holds named [`Field`]s of equal length, each optionally carrying a label
//! set that applies to the whole column.

use chrono::{DateTime, Utc};
use serde_json::value::RawValue;

use super::labels::Labels;

/// Values of one column.
#[derive(Debug, Clone)]
pub enum FieldValues {
    /// Timestamps.
    Time(Vec<DateTime<Utc>>),
    /// Floating point samples.
    Float(Vec<f64>),
    /// Plain strings.
    String(Vec<String>),
    /// Opaque JSON documents, kept verbatim.
    Json(Vec<Box<RawValue>>),
}

impl FieldValues {
    /// Number of rows in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Time(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Json(v) => v.len(),
        }
    }

    /// Returns `true` if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column.
#[derive(Debug, Clone)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Labels describing the column, if any.
    pub labels: Option<Labels>,
    /// Column data.
    pub values: FieldValues,
}

impl Field {
    /// Creates an unlabelled column.
    #[must_use]
    pub fn new(name: impl Into<String>, values: FieldValues) -> Self {
        Self {
            name: name.into(),
            labels: None,
            values,
        }
    }

    /// Attaches a label set to the column.
    #[must_use]
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = Some(labels);
        self
    }
}

/// A named collection of equally long columns.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Frame name.
    pub name: String,
    /// Columns, in order.
    pub fields: Vec<Field>,
}

impl Frame {
    /// Creates a frame from its columns.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Number of rows, taken from the first column.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.fields.first().map_or(0, |f| f.values.len())
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}
