//! Tabular result model shared by every pipeline stage.
//!
//! A [`Row`] is an ordered mapping from column name to [`CellValue`]; rows in
//! the same [`RowSet`] may carry different key sets (pivoting produces a
//! dynamic, heterogeneous column set). The [`RowSet`] wrapper makes the
//! pipeline provenance tag an explicit, statically visible property instead
//! of a marker hidden on a bare collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One result row: column name to value, ordered by key.
pub type Row = BTreeMap<String, CellValue>;

// ============================================================================
// Cell values
// ============================================================================

/// An external identifier upgraded with a human-readable label.
///
/// `resolved` is always `true`; identifiers whose lookup failed stay as
/// [`CellValue::Plain`] strings instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedValue {
    pub identifier: String,
    pub label: String,
    pub resolved: bool,
}

impl EnrichedValue {
    pub fn new(identifier: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
            resolved: true,
        }
    }
}

/// A single cell: either the raw string from the wire or an enriched value.
///
/// Serializes untagged, so plain cells stay JSON strings and enriched cells
/// become `{identifier, label, resolved}` objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Enriched(EnrichedValue),
    Plain(String),
}

impl CellValue {
    /// The underlying string for a plain cell, `None` once enriched.
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Self::Plain(s) => Some(s),
            Self::Enriched(_) => None,
        }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self, Self::Enriched(_))
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

// ============================================================================
// Row sets
// ============================================================================

/// An ordered sequence of rows plus the pipeline provenance tag.
///
/// The tag records "this data came out of the query pipeline" and lets a
/// downstream consumer tell pipeline output apart from externally sourced
/// tables (user uploads and the like). It defaults to `false`; normalization
/// sets it, and every derived transformation carries it forward via
/// [`RowSet::derived`]. Nothing ever sets it on external data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSet {
    rows: Vec<Row>,
    from_pipeline: bool,
}

impl RowSet {
    /// Wrap rows produced by the pipeline (tag set).
    pub fn pipeline(rows: Vec<Row>) -> Self {
        Self {
            rows,
            from_pipeline: true,
        }
    }

    /// Wrap rows from any other source (tag unset).
    pub fn external(rows: Vec<Row>) -> Self {
        Self {
            rows,
            from_pipeline: false,
        }
    }

    /// Build a new row set derived from this one, keeping the tag as is.
    pub fn derived(&self, rows: Vec<Row>) -> Self {
        Self {
            rows,
            from_pipeline: self.from_pipeline,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn from_pipeline(&self) -> bool {
        self.from_pipeline
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
