//! Bindings normalization: wire-format JSON into flat tagged rows.
//!
//! The wire format is SPARQL 1.1 Query Results JSON: `head.vars` declares the
//! column order, `results.bindings` holds one map per row. Variables a row
//! leaves unbound are an expected case and become empty strings, not errors.

use crate::error::PipelineError;
use crate::rowset::{CellValue, Row, RowSet};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Typed view of the wire document. Built fresh per response, dropped after
/// normalization.
#[derive(Debug, Deserialize)]
pub struct WireResult {
    pub head: WireHead,
    pub results: WireBindings,
}

#[derive(Debug, Deserialize)]
pub struct WireHead {
    pub vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireBindings {
    pub bindings: Vec<BTreeMap<String, WireTerm>>,
}

/// One bound term. Extra wire fields (`xml:lang`, `datatype`) are ignored.
#[derive(Debug, Deserialize)]
pub struct WireTerm {
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Convert a wire document into a row set carrying the pipeline tag.
///
/// Every row gets exactly the declared variables, in declared order. The tag
/// is set unconditionally on success, zero-row results included, so the
/// consumer can distinguish "no data" from "not pipeline data".
pub fn normalize(document: &serde_json::Value) -> Result<RowSet, PipelineError> {
    let wire: WireResult = serde_json::from_value(document.clone())
        .map_err(|e| PipelineError::InvalidResultShape(e.to_string()))?;

    let mut rows = Vec::with_capacity(wire.results.bindings.len());
    for binding in &wire.results.bindings {
        let mut row = Row::new();
        for var in &wire.head.vars {
            let value = binding
                .get(var)
                .map(|term| term.value.clone())
                .unwrap_or_default();
            row.insert(var.clone(), CellValue::Plain(value));
        }
        rows.push(row);
    }

    tracing::debug!(
        rows = rows.len(),
        vars = wire.head.vars.len(),
        "normalized wire bindings"
    );
    Ok(RowSet::pipeline(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn one_row_per_binding_with_declared_vars() {
        let doc = json!({
            "head": {"vars": ["s", "p", "o"]},
            "results": {"bindings": [
                {"s": {"value": "a", "type": "uri"},
                 "p": {"value": "b", "type": "uri"},
                 "o": {"value": "c", "type": "literal"}},
                {"s": {"value": "d", "type": "uri"},
                 "p": {"value": "e", "type": "uri"},
                 "o": {"value": "f", "type": "literal"}},
            ]}
        });
        let rs = normalize(&doc).unwrap();
        assert_eq!(rs.len(), 2);
        for row in rs.rows() {
            let keys: Vec<_> = row.keys().map(String::as_str).collect();
            assert_eq!(keys, ["o", "p", "s"]);
        }
        assert_eq!(rs.rows()[0]["s"], CellValue::from("a"));
    }

    #[test]
    fn unbound_variable_becomes_empty_string() {
        let doc = json!({
            "head": {"vars": ["s", "label"]},
            "results": {"bindings": [
                {"s": {"value": "a", "type": "uri"}}
            ]}
        });
        let rs = normalize(&doc).unwrap();
        assert_eq!(rs.rows()[0]["label"], CellValue::from(""));
    }

    #[test]
    fn zero_rows_still_tagged() {
        let doc = json!({"head": {"vars": ["s"]}, "results": {"bindings": []}});
        let rs = normalize(&doc).unwrap();
        assert!(rs.is_empty());
        assert!(rs.from_pipeline());
    }

    #[test]
    fn missing_structure_is_a_shape_error() {
        for doc in [
            json!({"results": {"bindings": []}}),
            json!({"head": {"vars": ["s"]}}),
            json!({"head": {"vars": "s"}, "results": {"bindings": []}}),
            json!("not an object"),
        ] {
            let err = normalize(&doc).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidResultShape(_)), "{}", doc);
        }
    }

    #[test]
    fn extra_binding_keys_are_ignored() {
        // The endpoint may bind variables the head never declared; only
        // declared ones make it into the row.
        let doc = json!({
            "head": {"vars": ["s"]},
            "results": {"bindings": [
                {"s": {"value": "a", "type": "uri"},
                 "ghost": {"value": "x", "type": "literal"}}
            ]}
        });
        let rs = normalize(&doc).unwrap();
        assert_eq!(rs.rows()[0].len(), 1);
    }
}
