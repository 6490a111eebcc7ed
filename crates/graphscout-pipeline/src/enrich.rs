//! IRI enrichment: upgrade bare external-entity identifiers to values that
//! carry a human-readable label.
//!
//! The resolver scans one field across all rows, deduplicates the matching
//! identifiers, and makes at most one batched lookup per call. Lookups are
//! best-effort by contract: a dead label service or a partial answer leaves
//! the affected identifiers as plain strings and never fails the run. The
//! label map is scoped to the call; nothing is cached across calls.

use crate::rowset::{CellValue, EnrichedValue, RowSet};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

/// Identifier to resolved label, for one enrichment call.
pub type LabelMap = HashMap<String, String>;

/// Batched identifier-to-label lookup.
///
/// Identifiers the source has no label for are simply absent from the
/// returned map, not error entries.
#[async_trait]
pub trait LabelService: Send + Sync {
    async fn lookup_labels(&self, identifiers: &[String]) -> Result<LabelMap, LabelLookupError>;
}

/// Failure of a label lookup. Never escapes the resolver.
#[derive(Debug, Error)]
pub enum LabelLookupError {
    #[error("label service unreachable: {0}")]
    Network(String),
    #[error("label service answered with status {0}")]
    Status(u16),
    #[error("malformed label response: {0}")]
    Malformed(String),
}

// ============================================================================
// Identifier matching
// ============================================================================

/// Recognizer for a fixed family of external-entity URI prefixes.
#[derive(Debug, Clone)]
pub struct IriMatcher {
    pattern: Regex,
}

impl IriMatcher {
    /// Match any value starting with one of the given prefixes.
    pub fn from_prefixes(prefixes: &[&str]) -> Self {
        let alternation = prefixes
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!("^(?:{})", alternation))
            .expect("escaped prefixes always form a valid pattern");
        Self { pattern }
    }

    /// The default family: Wikidata entity IRIs.
    pub fn wikidata() -> Self {
        Self::from_prefixes(&[
            "http://www.wikidata.org/entity/",
            "https://www.wikidata.org/entity/",
        ])
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Enrich `field` across all rows via one batched label lookup.
///
/// Returns a new row set; the input is never mutated and its provenance tag
/// is carried over exactly. When no value matches the matcher the input is
/// returned as-is and no lookup happens at all, keeping the call
/// side-effect-free.
pub async fn enrich(
    rows: &RowSet,
    field: &str,
    matcher: &IriMatcher,
    labels: &dyn LabelService,
) -> RowSet {
    let mut seen = HashSet::new();
    let mut wanted: Vec<String> = Vec::new();
    for row in rows.rows() {
        if let Some(value) = row.get(field).and_then(CellValue::as_plain) {
            if matcher.is_match(value) && seen.insert(value.to_string()) {
                wanted.push(value.to_string());
            }
        }
    }

    if wanted.is_empty() {
        return rows.clone();
    }

    let label_map = match labels.lookup_labels(&wanted).await {
        Ok(map) => map,
        Err(err) => {
            tracing::warn!(
                identifiers = wanted.len(),
                error = %err,
                "label lookup failed; leaving identifiers unresolved"
            );
            return rows.clone();
        }
    };

    let enriched_rows = rows
        .rows()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            let resolved = row
                .get(field)
                .and_then(CellValue::as_plain)
                .and_then(|value| {
                    // Keys of the map are a subset of the matched set, so map
                    // membership implies the value matched the pattern.
                    label_map
                        .get(value)
                        .map(|label| EnrichedValue::new(value, label.clone()))
                });
            if let Some(value) = resolved {
                row.insert(field.to_string(), CellValue::Enriched(value));
            }
            row
        })
        .collect();

    rows.derived(enriched_rows)
}

// ============================================================================
// Wikidata-backed label service
// ============================================================================

const WIKIDATA_SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// Label lookup against the Wikidata query service, one `VALUES` query per
/// batch.
pub struct WikidataLabelService {
    client: reqwest::Client,
    endpoint: String,
}

impl WikidataLabelService {
    pub fn new() -> Self {
        Self::with_endpoint(WIKIDATA_SPARQL_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to create HTTP client");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Default for WikidataLabelService {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an identifier can be embedded in a `<...>` IRI ref verbatim.
/// The matcher only pins the prefix, so the suffix of a matched value is
/// still endpoint-controlled; anything carrying an IRIREF-illegal character
/// would escape the ref and splice into the label query.
fn is_embeddable_iri(iri: &str) -> bool {
    !iri.chars().any(|c| {
        c <= '\u{20}' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
    })
}

/// Build the batched label query for a set of entity IRIs. Identifiers that
/// cannot be embedded safely are dropped (they stay unresolved, like any
/// identifier the service has no label for); `None` means nothing is left
/// to ask about.
fn build_label_query(identifiers: &[String]) -> Option<String> {
    let values = identifiers
        .iter()
        .filter(|iri| is_embeddable_iri(iri))
        .map(|iri| format!("<{}>", iri))
        .collect::<Vec<_>>()
        .join(" ");
    if values.is_empty() {
        return None;
    }
    Some(format!(
        "SELECT ?item ?itemLabel WHERE {{ VALUES ?item {{ {} }} \
         SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }} }}",
        values
    ))
}

/// Pull (identifier, label) pairs out of a label-query result document.
/// Bindings without both terms are dropped.
fn parse_label_bindings(document: &serde_json::Value) -> Result<LabelMap, LabelLookupError> {
    let bindings = document["results"]["bindings"]
        .as_array()
        .ok_or_else(|| LabelLookupError::Malformed("missing results.bindings".to_string()))?;

    let mut map = LabelMap::new();
    for binding in bindings {
        let item = binding["item"]["value"].as_str();
        let label = binding["itemLabel"]["value"].as_str();
        if let (Some(item), Some(label)) = (item, label) {
            map.insert(item.to_string(), label.to_string());
        }
    }
    Ok(map)
}

#[async_trait]
impl LabelService for WikidataLabelService {
    async fn lookup_labels(&self, identifiers: &[String]) -> Result<LabelMap, LabelLookupError> {
        let Some(query) = build_label_query(identifiers) else {
            return Ok(LabelMap::new());
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|e| LabelLookupError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LabelLookupError::Status(response.status().as_u16()));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LabelLookupError::Malformed(e.to_string()))?;
        parse_label_bindings(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rowset::Row;
    use std::sync::Mutex;

    const Q1: &str = "http://www.wikidata.org/entity/Q1";
    const Q2: &str = "http://www.wikidata.org/entity/Q2";

    /// Records every batch it is asked for; answers from a fixed map or
    /// fails on demand.
    struct FakeLabels {
        calls: Mutex<Vec<Vec<String>>>,
        answer: Result<LabelMap, ()>,
    }

    impl FakeLabels {
        fn answering(pairs: &[(&str, &str)]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer: Ok(pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()),
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer: Err(()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LabelService for FakeLabels {
        async fn lookup_labels(
            &self,
            identifiers: &[String],
        ) -> Result<LabelMap, LabelLookupError> {
            self.calls.lock().unwrap().push(identifiers.to_vec());
            match &self.answer {
                Ok(map) => Ok(map.clone()),
                Err(()) => Err(LabelLookupError::Network("connection refused".to_string())),
            }
        }
    }

    fn row_with(field: &str, value: &str) -> Row {
        [(field.to_string(), CellValue::from(value))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn no_match_means_no_lookup_and_identical_output() {
        let labels = FakeLabels::answering(&[]);
        let input = RowSet::pipeline(vec![
            row_with("entity_name", "Alice"),
            row_with("entity_name", "http://example.org/not-wikidata"),
        ]);
        let out = enrich(&input, "entity_name", &IriMatcher::wikidata(), &labels).await;
        assert_eq!(out, input);
        assert_eq!(labels.call_count(), 0);
    }

    #[tokio::test]
    async fn duplicates_trigger_exactly_one_lookup_with_one_identifier() {
        let labels = FakeLabels::answering(&[(Q1, "Universe")]);
        let input = RowSet::pipeline(vec![row_with("entity_name", Q1); 5]);
        let out = enrich(&input, "entity_name", &IriMatcher::wikidata(), &labels).await;

        let calls = labels.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![Q1.to_string()]);
        for row in out.rows() {
            assert_eq!(
                row["entity_name"],
                CellValue::Enriched(EnrichedValue::new(Q1, "Universe"))
            );
        }
    }

    #[tokio::test]
    async fn lookup_failure_degrades_to_plain_strings() {
        let labels = FakeLabels::failing();
        let input = RowSet::pipeline(vec![row_with("entity_name", Q1)]);
        let out = enrich(&input, "entity_name", &IriMatcher::wikidata(), &labels).await;
        assert_eq!(out, input);
        assert_eq!(labels.call_count(), 1);
    }

    #[tokio::test]
    async fn partial_answers_leave_the_missing_ones_plain() {
        let labels = FakeLabels::answering(&[(Q1, "Universe")]);
        let input = RowSet::pipeline(vec![
            row_with("entity_name", Q1),
            row_with("entity_name", Q2),
        ]);
        let out = enrich(&input, "entity_name", &IriMatcher::wikidata(), &labels).await;
        assert!(out.rows()[0]["entity_name"].is_enriched());
        assert_eq!(out.rows()[1]["entity_name"], CellValue::from(Q2));
    }

    #[tokio::test]
    async fn tag_carries_over_for_external_input_too() {
        let labels = FakeLabels::answering(&[(Q1, "Universe")]);
        let input = RowSet::external(vec![row_with("entity_name", Q1)]);
        let out = enrich(&input, "entity_name", &IriMatcher::wikidata(), &labels).await;
        assert!(!out.from_pipeline());
        assert!(out.rows()[0]["entity_name"].is_enriched());
    }

    #[test]
    fn matcher_covers_both_schemes_and_nothing_else() {
        let matcher = IriMatcher::wikidata();
        assert!(matcher.is_match("http://www.wikidata.org/entity/Q42"));
        assert!(matcher.is_match("https://www.wikidata.org/entity/Q42"));
        assert!(!matcher.is_match("http://www.wikidata.org/wiki/Q42"));
        assert!(!matcher.is_match("see http://www.wikidata.org/entity/Q42"));
    }

    #[test]
    fn label_query_batches_all_identifiers() {
        let query = build_label_query(&[Q1.to_string(), Q2.to_string()]).unwrap();
        assert!(query.contains(&format!("<{}> <{}>", Q1, Q2)));
        assert!(query.starts_with("SELECT ?item ?itemLabel"));
    }

    #[test]
    fn iri_breaking_identifiers_never_reach_the_query() {
        // A matched value only has a trusted prefix; a hostile endpoint can
        // put query text in the suffix.
        let hostile = format!("{}> }} UNION {{ ?s ?p ?o", Q1);
        let query = build_label_query(&[Q1.to_string(), hostile.clone()]).unwrap();
        assert!(!query.contains("UNION"));
        assert!(query.contains(&format!("<{}>", Q1)));

        assert!(build_label_query(&[hostile]).is_none());
        assert!(build_label_query(&[format!("{}\nQ5", Q1)]).is_none());
    }

    #[test]
    fn label_bindings_parse_and_skip_incomplete_entries() {
        let document = serde_json::json!({
            "head": {"vars": ["item", "itemLabel"]},
            "results": {"bindings": [
                {"item": {"value": Q1, "type": "uri"},
                 "itemLabel": {"value": "Universe", "type": "literal"}},
                {"item": {"value": Q2, "type": "uri"}},
            ]}
        });
        let map = parse_label_bindings(&document).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[Q1], "Universe");

        let err = parse_label_bindings(&serde_json::json!({"oops": true})).unwrap_err();
        assert!(matches!(err, LabelLookupError::Malformed(_)));
    }
}
