//! GraphScout query pipeline.
//!
//! Turns a structured selection query into a wire request and the wire
//! response back into uniform tabular rows:
//!
//! ```text
//! query text ──compile──► StructuredQuery
//!                              │
//!                         RequestExecutor ──► wire JSON
//!                              │
//!                         normalize ──► RowSet (tagged)
//!                              │
//!                     (optional) pivot ──► one row per subject
//!                              │
//!                     (optional) enrich ──► labels on external IRIs
//! ```
//!
//! Every stage is a pure function from input to output (or one external call
//! plus a pure transformation); the only state anywhere is the reqwest
//! clients. The provenance tag set by `normalize` travels untouched through
//! `pivot` and `enrich` so a consumer can always tell pipeline output from
//! externally sourced tables.

pub mod enrich;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod pivot;
pub mod query;
pub mod rowset;

pub use enrich::{enrich, IriMatcher, LabelMap, LabelService, WikidataLabelService};
pub use error::PipelineError;
pub use executor::RequestExecutor;
pub use normalize::normalize;
pub use pivot::pivot;
pub use query::{Endpoint, QueryForm, StructuredQuery};
pub use rowset::{CellValue, EnrichedValue, Row, RowSet};

use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// Pipeline façade
// ============================================================================

/// Enrichment parameters for one run: which field to scan and what counts as
/// an external identifier.
#[derive(Clone)]
pub struct EnrichOptions {
    pub field: String,
    pub matcher: IriMatcher,
}

impl EnrichOptions {
    /// Enrich `entity_name` cells holding Wikidata entity IRIs, the shape
    /// the vocabulary browser produces.
    pub fn wikidata_entity_names() -> Self {
        Self {
            field: pivot::VALUE_VAR.to_string(),
            matcher: IriMatcher::wikidata(),
        }
    }
}

/// Per-run switches for the optional stages.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub pivot: bool,
    pub enrich: Option<EnrichOptions>,
}

/// One full pipeline invocation. The session layer talks to this trait so
/// tests can substitute a deterministic pipeline.
#[async_trait]
pub trait QueryPipeline: Send + Sync {
    async fn run(
        &self,
        endpoint: &Endpoint,
        query: &StructuredQuery,
        options: &RunOptions,
    ) -> Result<RowSet, PipelineError>;
}

/// The real pipeline: HTTP execution, normalization, then the optional
/// stages in fixed order.
pub struct SparqlPipeline {
    executor: RequestExecutor,
    labels: Arc<dyn LabelService>,
}

impl SparqlPipeline {
    pub fn new() -> Self {
        Self {
            executor: RequestExecutor::new(),
            labels: Arc::new(WikidataLabelService::new()),
        }
    }

    pub fn with_label_service(labels: Arc<dyn LabelService>) -> Self {
        Self {
            executor: RequestExecutor::new(),
            labels,
        }
    }
}

impl Default for SparqlPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryPipeline for SparqlPipeline {
    async fn run(
        &self,
        endpoint: &Endpoint,
        query: &StructuredQuery,
        options: &RunOptions,
    ) -> Result<RowSet, PipelineError> {
        let document = self.executor.execute(endpoint, query).await?;
        let mut rows = normalize(&document)?;
        if options.pivot {
            rows = pivot(&rows);
        }
        if let Some(opts) = &options.enrich {
            rows = enrich(&rows, &opts.field, &opts.matcher, self.labels.as_ref()).await;
        }
        Ok(rows)
    }
}
