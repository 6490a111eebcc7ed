//! Search session orchestration.
//!
//! Maps user-facing search events onto pipeline invocations:
//! - session start runs the default listing once (if an endpoint is set),
//! - non-empty term changes run after a quiet period, latest term only,
//! - clearing the term falls back to the default listing immediately,
//! - endpoint changes re-run the current term (debounced) when one is set.
//!
//! Responses are guarded by a per-session generation counter: every run
//! captures the generation current when it was scheduled, and only the run
//! matching the latest generation may update visible state. Superseded and
//! post-close responses are dropped silently; the underlying request is left
//! to finish on its own.

use async_trait::async_trait;
use graphscout_pipeline::{
    Endpoint, PipelineError, QueryPipeline, RowSet, RunOptions, StructuredQuery,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Builds the query text for a non-empty search term.
pub type TermQueryBuilder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Injectable session knobs. Debounce timing and query text live here, not
/// in globals, so tests can run with deterministic timers and fixed queries.
pub struct SessionConfig {
    /// Quiet period between the last keystroke and the query it triggers.
    pub debounce: Duration,
    /// The "initial listing" query used at session start and for empty terms.
    pub default_query: String,
    /// Term to query-text mapping for user searches.
    pub term_query: TermQueryBuilder,
    /// Pivot/enrichment switches applied to every run of this session.
    pub options: RunOptions,
}

impl SessionConfig {
    pub fn new(default_query: impl Into<String>) -> Self {
        Self {
            debounce: Duration::from_millis(300),
            default_query: default_query.into(),
            term_query: Box::new(default_term_query),
            options: RunOptions::default(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_term_query(mut self, term_query: TermQueryBuilder) -> Self {
        self.term_query = term_query;
        self
    }
}

/// Label-contains search over the remote graph.
fn default_term_query(term: &str) -> String {
    format!(
        "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
         SELECT ?entity ?entity_label WHERE {{\n\
         \x20 ?entity rdfs:label ?entity_label .\n\
         \x20 FILTER(CONTAINS(LCASE(STR(?entity_label)), LCASE(\"{}\")))\n\
         }}\n\
         LIMIT 100",
        escape_literal(term)
    )
}

/// Escape a term for embedding in a quoted SPARQL literal.
fn escape_literal(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

// ============================================================================
// Session state and delivery
// ============================================================================

/// User-visible state of one search session.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchState {
    Idle,
    Loading,
    Results(RowSet),
    /// Zero rows came back. A user-visible condition, not an error.
    Empty,
    Failed(String),
}

/// Provenance handed to the consumer alongside the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    pub query: String,
    pub endpoint: String,
    pub pivoted: bool,
    pub enriched: bool,
}

/// Downstream receiver of pipeline output. Gets every successful run,
/// zero-row ones included; how to interpret them is its business.
#[async_trait]
pub trait ResultConsumer: Send + Sync {
    async fn accept(&self, rows: RowSet, metadata: RunMetadata);

    /// Structured error signal for failed runs. The user-visible message is
    /// already in [`SearchState::Failed`]; this hook is for hosts that want
    /// the typed error too.
    async fn failed(&self, error: &PipelineError) {
        let _ = error;
    }
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug)]
struct SessionInner {
    endpoint: Option<Endpoint>,
    term: String,
    state: SearchState,
    generation: u64,
    started: bool,
    closed: bool,
}

enum Timing {
    Immediate,
    Debounced,
}

/// One user-visible search session over the query pipeline.
///
/// Cheap to clone; all clones share the same session. State is mutated only
/// under the inner lock and never across an await point.
#[derive(Clone)]
pub struct SearchSession {
    config: Arc<SessionConfig>,
    pipeline: Arc<dyn QueryPipeline>,
    consumer: Arc<dyn ResultConsumer>,
    inner: Arc<RwLock<SessionInner>>,
}

impl SearchSession {
    pub fn new(
        config: SessionConfig,
        pipeline: Arc<dyn QueryPipeline>,
        consumer: Arc<dyn ResultConsumer>,
        endpoint: Option<Endpoint>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            consumer,
            inner: Arc::new(RwLock::new(SessionInner {
                endpoint,
                term: String::new(),
                state: SearchState::Idle,
                generation: 0,
                started: false,
                closed: false,
            })),
        }
    }

    pub fn state(&self) -> SearchState {
        self.inner.read().state.clone()
    }

    pub fn term(&self) -> String {
        self.inner.read().term.clone()
    }

    /// Tear the session down. In-flight runs finish on their own but can no
    /// longer touch state or reach the consumer.
    pub fn close(&self) {
        self.inner.write().closed = true;
    }

    /// Run the initial listing, once per session, if an endpoint is set.
    pub fn start(&self) {
        let has_endpoint = {
            let mut inner = self.inner.write();
            if inner.started || inner.closed {
                return;
            }
            inner.started = true;
            inner.endpoint.is_some()
        };
        if has_endpoint {
            self.schedule(self.config.default_query.clone(), Timing::Immediate);
        }
    }

    /// Record a search-term change. Non-empty terms run after the quiet
    /// period (superseding any pending run); an empty term falls back to the
    /// default listing immediately.
    pub fn set_term(&self, term: &str) {
        {
            let mut inner = self.inner.write();
            if inner.closed {
                return;
            }
            inner.term = term.to_string();
        }
        if term.is_empty() {
            self.schedule(self.config.default_query.clone(), Timing::Immediate);
        } else {
            self.schedule((self.config.term_query)(term), Timing::Debounced);
        }
    }

    /// Switch endpoints. With a term in place the search re-runs (debounced)
    /// against the new endpoint; without one, nothing runs until the user
    /// types or the session restarts.
    pub fn set_endpoint(&self, endpoint: Endpoint) {
        let term = {
            let mut inner = self.inner.write();
            if inner.closed {
                return;
            }
            inner.endpoint = Some(endpoint);
            inner.term.clone()
        };
        if !term.is_empty() {
            self.schedule((self.config.term_query)(&term), Timing::Debounced);
        }
    }

    /// Claim the next generation; pending runs of older generations become
    /// stale the moment this returns.
    fn bump_generation(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.inner.read();
        !inner.closed && inner.generation == generation
    }

    fn schedule(&self, query_text: String, timing: Timing) {
        let generation = self.bump_generation();
        let quiet = self.config.debounce;
        let session = self.clone();
        tokio::spawn(async move {
            if matches!(timing, Timing::Debounced) {
                tokio::time::sleep(quiet).await;
                if !session.is_current(generation) {
                    // A newer keystroke or trigger arrived during the quiet
                    // period; only the most recent term executes.
                    return;
                }
            }
            session.run(generation, query_text).await;
        });
    }

    async fn run(&self, generation: u64, query_text: String) {
        let endpoint = {
            let mut inner = self.inner.write();
            if inner.closed || inner.generation != generation {
                return;
            }
            inner.state = SearchState::Loading;
            inner.endpoint.clone()
        };

        let outcome = match endpoint {
            None => Err(PipelineError::EmptyEndpoint),
            Some(endpoint) => match StructuredQuery::compile(&query_text) {
                Err(err) => Err(err),
                Ok(query) => self
                    .pipeline
                    .run(&endpoint, &query, &self.config.options)
                    .await
                    .map(|rows| {
                        let metadata = RunMetadata {
                            query: query_text.clone(),
                            endpoint: endpoint.url().to_string(),
                            pivoted: self.config.options.pivot,
                            enriched: self.config.options.enrich.is_some(),
                        };
                        (rows, metadata)
                    }),
            },
        };

        {
            let mut inner = self.inner.write();
            if inner.closed || inner.generation != generation {
                tracing::debug!(generation, "discarding superseded response");
                return;
            }
            inner.state = match &outcome {
                Ok((rows, _)) if rows.is_empty() => SearchState::Empty,
                Ok((rows, _)) => SearchState::Results(rows.clone()),
                Err(err) => SearchState::Failed(err.to_string()),
            };
        }

        match outcome {
            Ok((rows, metadata)) => self.consumer.accept(rows, metadata).await,
            Err(err) => self.consumer.failed(&err).await,
        }
    }
}
