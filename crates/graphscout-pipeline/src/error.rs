//! Error taxonomy for the query pipeline.
//!
//! Each variant maps to exactly one failure surface:
//! - query compilation (`InvalidQuery`),
//! - endpoint validation (`EmptyEndpoint`, `InvalidEndpoint`),
//! - transport (`Network`),
//! - the remote endpoint (`RemoteQuery`),
//! - response decoding (`MalformedResponse`, `InvalidResultShape`).
//!
//! Enrichment failures are deliberately *not* here: label lookups degrade to
//! unresolved identifiers and never abort a run (see `enrich`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The query text failed compilation, or compiled to a non-selection
    /// operation. Surfaced to the user verbatim.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The endpoint URL was blank at execution time. No request is made.
    #[error("no endpoint configured")]
    EmptyEndpoint,

    /// The endpoint URL does not parse. No request is made.
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    /// The request could not be sent or the connection failed mid-flight.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status. The response body is
    /// carried as the user-visible detail.
    #[error("endpoint returned status {status}: {body}")]
    RemoteQuery { status: u16, body: String },

    /// A success status with a body that is not JSON.
    #[error("malformed endpoint response: {0}")]
    MalformedResponse(String),

    /// JSON that lacks the expected `head.vars` / `results.bindings`
    /// structure. Callers treat this the same as `MalformedResponse`.
    #[error("unexpected result shape: {0}")]
    InvalidResultShape(String),
}

impl PipelineError {
    /// Whether the failure happened before any network traffic.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery(_) | Self::EmptyEndpoint | Self::InvalidEndpoint(_)
        )
    }
}
