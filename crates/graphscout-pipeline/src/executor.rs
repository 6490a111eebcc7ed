//! Request execution: one HTTP POST of a serialized query, one parsed JSON
//! document back. No retries at this layer; a user-initiated re-trigger is
//! the only retry mechanism in the system.

use crate::error::PipelineError;
use crate::query::{Endpoint, StructuredQuery};
use std::time::Duration;

const ACCEPT_RESULTS_JSON: &str = "application/sparql-results+json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues serialized queries against a SPARQL endpoint.
///
/// Holds only a reqwest client; no state is carried between executions.
pub struct RequestExecutor {
    client: reqwest::Client,
}

impl RequestExecutor {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");
        Self { client }
    }

    /// POST the query and return the parsed wire document.
    ///
    /// The endpoint is validated first, so blank or unparsable URLs fail
    /// without network traffic. A non-2xx answer surfaces the response body
    /// as [`PipelineError::RemoteQuery`]; a 2xx body that is not JSON is
    /// [`PipelineError::MalformedResponse`]. Shape validation of the JSON
    /// happens later, in normalization.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        query: &StructuredQuery,
    ) -> Result<serde_json::Value, PipelineError> {
        let url = endpoint.validate()?;
        tracing::debug!(endpoint = %url, "executing query");

        let response = self
            .client
            .post(url)
            .header("Accept", ACCEPT_RESULTS_JSON)
            .header("Content-Type", "text/plain")
            .header("Authorization", format!("Bearer {}", endpoint.token()))
            .body(query.wire_text().to_string())
            .send()
            .await
            .map_err(|e| PipelineError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(PipelineError::RemoteQuery {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| PipelineError::MalformedResponse(e.to_string()))
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select() -> StructuredQuery {
        StructuredQuery::compile("SELECT ?s WHERE { ?s ?p ?o }").unwrap()
    }

    #[tokio::test]
    async fn blank_endpoint_fails_before_any_request() {
        let exec = RequestExecutor::new();
        let err = exec
            .execute(&Endpoint::new("", "token"), &select())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyEndpoint));
    }

    #[tokio::test]
    async fn unparsable_endpoint_fails_before_any_request() {
        let exec = RequestExecutor::new();
        let err = exec
            .execute(&Endpoint::new("::not-a-url::", "token"), &select())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidEndpoint(_)));
    }
}
