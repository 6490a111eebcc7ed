//! Query front door: compiling text into a validated selection query, plus
//! the endpoint descriptor the executor posts to.
//!
//! Compilation here is deliberately shallow. We classify the top-level
//! operation of the query and reject everything that is not a `SELECT`
//! before any network traffic happens; the endpoint's own parser remains the
//! authority on full SPARQL syntax.

use crate::error::PipelineError;
use url::Url;

/// Environment variable holding the bearer token for endpoint auth.
pub const BEARER_TOKEN_ENV: &str = "GRAPHSCOUT_BEARER_TOKEN";

// ============================================================================
// Endpoint
// ============================================================================

/// A SPARQL endpoint URL plus the bearer credential used to reach it.
///
/// The credential comes from process-wide configuration, never from user
/// input. The URL is re-validated before every execution because the user
/// can change it mid-session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    token: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    /// Build an endpoint with the token taken from `GRAPHSCOUT_BEARER_TOKEN`.
    /// A missing variable yields an empty token; endpoints that do not
    /// require auth still work, authenticated ones fail at the endpoint.
    pub fn from_env(url: impl Into<String>) -> Self {
        let token = std::env::var(BEARER_TOKEN_ENV).unwrap_or_default();
        Self::new(url, token)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Check the endpoint is usable: non-blank and a parsable URL.
    pub fn validate(&self) -> Result<Url, PipelineError> {
        if self.url.trim().is_empty() {
            return Err(PipelineError::EmptyEndpoint);
        }
        Url::parse(&self.url).map_err(|e| PipelineError::InvalidEndpoint(e.to_string()))
    }
}

// ============================================================================
// Structured query
// ============================================================================

/// Top-level operation of a query after prologue stripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
    Select,
    Ask,
    Construct,
    Describe,
    Update,
}

/// A validated selection query.
///
/// Instances are only constructed by [`StructuredQuery::compile`], so holding
/// one is proof the text classified as a `SELECT`. [`wire_text`] returns the
/// exact text the executor sends on the wire.
///
/// [`wire_text`]: StructuredQuery::wire_text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredQuery {
    text: String,
    form: QueryForm,
}

/// Keywords that begin a SPARQL update operation.
const UPDATE_KEYWORDS: &[&str] = &[
    "INSERT", "DELETE", "LOAD", "CLEAR", "DROP", "CREATE", "MOVE", "COPY", "ADD", "WITH",
];

impl StructuredQuery {
    /// Compile query text into a validated selection query.
    ///
    /// Fails with [`PipelineError::InvalidQuery`] when the text is blank,
    /// has no recognizable operation, or is anything other than a `SELECT`
    /// (updates and the other read forms alike).
    pub fn compile(text: &str) -> Result<Self, PipelineError> {
        let form = classify(text)?;
        match form {
            QueryForm::Select => Ok(Self {
                text: text.to_string(),
                form,
            }),
            QueryForm::Update => Err(PipelineError::InvalidQuery(
                "update operations cannot be executed here".to_string(),
            )),
            other => Err(PipelineError::InvalidQuery(format!(
                "only SELECT queries are supported, got {:?}",
                other
            ))),
        }
    }

    /// The exact text sent to the endpoint (the serializer contract).
    pub fn wire_text(&self) -> &str {
        &self.text
    }

    pub fn form(&self) -> QueryForm {
        self.form
    }
}

/// Find the top-level operation keyword, skipping comments and the
/// `PREFIX`/`BASE` prologue.
fn classify(text: &str) -> Result<QueryForm, PipelineError> {
    let stripped = strip_comments(text);
    let mut tokens = stripped.split_whitespace();

    while let Some(token) = tokens.next() {
        let upper = token.to_ascii_uppercase();
        match upper.as_str() {
            "PREFIX" => {
                // PREFIX takes a name and an IRI; skip both.
                tokens.next();
                tokens.next();
            }
            "BASE" => {
                tokens.next();
            }
            "SELECT" => return Ok(QueryForm::Select),
            "ASK" => return Ok(QueryForm::Ask),
            "CONSTRUCT" => return Ok(QueryForm::Construct),
            "DESCRIBE" => return Ok(QueryForm::Describe),
            kw if UPDATE_KEYWORDS.contains(&kw) => return Ok(QueryForm::Update),
            other => {
                return Err(PipelineError::InvalidQuery(format!(
                    "unrecognized query operation: {}",
                    other
                )))
            }
        }
    }

    Err(PipelineError::InvalidQuery("empty query".to_string()))
}

/// Remove `#` comments. A `#` only opens a comment outside `<...>` IRI refs
/// and quoted literals; namespace IRIs like `<...rdf-schema#>` routinely
/// carry one.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut in_iri = false;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for c in line.chars() {
            if let Some(q) = quote {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '#' if !in_iri => break,
                '<' => in_iri = true,
                '>' if in_iri => in_iri = false,
                '"' | '\'' => quote = Some(c),
                _ => {}
            }
            out.push(c);
        }
        out.push('\n');
    }
    out
}
