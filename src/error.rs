// =============================================================================
// error.rs - EVERYTHING THAT CAN GO WRONG BETWEEN US AND THE UPSTREAM
// =============================================================================
//
// Two layers of failure live here.
//
// `AttemptError` is what a single HTTP attempt can die of. These never reach
// an extractor directly: the fetch client retries them, and only when the
// retry budget is spent does one of them surface, wrapped in
// `FetchError::Exhausted`.
//
// `FetchError` is what a whole fetch can end in. `NotFound` is folded into
// `Outcome::NotFound` by the extractors, so the rest are the only typed
// failures a caller of `fetch_and_parse` ever has to look at.
//
// Parse failures are not in here at all. They are field-local and become
// `Normalized::Unparseable`, see assembler.rs.
// =============================================================================

use std::time::Duration;

use thiserror::Error;

/// Why one attempt failed. Every variant is retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    /// Connect, TLS, reset, or body read failure.
    #[error("network failure: {0}")]
    Network(String),

    /// 5xx from the upstream.
    #[error("upstream server error (HTTP {0})")]
    ServerError(u16),

    /// 429. The upstream is telling us to slow down, so we do, then try again.
    #[error("upstream throttled the request (HTTP 429)")]
    TooManyRequests,

    /// The request did not complete within the per-attempt timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Every pooled connection stayed checked out for the whole timeout.
    #[error("no pooled connection became available within {0:?}")]
    PoolTimeout(Duration),
}

/// How a fetch ended when it did not end with a document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// 404/410 or a redirect loop. Definitive; never retried.
    #[error("upstream has no page at {url} (HTTP {status})")]
    NotFound { url: String, status: u16 },

    /// Any other 4xx. Retrying a request the server refuses is pointless.
    #[error("upstream rejected {url} (HTTP {status})")]
    Rejected { url: String, status: u16 },

    #[error("gave up on {url} after {attempts} attempt(s): {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: AttemptError,
    },

    /// The breaker is open; no request was sent.
    #[error("circuit for {upstream} is open, request to {url} not sent")]
    CircuitOpen { upstream: String, url: String },

    #[error("could not build an upstream URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Startup configuration problems. These stop the process before any
/// request is made.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("request timeout must be greater than zero (got {0}s)")]
    ZeroTimeout(f64),

    #[error("pool size must be at least 1")]
    EmptyPool,

    #[error("{name} must be a finite, non-negative, representable number of seconds (got {value})")]
    BadInterval { name: &'static str, value: f64 },

    #[error("base URL {0:?} is not a valid absolute http(s) URL")]
    BadBaseUrl(String),
}
