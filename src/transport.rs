// =============================================================================
// transport.rs - THE WIRE
// =============================================================================
//
// The seam between "how we fetch" (pool, limiter, retries) and "what actually
// talks HTTP". Production uses reqwest; tests plug in scripted transports
// that count calls and fail on command.
//
// A transport hands out connection handles. For reqwest a handle is a whole
// `reqwest::Client` allowed exactly one idle keep-alive connection, so
// reusing the handle reuses the TCP/TLS session and dropping it closes the
// session.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;
use url::Url;

/// Status and body of one completed HTTP exchange. Any status, including
/// errors, counts as "completed": the connection did its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport-level failure: the exchange did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// Could not connect, or the connection died mid-exchange.
    Connection(String),
    /// The upstream redirected us in circles. Treated as "no such page".
    RedirectLoop,
    /// The transport's own timer fired.
    TimedOut,
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportFailure::Connection(msg) => write!(f, "{}", msg),
            TransportFailure::RedirectLoop => write!(f, "too many redirects"),
            TransportFailure::TimedOut => write!(f, "transport timeout"),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Conn: Send + Sync + 'static;

    /// Create a fresh handle. Cheap: no I/O happens until the first request.
    fn connect(&self) -> Result<Self::Conn, TransportFailure>;

    /// Whether an idle handle may be handed out again.
    fn is_reusable(&self, _conn: &Self::Conn) -> bool {
        true
    }

    async fn get(
        &self,
        conn: &Self::Conn,
        url: &Url,
        timeout: Duration,
    ) -> Result<RawResponse, TransportFailure>;
}

/// reqwest-backed transport used by the binary.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    user_agent: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Conn = reqwest::Client;

    fn connect(&self) -> Result<reqwest::Client, TransportFailure> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .pool_max_idle_per_host(1)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| TransportFailure::Connection(e.to_string()))
    }

    async fn get(
        &self,
        conn: &reqwest::Client,
        url: &Url,
        timeout: Duration,
    ) -> Result<RawResponse, TransportFailure> {
        let response = conn
            .get(url.clone())
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify_reqwest_error)?;

        trace!(url = %url, status = status, bytes = body.len(), "Upstream response read");

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::TimedOut
    } else if e.is_redirect() {
        TransportFailure::RedirectLoop
    } else {
        TransportFailure::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reqwest_handles_build_without_io() {
        let transport = ReqwestTransport::new("test-agent/1.0", Duration::from_secs(1));
        assert!(transport.connect().is_ok());
    }

    #[test]
    fn test_failure_display_is_readable() {
        assert_eq!(TransportFailure::RedirectLoop.to_string(), "too many redirects");
        assert_eq!(
            TransportFailure::Connection("reset by peer".into()).to_string(),
            "reset by peer"
        );
    }
}
