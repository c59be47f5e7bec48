// =============================================================================
// fetch.rs - THE FETCH CLIENT
// =============================================================================
//
// `fetch(url)` is the only way a page gets downloaded. One fetch is a bounded
// loop of attempts, and every attempt walks the same path:
//
//   1. wait for a rate limiter permit (every attempt, retries included)
//   2. start the attempt clock
//   3. check out a pooled handle (counts against the clock)
//   4. GET (counts against the clock)
//   5. give the handle back, or throw it away if the exchange broke
//
// A connection error on a reused handle means the idle keep-alive died under
// us. That attempt is spent like any other failed one, and the next attempt
// checks out a newly created handle instead of another idle one.
//
// The attempt clock starts after the permit, so time spent queueing behind
// other callers never eats into a request's own timeout.
//
// Outcomes:
//   2xx                      -> the document
//   404 / 410 / redirect loop -> NotFound, no retry
//   429 / 5xx / network / timeout -> retry, up to `max_retries` more attempts
//   any other 4xx            -> Rejected, no retry
//
// A fetch that runs out of attempts is reported to the circuit breaker. Once
// the breaker opens, fetches fail fast with `CircuitOpen`.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::error::{AttemptError, ConfigError, FetchError};
use crate::metrics::MetricsCollector;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::rate_limiter::RateLimiter;
use crate::transport::{RawResponse, Transport, TransportFailure};

/// Status the fetch client reports for a redirect loop.
const REDIRECT_LOOP_STATUS: u16 = 404;

/// Cap on exponential backoff, as a multiple of the base delay.
const MAX_BACKOFF_FACTOR: u32 = 8;

/// Timeout and retry knobs for a fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.request_timeout,
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        }
    }

    /// Delay before retry number `retry` (1-based): base, 2x, 4x, 8x, 8x...
    pub fn backoff_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32
            .checked_shl(retry - 1)
            .unwrap_or(MAX_BACKOFF_FACTOR)
            .min(MAX_BACKOFF_FACTOR);
        self.backoff.saturating_mul(factor)
    }
}

/// One outbound fetch in flight.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub id: Uuid,
    pub url: Url,
    pub attempt: u32,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            attempt: 0,
        }
    }
}

/// A successfully downloaded page.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub request_id: Uuid,
    pub url: Url,
    pub status: u16,
    pub body: Vec<u8>,
    pub attempts: u32,
}

impl FetchedDocument {
    /// Body as text. The upstream serves UTF-8; anything else is replaced
    /// rather than rejected.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What a single HTTP status means for the fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StatusClass {
    Success,
    NotFound,
    Rejected,
    Retry(AttemptError),
}

fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        404 | 410 => StatusClass::NotFound,
        429 => StatusClass::Retry(AttemptError::TooManyRequests),
        500..=599 => StatusClass::Retry(AttemptError::ServerError(status)),
        _ => StatusClass::Rejected,
    }
}

/// How an attempt failed before producing a status.
enum AttemptFailure {
    Retry(AttemptError),
    /// Connection error on a reused handle; retry on a new one.
    DeadHandle(AttemptError),
    RedirectLoop,
}

pub struct FetchClient<T: Transport> {
    base_url: Url,
    pool: Arc<ConnectionPool<T>>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsCollector>,
    policy: FetchPolicy,
}

impl<T: Transport> FetchClient<T> {
    pub fn new(
        config: &Config,
        transport: Arc<T>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_url =
            Url::parse(&config.base_url).map_err(|_| ConfigError::BadBaseUrl(config.base_url.clone()))?;

        let breaker = CircuitBreaker::new(
            base_url.host_str().unwrap_or("upstream"),
            config.circuit_breaker_failure_threshold,
            config.circuit_breaker_reset_timeout,
            config.circuit_breaker_success_threshold,
        );

        Ok(Self {
            base_url,
            pool: Arc::new(ConnectionPool::new(transport, config.pool_size, config.pool_idle_timeout)),
            limiter,
            breaker: Arc::new(breaker),
            metrics,
            policy: FetchPolicy::from_config(config),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<T>> {
        &self.pool
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Resolve a site path (with optional query) against the base URL.
    pub fn url_for(&self, path_and_query: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path_and_query)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path_and_query, e)))
    }

    /// Fetch with the configured timeout and retry budget.
    pub async fn fetch(&self, url: Url) -> Result<FetchedDocument, FetchError> {
        self.fetch_with(url, self.policy.timeout, self.policy.max_retries).await
    }

    pub async fn fetch_with(
        &self,
        url: Url,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<FetchedDocument, FetchError> {
        self.metrics.increment_fetches_started();

        if !self.breaker.allow_request() {
            self.metrics.increment_circuit_open();
            warn!(url = %url, upstream = self.breaker.name(), "Circuit open, fetch not sent");
            return Err(FetchError::CircuitOpen {
                upstream: self.breaker.name().to_string(),
                url: url.to_string(),
            });
        }

        let mut request = FetchRequest::new(url);
        let total_attempts = max_retries.saturating_add(1);
        let mut last_error = AttemptError::Network("no attempt made".into());
        let mut fresh_handle = false;

        while request.attempt < total_attempts {
            request.attempt += 1;

            if request.attempt > 1 {
                self.metrics.increment_retries();
                let delay = self.policy.backoff_for(request.attempt - 1);
                if !delay.is_zero() {
                    debug!(request_id = %request.id, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }

            self.metrics.increment_attempts();

            let outcome = self.attempt(&request, timeout, fresh_handle).await;
            fresh_handle = false;
            let failure = match outcome {
                Ok(response) => match classify_status(response.status) {
                    StatusClass::Success => {
                        self.breaker.record_success();
                        self.metrics.increment_fetches_succeeded();
                        debug!(
                            request_id = %request.id,
                            url = %request.url,
                            attempt = request.attempt,
                            status = response.status,
                            bytes = response.body.len(),
                            "Fetched"
                        );
                        return Ok(FetchedDocument {
                            request_id: request.id,
                            url: request.url,
                            status: response.status,
                            body: response.body,
                            attempts: request.attempt,
                        });
                    }
                    StatusClass::NotFound => {
                        return Err(self.not_found(&request, response.status));
                    }
                    StatusClass::Rejected => {
                        self.breaker.record_success();
                        self.metrics.increment_rejected();
                        warn!(request_id = %request.id, url = %request.url, status = response.status, "Upstream rejected request");
                        return Err(FetchError::Rejected {
                            url: request.url.to_string(),
                            status: response.status,
                        });
                    }
                    StatusClass::Retry(err) => err,
                },
                Err(AttemptFailure::RedirectLoop) => {
                    return Err(self.not_found(&request, REDIRECT_LOOP_STATUS));
                }
                Err(AttemptFailure::Retry(err)) => err,
                Err(AttemptFailure::DeadHandle(err)) => {
                    self.metrics.increment_stale_redos();
                    fresh_handle = true;
                    err
                }
            };

            warn!(
                request_id = %request.id,
                url = %request.url,
                attempt = request.attempt,
                of = total_attempts,
                error = %failure,
                "Attempt failed"
            );
            last_error = failure;
        }

        self.breaker.record_failure();
        self.metrics.increment_exhausted();
        info!(request_id = %request.id, url = %request.url, attempts = request.attempt, "Fetch exhausted its retries");

        Err(FetchError::Exhausted {
            url: request.url.to_string(),
            attempts: request.attempt,
            last: last_error,
        })
    }

    fn not_found(&self, request: &FetchRequest, status: u16) -> FetchError {
        self.breaker.record_success();
        self.metrics.increment_not_found();
        debug!(request_id = %request.id, url = %request.url, status = status, "Upstream has no such page");
        FetchError::NotFound {
            url: request.url.to_string(),
            status,
        }
    }

    /// One permit, one handle, one GET.
    async fn attempt(
        &self,
        request: &FetchRequest,
        timeout: Duration,
        fresh: bool,
    ) -> Result<RawResponse, AttemptFailure> {
        let permit = self.limiter.permit().await;
        let deadline = Instant::now() + timeout;

        debug!(
            request_id = %request.id,
            attempt = request.attempt,
            waited_ms = permit.waited.as_millis() as u64,
            fresh = fresh,
            "Permit granted"
        );

        let conn = self.checkout(deadline, timeout, fresh).await?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let exchange = tokio::time::timeout_at(
            deadline,
            self.pool.transport().get(conn.conn(), &request.url, remaining),
        )
        .await;

        match exchange {
            Ok(Ok(response)) => {
                conn.release();
                Ok(response)
            }
            Ok(Err(failure)) => {
                let reused = conn.is_reused();
                if reused {
                    debug!(request_id = %request.id, conn_id = conn.id(), "Reused handle failed, discarding");
                }
                self.discard(conn);
                Err(match failure {
                    TransportFailure::RedirectLoop => AttemptFailure::RedirectLoop,
                    TransportFailure::TimedOut => {
                        self.metrics.increment_attempt_timeouts();
                        AttemptFailure::Retry(AttemptError::Timeout(timeout))
                    }
                    TransportFailure::Connection(msg) if reused => {
                        AttemptFailure::DeadHandle(AttemptError::Network(msg))
                    }
                    TransportFailure::Connection(msg) => AttemptFailure::Retry(AttemptError::Network(msg)),
                })
            }
            Err(_) => {
                self.discard(conn);
                self.metrics.increment_attempt_timeouts();
                Err(AttemptFailure::Retry(AttemptError::Timeout(timeout)))
            }
        }
    }

    async fn checkout(
        &self,
        deadline: Instant,
        timeout: Duration,
        fresh: bool,
    ) -> Result<PooledConnection<T::Conn>, AttemptFailure> {
        let acquire = async {
            if fresh {
                self.pool.acquire_fresh().await
            } else {
                self.pool.acquire().await
            }
        };

        match tokio::time::timeout_at(deadline, acquire).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(failure)) => Err(AttemptFailure::Retry(AttemptError::Network(failure.to_string()))),
            Err(_) => {
                self.metrics.increment_pool_timeouts();
                Err(AttemptFailure::Retry(AttemptError::PoolTimeout(timeout)))
            }
        }
    }

    fn discard(&self, conn: PooledConnection<T::Conn>) {
        self.metrics.increment_discarded();
        conn.discard();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use portable_atomic::{AtomicU32, AtomicU64, Ordering};
    use std::collections::{HashSet, VecDeque};

    /// What the scripted upstream does with one GET.
    #[derive(Debug, Clone)]
    pub(crate) enum Step {
        Status(u16),
        Page(u16, String),
        Fail(TransportFailure),
        Hang,
    }

    /// Plays back a script of responses, then repeats `fallback` forever.
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        fallback: Step,
        pub calls: AtomicU32,
        connects: AtomicU64,
        pub dead_conns: Mutex<HashSet<u64>>,
        pub call_times: Mutex<Vec<Instant>>,
        pub urls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Step>, fallback: Step) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
                connects: AtomicU64::new(0),
                dead_conns: Mutex::new(HashSet::new()),
                call_times: Mutex::new(Vec::new()),
                urls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn always(step: Step) -> Self {
            Self::new(Vec::new(), step)
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        type Conn = u64;

        fn connect(&self) -> Result<u64, TransportFailure> {
            Ok(self.connects.fetch_add(1, Ordering::Relaxed))
        }

        async fn get(&self, conn: &u64, url: &Url, _timeout: Duration) -> Result<RawResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.call_times.lock().push(Instant::now());
            self.urls.lock().push(url.to_string());

            if self.dead_conns.lock().contains(conn) {
                return Err(TransportFailure::Connection("connection reset by peer".into()));
            }

            let step = self.script.lock().pop_front().unwrap_or_else(|| self.fallback.clone());
            match step {
                Step::Status(status) => Ok(RawResponse { status, body: Vec::new() }),
                Step::Page(status, html) => Ok(RawResponse { status, body: html.into_bytes() }),
                Step::Fail(failure) => Err(failure),
                Step::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    pub(crate) fn test_config(max_retries: u32) -> Config {
        Config {
            base_url: "https://upstream.test".into(),
            max_retries,
            request_timeout: Duration::from_secs(2),
            min_request_interval: Duration::from_millis(500),
            retry_backoff: Duration::ZERO,
            pool_size: 2,
            ..Config::default()
        }
    }

    fn client(config: &Config, transport: ScriptedTransport) -> FetchClient<ScriptedTransport> {
        FetchClient::new(
            config,
            Arc::new(transport),
            Arc::new(RateLimiter::new(config.min_request_interval)),
            Arc::new(MetricsCollector::new()),
        )
        .unwrap()
    }

    fn page(client: &FetchClient<ScriptedTransport>) -> Url {
        client.url_for("/-/profil/spieler/1").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_upstream_gets_exactly_r_plus_one_attempts() {
        for retries in [0u32, 1, 2, 4] {
            let c = client(&test_config(retries), ScriptedTransport::always(Step::Status(503)));
            let err = c.fetch(page(&c)).await.unwrap_err();

            assert_eq!(c.pool.transport().calls(), retries + 1);
            match err {
                FetchError::Exhausted { attempts, last, .. } => {
                    assert_eq!(attempts, retries + 1);
                    assert_eq!(last, AttemptError::ServerError(503));
                }
                other => panic!("expected Exhausted, got {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_never_retried() {
        let c = client(&test_config(3), ScriptedTransport::always(Step::Status(404)));
        let err = c.fetch(page(&c)).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(c.pool.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_loop_is_not_found() {
        let c = client(
            &test_config(3),
            ScriptedTransport::always(Step::Fail(TransportFailure::RedirectLoop)),
        );
        let err = c.fetch(page(&c)).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(c.pool.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_rejected_without_retry() {
        let c = client(&test_config(3), ScriptedTransport::always(Step::Status(403)));
        let err = c.fetch(page(&c)).await.unwrap_err();
        assert!(matches!(err, FetchError::Rejected { status: 403, .. }));
        assert_eq!(c.pool.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_and_network_errors_are_retried() {
        let transport = ScriptedTransport::new(
            vec![
                Step::Status(429),
                Step::Fail(TransportFailure::Connection("refused".into())),
            ],
            Step::Page(200, "<html></html>".into()),
        );
        let c = client(&test_config(2), transport);
        let doc = c.fetch(page(&c)).await.unwrap();
        assert_eq!(doc.attempts, 3);
        assert_eq!(doc.text(), "<html></html>");
        assert_eq!(c.metrics.snapshot().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_per_attempt_and_discards_the_handle() {
        let transport = ScriptedTransport::new(vec![Step::Hang], Step::Status(200));
        let c = client(&test_config(1), transport);

        let started = Instant::now();
        let doc = c.fetch(page(&c)).await.unwrap();
        assert_eq!(doc.attempts, 2);
        assert!(started.elapsed() >= Duration::from_secs(2));

        let pool = c.pool.snapshot();
        assert_eq!(pool.discarded, 1);
        assert_eq!(pool.released, 1);
        assert_eq!(pool.in_use, 0);
        assert_eq!(c.metrics.snapshot().attempt_timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_upstream_exhausts_with_timeout() {
        let c = client(&test_config(1), ScriptedTransport::always(Step::Hang));
        let err = c.fetch(page(&c)).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Exhausted { attempts: 2, last: AttemptError::Timeout(_), .. }
        ));
        assert_eq!(c.pool.snapshot().in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_retry_waits_for_its_own_permit() {
        let c = client(&test_config(3), ScriptedTransport::always(Step::Status(502)));
        let _ = c.fetch(page(&c)).await;

        let times = c.pool.transport().call_times.lock().clone();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_reused_handle_is_retried_on_a_new_one() {
        let c = client(&test_config(1), ScriptedTransport::always(Step::Status(200)));
        c.fetch(page(&c)).await.unwrap();

        // the idle handle 0 is now dead on the wire
        c.pool.transport().dead_conns.lock().insert(0);

        let doc = c.fetch(page(&c)).await.unwrap();
        assert_eq!(doc.attempts, 2);

        let pool = c.pool.snapshot();
        assert_eq!(pool.created, 2);
        assert_eq!(pool.discarded, 1);
        assert_eq!(c.metrics.snapshot().stale_connection_redos, 1);
        assert_eq!(c.metrics.snapshot().retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refusing_upstream_after_warm_pool_keeps_budget_and_spacing() {
        let transport = ScriptedTransport::new(
            vec![Step::Status(200)],
            Step::Fail(TransportFailure::Connection("refused".into())),
        );
        let c = client(&test_config(2), transport);
        c.fetch(page(&c)).await.unwrap();
        assert_eq!(c.pool.snapshot().idle, 1);

        let err = c.fetch(page(&c)).await.unwrap_err();
        assert!(
            matches!(err, FetchError::Exhausted { attempts: 3, last: AttemptError::Network(_), .. }),
            "{:?}",
            err
        );

        let times = c.pool.transport().call_times.lock().clone();
        // one warm-up request plus exactly R+1
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_exhausted_fetches() {
        let mut config = test_config(0);
        config.circuit_breaker_failure_threshold = 2;
        let c = client(&config, ScriptedTransport::always(Step::Status(500)));

        for _ in 0..2 {
            assert!(matches!(c.fetch(page(&c)).await, Err(FetchError::Exhausted { .. })));
        }
        let err = c.fetch(page(&c)).await.unwrap_err();
        assert!(matches!(err, FetchError::CircuitOpen { .. }));
        assert_eq!(c.pool.transport().calls(), 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = FetchPolicy {
            timeout: Duration::from_secs(1),
            max_retries: 10,
            backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(9), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(8));
    }

    #[test]
    fn test_url_for_keeps_query() {
        let c = client(&test_config(0), ScriptedTransport::always(Step::Status(200)));
        let url = c.url_for("/schnellsuche/ergebnis/schnellsuche?query=m%C3%BCller&Spieler_page=2").unwrap();
        assert_eq!(url.host_str(), Some("upstream.test"));
        assert_eq!(url.query(), Some("query=m%C3%BCller&Spieler_page=2"));
    }
}
