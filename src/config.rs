// =============================================================================
// config.rs - THE KNOBS
// =============================================================================
//
// Three layers, resolved one option at a time:
//
//   built-in defaults  <  environment (TM_ENGINE_*, .env honoured)  <  CLI flags
//
// Setting `--timeout 5` on the command line overrides the timeout and nothing
// else; retries, rate limit and pool size keep whatever the environment or
// the defaults said. There is no "flags replace the whole config" mode.
//
// The defaults are the ones the upstream has tolerated for years: ten seconds
// per attempt, half a second between requests, two retries.
// =============================================================================

use std::env;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://www.transfermarkt.com";

/// A desktop browser UA. The upstream serves a stripped page (or nothing) to
/// anything that announces itself as a bot.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_RATE_LIMIT_SECS: f64 = 0.5;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_RETRY_BACKOFF_SECS: f64 = 1.0;
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: f64 = 90.0;

/// Every tunable the engine reads. Built once at startup, then shared behind
/// an `Arc` and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // =========================================================================
    // UPSTREAM
    // =========================================================================
    /// Scheme + host every extractor URL is built on.
    pub base_url: String,

    pub user_agent: String,

    // =========================================================================
    // FETCH POLICY
    // =========================================================================
    /// Per-attempt timeout. Covers connection checkout plus the request and
    /// body read; it does not accumulate across retries.
    pub request_timeout: Duration,

    /// Minimum spacing between any two outbound requests, process-wide.
    /// Zero disables spacing.
    pub min_request_interval: Duration,

    /// Additional attempts after the first. Zero means exactly one attempt.
    pub max_retries: u32,

    /// Base delay before a retry; doubles per retry, capped at 8x.
    pub retry_backoff: Duration,

    // =========================================================================
    // CONNECTION POOL
    // =========================================================================
    pub pool_size: usize,

    /// Idle handles older than this are thrown away at checkout rather than
    /// reused, since the server has almost certainly closed them.
    pub pool_idle_timeout: Duration,

    // =========================================================================
    // CIRCUIT BREAKER
    // Counts exhausted fetches, not attempts.
    // =========================================================================
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_reset_timeout: Duration,
    pub circuit_breaker_success_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
            min_request_interval: Duration::from_secs_f64(DEFAULT_RATE_LIMIT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_secs_f64(DEFAULT_RETRY_BACKOFF_SECS),
            pool_size: DEFAULT_POOL_SIZE,
            pool_idle_timeout: Duration::from_secs_f64(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_reset_timeout: Duration::from_secs(60),
            circuit_breaker_success_threshold: 1,
        }
    }
}

/// Command-line overrides. Every field is optional; `None` means "leave the
/// environment/default value alone".
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigFlags {
    /// Request timeout in seconds (per attempt)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Minimum seconds between requests to the upstream
    #[arg(long = "rate-limit", value_name = "SECS")]
    pub rate_limit: Option<f64>,

    /// Maximum number of retries for failed requests
    #[arg(long = "max-retries", value_name = "N")]
    pub max_retries: Option<u32>,

    /// Number of pooled upstream connections
    #[arg(long = "pool-size", value_name = "N")]
    pub pool_size: Option<usize>,

    /// Base delay in seconds before the first retry
    #[arg(long = "retry-backoff", value_name = "SECS")]
    pub retry_backoff: Option<f64>,

    /// Upstream base URL
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,
}

impl Config {
    /// Defaults overlaid with `TM_ENGINE_*` environment variables. A `.env`
    /// file in the working directory is read first if there is one.
    ///
    /// Malformed values are logged and ignored rather than fatal; validation
    /// of the final, merged config happens in [`Config::with_flags`].
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with the variable source injected.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();

        Config {
            base_url: env_or_default(&lookup, "TM_ENGINE_BASE_URL", &d.base_url),
            user_agent: env_or_default(&lookup, "TM_ENGINE_USER_AGENT", &d.user_agent),

            request_timeout: env_secs(
                &lookup,
                "TM_ENGINE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
                false,
            ),
            min_request_interval: env_secs(
                &lookup,
                "TM_ENGINE_REQUEST_RATE_LIMIT_SECS",
                DEFAULT_RATE_LIMIT_SECS,
                true,
            ),
            max_retries: env_parsed(&lookup, "TM_ENGINE_REQUEST_MAX_RETRIES", d.max_retries),
            retry_backoff: env_secs(
                &lookup,
                "TM_ENGINE_RETRY_BACKOFF_SECS",
                DEFAULT_RETRY_BACKOFF_SECS,
                true,
            ),

            pool_size: env_parsed(&lookup, "TM_ENGINE_POOL_SIZE", d.pool_size).max(1),
            pool_idle_timeout: env_secs(
                &lookup,
                "TM_ENGINE_POOL_IDLE_TIMEOUT_SECS",
                DEFAULT_POOL_IDLE_TIMEOUT_SECS,
                false,
            ),

            circuit_breaker_failure_threshold: env_parsed(
                &lookup,
                "TM_ENGINE_CB_FAILURE_THRESHOLD",
                d.circuit_breaker_failure_threshold,
            ),
            circuit_breaker_reset_timeout: Duration::from_secs(env_parsed(
                &lookup,
                "TM_ENGINE_CB_RESET_TIMEOUT_SECS",
                d.circuit_breaker_reset_timeout.as_secs(),
            )),
            circuit_breaker_success_threshold: env_parsed(
                &lookup,
                "TM_ENGINE_CB_SUCCESS_THRESHOLD",
                d.circuit_breaker_success_threshold,
            ),
        }
    }

    /// Apply command-line overrides option by option, then validate.
    pub fn with_flags(mut self, flags: &ConfigFlags) -> Result<Self, ConfigError> {
        if let Some(secs) = flags.timeout {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::ZeroTimeout(secs));
            }
            self.request_timeout = checked_secs("timeout", secs)?;
        }
        if let Some(secs) = flags.rate_limit {
            self.min_request_interval = checked_secs("rate limit", secs)?;
        }
        if let Some(n) = flags.max_retries {
            self.max_retries = n;
        }
        if let Some(n) = flags.pool_size {
            self.pool_size = n;
        }
        if let Some(secs) = flags.retry_backoff {
            self.retry_backoff = checked_secs("retry backoff", secs)?;
        }
        if let Some(url) = &flags.base_url {
            self.base_url = url.clone();
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout(0.0));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        match Url::parse(&self.base_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.has_host() => Ok(()),
            _ => Err(ConfigError::BadBaseUrl(self.base_url.clone())),
        }
    }
}

fn checked_secs(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::BadInterval { name, value })
}

fn env_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = key, value = raw.as_str(), "Ignoring malformed environment value");
            default
        }),
    }
}

/// Seconds as a float. Negative, NaN, too large and (unless `allow_zero`)
/// zero values fall back to the default.
fn env_secs<F>(lookup: &F, key: &str, default: f64, allow_zero: bool) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let fallback = Duration::try_from_secs_f64(default).unwrap_or_default();
    let secs = env_parsed(lookup, key, default);
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if allow_zero || !d.is_zero() => d,
        _ => {
            warn!(key = key, value = secs, "Ignoring out-of-range duration");
            fallback
        }
    }
}
