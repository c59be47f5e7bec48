// =============================================================================
// rate_limiter.rs - ONE REQUEST AT A TIME, WITH A GAP
// =============================================================================
//
// Every outbound request to the upstream, from every extractor and every
// concurrent caller, goes through `permit()`. Two permits are never granted
// less than `min_interval` apart.
//
// The mechanism is slot reservation. Under the lock a caller looks at the
// last granted slot, books `max(now, last + interval)` for itself and writes
// it back. Then it lets go of the lock and sleeps until its slot. The lock is
// held for a handful of instructions and never across an await, so a
// parking_lot mutex is the right tool.
//
// A caller that is cancelled while sleeping leaves its slot booked. The gap
// after it gets longer, never shorter.
// =============================================================================

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

static UPSTREAM_LIMITER: OnceLock<Arc<RateLimiter>> = OnceLock::new();

/// Spacing enforcer for requests to a single upstream host.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    /// The slot most recently handed out. Only ever read and written together.
    last_granted: Mutex<Option<Instant>>,
}

/// Proof that the caller waited its turn.
#[derive(Debug, Clone, Copy)]
pub struct Permit {
    pub granted_at: Instant,
    /// How long the caller was held back.
    pub waited: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_granted: Mutex::new(None),
        }
    }

    /// The process-wide limiter. The first call fixes the interval; later
    /// calls with a different interval get the existing instance and a
    /// warning.
    pub fn global(min_interval: Duration) -> Arc<RateLimiter> {
        let limiter = UPSTREAM_LIMITER.get_or_init(|| {
            debug!(min_interval_ms = min_interval.as_millis() as u64, "Installing upstream rate limiter");
            Arc::new(RateLimiter::new(min_interval))
        });
        if limiter.min_interval != min_interval {
            warn!(
                installed_ms = limiter.min_interval.as_millis() as u64,
                requested_ms = min_interval.as_millis() as u64,
                "Upstream rate limiter already installed with a different interval"
            );
        }
        Arc::clone(limiter)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until it is safe to send the next request.
    pub async fn permit(&self) -> Permit {
        let requested_at = Instant::now();

        let slot = {
            let mut last = self.last_granted.lock();
            let slot = match *last {
                Some(prev) => (prev + self.min_interval).max(requested_at),
                None => requested_at,
            };
            *last = Some(slot);
            slot
        };

        if slot > requested_at {
            trace!(
                wait_ms = (slot - requested_at).as_millis() as u64,
                "Waiting for rate limiter slot"
            );
            tokio::time::sleep_until(slot).await;
        }

        Permit {
            granted_at: slot,
            waited: slot.saturating_duration_since(requested_at),
        }
    }
}
