// =============================================================================
// circuit_breaker.rs - BACK OFF WHEN THE UPSTREAM IS DOWN
// =============================================================================
//
// The fetch client already retries each request a couple of times. The
// breaker sits one level above that: it counts *fetches* that ran out of
// retries. After enough of them in a row, the upstream is presumed down (or
// presumed to be blocking us) and new fetches fail fast for a cooldown
// period instead of queueing behind the rate limiter only to time out.
//
//   Closed   -> requests flow; consecutive exhausted fetches are counted
//   Open     -> nothing is sent until the reset timeout has passed
//   HalfOpen -> probe fetches go through; enough successes close the circuit,
//               any failure reopens it
//
// A failure threshold of zero turns the breaker off.
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        })
    }
}

/// State plus the counter that matters in that state.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Tracker {
    phase: Phase,
    entered_at: Instant,
    trips: u64,
}

impl Tracker {
    fn enter(&mut self, phase: Phase) {
        if matches!(phase, Phase::Open { .. }) && !matches!(self.phase, Phase::Open { .. }) {
            self.trips += 1;
        }
        self.phase = phase;
        self.entered_at = Instant::now();
    }
}

pub struct CircuitBreaker {
    /// Upstream host this breaker guards, for logs.
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    success_threshold: u32,
    tracker: RwLock<Tracker>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        success_threshold: u32,
    ) -> Self {
        let name = name.into();
        info!(
            name = %name,
            failure_threshold = failure_threshold,
            reset_timeout_secs = reset_timeout.as_secs(),
            "Circuit breaker ready"
        );
        let now = Instant::now();
        Self {
            name,
            failure_threshold,
            reset_timeout,
            success_threshold: success_threshold.max(1),
            tracker: RwLock::new(Tracker {
                phase: Phase::Closed { failures: 0 },
                entered_at: now,
                trips: 0,
            }),
        }
    }

    /// A breaker that never opens.
    pub fn disabled(name: impl Into<String>) -> Self {
        Self::new(name, 0, Duration::ZERO, 1)
    }

    fn is_disabled(&self) -> bool {
        self.failure_threshold == 0
    }

    /// May a fetch go out? Moves Open -> HalfOpen once the cooldown is over.
    pub fn allow_request(&self) -> bool {
        if self.is_disabled() {
            return true;
        }
        if let Phase::Closed { .. } | Phase::HalfOpen { .. } = self.tracker.read().phase {
            return true;
        }

        let mut tracker = self.tracker.write();
        match tracker.phase {
            Phase::Open { since } if since.elapsed() < self.reset_timeout => false,
            Phase::Open { .. } => {
                info!(name = %self.name, "Cooldown over, probing upstream");
                tracker.enter(Phase::HalfOpen { successes: 0 });
                true
            }
            // another caller moved it on between the two locks
            _ => true,
        }
    }

    /// The fetch got a definitive answer from the upstream.
    pub fn record_success(&self) {
        if self.is_disabled() {
            return;
        }
        let mut tracker = self.tracker.write();
        match tracker.phase {
            Phase::Closed { failures } if failures > 0 => tracker.phase = Phase::Closed { failures: 0 },
            Phase::HalfOpen { successes } if successes + 1 >= self.success_threshold => {
                info!(name = %self.name, "Upstream answering again, circuit closed");
                tracker.enter(Phase::Closed { failures: 0 });
            }
            Phase::HalfOpen { successes } => tracker.phase = Phase::HalfOpen { successes: successes + 1 },
            // late answer from a fetch admitted before the trip
            Phase::Closed { .. } | Phase::Open { .. } => {}
        }
    }

    /// The fetch ran out of retries.
    pub fn record_failure(&self) {
        if self.is_disabled() {
            return;
        }
        let mut tracker = self.tracker.write();
        let now = Instant::now();
        match tracker.phase {
            Phase::Closed { failures } if failures + 1 >= self.failure_threshold => {
                warn!(
                    name = %self.name,
                    failures = failures + 1,
                    cooldown_secs = self.reset_timeout.as_secs(),
                    "Upstream looks down, circuit opened"
                );
                tracker.enter(Phase::Open { since: now });
            }
            Phase::Closed { failures } => tracker.phase = Phase::Closed { failures: failures + 1 },
            Phase::HalfOpen { .. } => {
                warn!(name = %self.name, "Probe fetch failed, circuit reopened");
                tracker.enter(Phase::Open { since: now });
            }
            Phase::Open { .. } => tracker.phase = Phase::Open { since: now },
        }
    }

    pub fn state(&self) -> CircuitState {
        self.tracker.read().phase.state()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let tracker = self.tracker.read();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: tracker.phase.state(),
            consecutive_failures: match tracker.phase {
                Phase::Closed { failures } => failures,
                _ => 0,
            },
            trips: tracker.trips,
            secs_in_state: tracker.entered_at.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub trips: u64,
    pub secs_in_state: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new("upstream.test", threshold, cooldown, 1)
    }

    #[test]
    fn test_opens_after_consecutive_exhausted_fetches() {
        let cb = breaker(3, Duration::from_secs(30));
        assert!(cb.allow_request());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 2);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_answer_in_between_restarts_the_count() {
        let cb = breaker(2, Duration::from_secs(30));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_probe_outcome_decides_next_state() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().trips, 2);
    }

    #[test]
    fn test_success_threshold_needs_several_probes() {
        let cb = CircuitBreaker::new("upstream.test", 1, Duration::ZERO, 2);
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_zero_threshold_never_opens() {
        let cb = CircuitBreaker::disabled("upstream.test");
        for _ in 0..50 {
            cb.record_failure();
        }
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
