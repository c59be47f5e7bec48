// =============================================================================
// metrics.rs - COUNTERS FOR THE FETCH AND EXTRACTION PIPELINE
// =============================================================================
//
// Lock-free counters bumped from the fetch client and the extractors. Nobody
// reads them on the hot path; the binary logs one snapshot when a run ends,
// and tests use them to count what actually happened on the wire.
// =============================================================================

use std::time::Instant;

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// How one extraction ended, for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLabel {
    Complete,
    Degraded,
    NotFound,
    Failed,
}

#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub fetches_started: u64,
    pub fetches_succeeded: u64,
    pub attempts: u64,
    pub retries: u64,
    pub attempt_timeouts: u64,
    pub pool_timeouts: u64,
    pub connections_discarded: u64,
    pub stale_connection_redos: u64,
    pub not_found: u64,
    pub rejected: u64,
    pub exhausted: u64,
    pub circuit_open_rejections: u64,
    pub records_complete: u64,
    pub records_degraded: u64,
    pub records_not_found: u64,
    pub records_failed: u64,
    pub player_extractions: u64,
    pub club_extractions: u64,
    pub competition_extractions: u64,
    pub transfer_extractions: u64,
    pub search_extractions: u64,
    pub uptime_seconds: u64,
    pub attempts_per_minute: f64,
}

#[derive(Default)]
pub struct MetricsCollector {
    fetches_started: AtomicU64,
    fetches_succeeded: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    attempt_timeouts: AtomicU64,
    pool_timeouts: AtomicU64,
    connections_discarded: AtomicU64,
    stale_connection_redos: AtomicU64,
    not_found: AtomicU64,
    rejected: AtomicU64,
    exhausted: AtomicU64,
    circuit_open_rejections: AtomicU64,
    records_complete: AtomicU64,
    records_degraded: AtomicU64,
    records_not_found: AtomicU64,
    records_failed: AtomicU64,
    player_extractions: AtomicU64,
    club_extractions: AtomicU64,
    competition_extractions: AtomicU64,
    transfer_extractions: AtomicU64,
    search_extractions: AtomicU64,
    start_time: Option<Instant>,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Self::default()
        }
    }

    pub fn increment_fetches_started(&self) {
        bump(&self.fetches_started);
    }

    pub fn increment_fetches_succeeded(&self) {
        bump(&self.fetches_succeeded);
    }

    pub fn increment_attempts(&self) {
        bump(&self.attempts);
    }

    pub fn increment_retries(&self) {
        bump(&self.retries);
    }

    pub fn increment_attempt_timeouts(&self) {
        bump(&self.attempt_timeouts);
    }

    pub fn increment_pool_timeouts(&self) {
        bump(&self.pool_timeouts);
    }

    pub fn increment_discarded(&self) {
        bump(&self.connections_discarded);
    }

    pub fn increment_stale_redos(&self) {
        bump(&self.stale_connection_redos);
    }

    pub fn increment_not_found(&self) {
        bump(&self.not_found);
    }

    pub fn increment_rejected(&self) {
        bump(&self.rejected);
    }

    pub fn increment_exhausted(&self) {
        bump(&self.exhausted);
    }

    pub fn increment_circuit_open(&self) {
        bump(&self.circuit_open_rejections);
    }

    /// Count one finished extraction, by record kind and by how it ended.
    pub fn record_extraction(&self, kind: &str, label: OutcomeLabel) {
        match kind {
            "player" => bump(&self.player_extractions),
            "club" | "club_players" => bump(&self.club_extractions),
            "competition" => bump(&self.competition_extractions),
            "player_transfers" => bump(&self.transfer_extractions),
            k if k.starts_with("search") => bump(&self.search_extractions),
            _ => {}
        }
        match label {
            OutcomeLabel::Complete => bump(&self.records_complete),
            OutcomeLabel::Degraded => bump(&self.records_degraded),
            OutcomeLabel::NotFound => bump(&self.records_not_found),
            OutcomeLabel::Failed => bump(&self.records_failed),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);
        let attempts = self.attempts.load(Ordering::Relaxed);
        let attempts_per_minute = if uptime > 0 {
            (attempts as f64 / uptime as f64) * 60.0
        } else {
            0.0
        };

        MetricsSnapshot {
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::Relaxed),
            attempts,
            retries: self.retries.load(Ordering::Relaxed),
            attempt_timeouts: self.attempt_timeouts.load(Ordering::Relaxed),
            pool_timeouts: self.pool_timeouts.load(Ordering::Relaxed),
            connections_discarded: self.connections_discarded.load(Ordering::Relaxed),
            stale_connection_redos: self.stale_connection_redos.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            circuit_open_rejections: self.circuit_open_rejections.load(Ordering::Relaxed),
            records_complete: self.records_complete.load(Ordering::Relaxed),
            records_degraded: self.records_degraded.load(Ordering::Relaxed),
            records_not_found: self.records_not_found.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            player_extractions: self.player_extractions.load(Ordering::Relaxed),
            club_extractions: self.club_extractions.load(Ordering::Relaxed),
            competition_extractions: self.competition_extractions.load(Ordering::Relaxed),
            transfer_extractions: self.transfer_extractions.load(Ordering::Relaxed),
            search_extractions: self.search_extractions.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            attempts_per_minute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_counts_by_kind_and_outcome() {
        let metrics = MetricsCollector::new();
        metrics.record_extraction("player", OutcomeLabel::Complete);
        metrics.record_extraction("club_players", OutcomeLabel::Degraded);
        metrics.record_extraction("search_clubs", OutcomeLabel::NotFound);

        let snap = metrics.snapshot();
        assert_eq!(snap.player_extractions, 1);
        assert_eq!(snap.club_extractions, 1);
        assert_eq!(snap.search_extractions, 1);
        assert_eq!(snap.records_complete, 1);
        assert_eq!(snap.records_degraded, 1);
        assert_eq!(snap.records_not_found, 1);
        assert_eq!(snap.records_failed, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = MetricsCollector::new();
        metrics.increment_attempts();
        metrics.increment_retries();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["retries"], 1);
    }
}
