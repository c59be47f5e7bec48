// =============================================================================
// extractors/mod.rs - ONE MODULE PER KIND OF PAGE
// =============================================================================
//
// Every extractor follows the same path:
//
//   id -> validate -> canonical URL -> FetchClient::fetch -> parse -> Outcome
//
// The fetch half is shared and lives here in `extract`. The parse half is a
// plain synchronous function per page kind, so a parsed document never lives
// across an await and can be tested straight from fixture HTML.
//
// A 404 from the upstream, an id that cannot be valid, and a page without its
// identity anchor (the header name, the results box) all come out as
// `Outcome::NotFound`. Only the fetch failures the caller might want to retry
// later (exhausted retries, open circuit, rejected request) are `Err`.
// =============================================================================

pub mod club;
pub mod competition;
pub mod player;
pub mod search;
pub mod transfers;

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assembler::Outcome;
use crate::error::FetchError;
use crate::fetch::{FetchClient, FetchedDocument};
use crate::metrics::OutcomeLabel;
use crate::transport::Transport;

pub use search::SearchKind;

/// Ids are opaque but always short alphanumeric tokens ("418560", "GB1").
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 32 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Drop the site's "no value" placeholders before normalizing.
pub(crate) fn known(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !matches!(s.as_str(), "-" | "--" | "?" | "k. A." | "N/A"))
}

/// Fetch `url` and run `parse` over the document. 404s become `NotFound`.
pub(crate) async fn extract<T, R, F>(
    client: &FetchClient<T>,
    kind: &'static str,
    key: &str,
    path: String,
    parse: F,
) -> Result<Outcome<R>, FetchError>
where
    T: Transport,
    F: FnOnce(&FetchedDocument) -> Outcome<R>,
{
    let url = client.url_for(&path)?;

    let outcome = match client.fetch(url).await {
        Ok(doc) => parse(&doc),
        Err(e) if e.is_not_found() => Outcome::NotFound,
        Err(e) => {
            client.metrics().record_extraction(kind, OutcomeLabel::Failed);
            warn!(kind = kind, key = key, error = %e, "Extraction failed");
            return Err(e);
        }
    };

    client.metrics().record_extraction(kind, outcome.label());
    match &outcome {
        Outcome::Degraded { missing, .. } => {
            info!(kind = kind, key = key, missing = ?missing, "Record degraded")
        }
        Outcome::NotFound => debug!(kind = kind, key = key, "Nothing found"),
        Outcome::Complete { .. } => debug!(kind = kind, key = key, "Record complete"),
    }
    Ok(outcome)
}

/// `NotFound` for an id that cannot exist, without touching the upstream.
pub(crate) fn reject_id<T: Transport, R>(client: &FetchClient<T>, kind: &'static str, id: &str) -> Outcome<R> {
    debug!(kind = kind, id = id, "Invalid id, not fetching");
    client.metrics().record_extraction(kind, OutcomeLabel::NotFound);
    Outcome::NotFound
}

/// One unit of work for the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Player(String),
    PlayerTransfers(String),
    Club(String),
    ClubPlayers { id: String, season: Option<u16> },
    Competition { id: String, season: Option<u16> },
    Search { kind: SearchKind, query: String, page: u32 },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Player(_) => "player",
            Job::PlayerTransfers(_) => "player_transfers",
            Job::Club(_) => "club",
            Job::ClubPlayers { .. } => "club_players",
            Job::Competition { .. } => "competition",
            Job::Search { kind, .. } => kind.job_kind(),
        }
    }

    pub fn key(&self) -> String {
        match self {
            Job::Player(id) | Job::PlayerTransfers(id) | Job::Club(id) => id.clone(),
            Job::ClubPlayers { id, .. } | Job::Competition { id, .. } => id.clone(),
            Job::Search { query, .. } => query.clone(),
        }
    }
}

/// A finished job, ready to be written out as one JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub kind: &'static str,
    pub id: String,
    pub outcome: serde_json::Value,
}

fn to_json<R: Serialize>(result: Result<Outcome<R>, FetchError>) -> serde_json::Value {
    let failed = |error: String| serde_json::json!({ "status": "failed", "error": error });
    match result {
        Ok(outcome) => serde_json::to_value(&outcome).unwrap_or_else(|e| failed(e.to_string())),
        Err(e) => failed(e.to_string()),
    }
}

/// All extractors behind one shared fetch client.
pub struct Extractors<T: Transport> {
    client: Arc<FetchClient<T>>,
}

impl<T: Transport> Clone for Extractors<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<T: Transport> Extractors<T> {
    pub fn new(client: Arc<FetchClient<T>>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<FetchClient<T>> {
        &self.client
    }

    pub async fn player(&self, id: &str) -> Result<Outcome<crate::models::PlayerProfile>, FetchError> {
        player::fetch_and_parse(&self.client, id).await
    }

    pub async fn player_transfers(&self, id: &str) -> Result<Outcome<crate::models::PlayerTransfers>, FetchError> {
        transfers::fetch_and_parse(&self.client, id).await
    }

    pub async fn club(&self, id: &str) -> Result<Outcome<crate::models::ClubProfile>, FetchError> {
        club::fetch_and_parse(&self.client, id).await
    }

    pub async fn club_players(
        &self,
        id: &str,
        season: Option<u16>,
    ) -> Result<Outcome<crate::models::ClubPlayers>, FetchError> {
        club::fetch_and_parse_players(&self.client, id, season).await
    }

    pub async fn competition(
        &self,
        id: &str,
        season: Option<u16>,
    ) -> Result<Outcome<crate::models::CompetitionClubs>, FetchError> {
        competition::fetch_and_parse(&self.client, id, season).await
    }

    pub async fn run(&self, job: Job) -> JobResult {
        let kind = job.kind();
        let id = job.key();
        let outcome = match &job {
            Job::Player(id) => to_json(self.player(id).await),
            Job::PlayerTransfers(id) => to_json(self.player_transfers(id).await),
            Job::Club(id) => to_json(self.club(id).await),
            Job::ClubPlayers { id, season } => to_json(self.club_players(id, *season).await),
            Job::Competition { id, season } => to_json(self.competition(id, *season).await),
            Job::Search { kind, query, page } => match kind {
                SearchKind::Players => to_json(search::players(&self.client, query, *page).await),
                SearchKind::Clubs => to_json(search::clubs(&self.client, query, *page).await),
                SearchKind::Competitions => to_json(search::competitions(&self.client, query, *page).await),
            },
        };
        JobResult { kind, id, outcome }
    }

    /// Run `jobs` on their own tasks, at most `concurrency` at a time, and
    /// yield each result as soon as it is done.
    pub fn run_all(&self, jobs: Vec<Job>, concurrency: usize) -> impl Stream<Item = JobResult> + Send + 'static {
        let this = self.clone();
        stream::iter(jobs)
            .map(move |job| {
                let this = this.clone();
                let kind = job.kind();
                let id = job.key();
                async move {
                    match tokio::spawn(async move { this.run(job).await }).await {
                        Ok(result) => result,
                        Err(e) => {
                            warn!(kind = kind, key = %id, error = %e, "Job task died");
                            JobResult {
                                kind,
                                id,
                                outcome: serde_json::json!({ "status": "failed", "error": e.to_string() }),
                            }
                        }
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id("418560"));
        assert!(is_valid_id("GB1"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../etc"));
        assert!(!is_valid_id("12 34"));
        assert!(!is_valid_id("a/b"));
    }

    #[test]
    fn test_known_drops_placeholders() {
        assert_eq!(known(Some("-".into())), None);
        assert_eq!(known(Some("?".into())), None);
        assert_eq!(known(Some("Jun 30, 2027".into())), Some("Jun 30, 2027".into()));
    }

    #[test]
    fn test_job_kinds_and_keys() {
        let job = Job::ClubPlayers { id: "281".into(), season: Some(2023) };
        assert_eq!(job.kind(), "club_players");
        assert_eq!(job.key(), "281");

        let job = Job::Search { kind: SearchKind::Clubs, query: "city".into(), page: 1 };
        assert_eq!(job.kind(), "search_clubs");
        assert_eq!(job.key(), "city");
    }

    #[test]
    fn test_failed_fetch_serializes_as_failed() {
        let value = to_json::<u32>(Err(FetchError::Rejected { url: "u".into(), status: 403 }));
        assert_eq!(value["status"], "failed");
        assert!(value["error"].as_str().unwrap().contains("403"));
    }
}
