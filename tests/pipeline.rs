// End-to-end: extractors -> fetch client -> pool -> scripted transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use transfermarkt_engine::config::Config;
use transfermarkt_engine::extractors::{Extractors, Job, SearchKind};
use transfermarkt_engine::fetch::FetchClient;
use transfermarkt_engine::metrics::MetricsCollector;
use transfermarkt_engine::rate_limiter::RateLimiter;
use transfermarkt_engine::transport::{RawResponse, Transport, TransportFailure};
use transfermarkt_engine::{FetchError, Outcome};

/// Serves canned pages by path (query included). Anything else is a 404.
#[derive(Default)]
struct Site {
    pages: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<String>>,
}

impl Site {
    fn page(mut self, path: &str, status: u16, body: &str) -> Self {
        self.pages.insert(path.to_string(), (status, body.to_string()));
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for Site {
    type Conn = ();

    fn connect(&self) -> Result<(), TransportFailure> {
        Ok(())
    }

    async fn get(&self, _conn: &(), url: &Url, _timeout: Duration) -> Result<RawResponse, TransportFailure> {
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        self.requests.lock().push(path.clone());
        let (status, body) = self
            .pages
            .get(&path)
            .cloned()
            .unwrap_or((404, "<html>Page not found</html>".to_string()));
        Ok(RawResponse {
            status,
            body: body.into_bytes(),
        })
    }
}

fn engine(site: Site, max_retries: u32) -> (Extractors<Site>, Arc<Site>, Arc<MetricsCollector>) {
    let config = Config {
        base_url: "https://upstream.test".into(),
        max_retries,
        request_timeout: Duration::from_secs(5),
        min_request_interval: Duration::from_millis(200),
        retry_backoff: Duration::from_millis(100),
        pool_size: 3,
        ..Config::default()
    };
    let site = Arc::new(site);
    let metrics = Arc::new(MetricsCollector::new());
    let client = FetchClient::new(
        &config,
        Arc::clone(&site),
        Arc::new(RateLimiter::new(config.min_request_interval)),
        Arc::clone(&metrics),
    )
    .unwrap();
    (Extractors::new(Arc::new(client)), site, metrics)
}

fn player_page(name: &str, birth: &str) -> String {
    format!(
        r#"<html><body>
<h1 class="data-header__headline-wrapper"><span class="data-header__shirt-number">#10</span> {name}</h1>
<a class="data-header__market-value-wrapper" href="/x/marktwertverlauf/spieler/1">€1.50m<p>Last update: Jan 1, 2025</p></a>
<div class="info-table">
  <span class="info-table__content info-table__content--regular">Date of birth/Age:</span>
  <span class="info-table__content info-table__content--bold">{birth}</span>
  <span class="info-table__content info-table__content--regular">Position:</span>
  <span class="info-table__content info-table__content--bold">Midfield - Central Midfield</span>
</div>
</body></html>"#
    )
}

#[tokio::test(start_paused = true)]
async fn test_player_complete() {
    let site = Site::default().page("/-/profil/spieler/8198", 200, &player_page("Pedri González", "Nov 25, 2002 (22)"));
    let (engine, site, metrics) = engine(site, 2);

    let outcome = engine.player("8198").await.unwrap();
    let Outcome::Complete { record } = outcome else {
        panic!("expected a complete record, got {:?}", outcome);
    };
    assert_eq!(record.name.as_deref(), Some("Pedri González"));
    assert_eq!(record.shirt_number, Some(10));
    assert_eq!(record.age, Some(22));
    assert_eq!(record.market_value_eur, Some(1_500_000));
    assert_eq!(record.url, "https://upstream.test/-/profil/spieler/8198");

    assert_eq!(site.requests(), vec!["/-/profil/spieler/8198"]);
    let snap = metrics.snapshot();
    assert_eq!(snap.records_complete, 1);
    assert_eq!(snap.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_player_degraded_when_birthdate_is_garbled() {
    let site = Site::default().page("/-/profil/spieler/8198", 200, &player_page("Pedri", "born at some point"));
    let (engine, _site, metrics) = engine(site, 2);

    let outcome = engine.player("8198").await.unwrap();
    assert_eq!(outcome.missing(), &["date_of_birth".to_string()]);
    let record = outcome.record().unwrap();
    assert_eq!(record.name.as_deref(), Some("Pedri"));
    assert_eq!(record.date_of_birth, None);
    assert_eq!(metrics.snapshot().records_degraded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_upstream_404_is_not_found_after_one_attempt() {
    let (engine, site, metrics) = engine(Site::default(), 3);

    let outcome = engine.player_transfers("1").await.unwrap();
    assert!(outcome.is_not_found());
    assert_eq!(site.requests().len(), 1);
    assert_eq!(metrics.snapshot().records_not_found, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_id_never_reaches_the_upstream() {
    let (engine, site, _metrics) = engine(Site::default(), 2);

    assert!(engine.club("../../admin").await.unwrap().is_not_found());
    assert!(engine.player("").await.unwrap().is_not_found());
    assert!(site.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_exhaust_retries() {
    let site = Site::default().page("/-/datenfakten/verein/281", 503, "busy");
    let (engine, site, metrics) = engine(site, 2);

    let err = engine.club("281").await.unwrap_err();
    assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }), "{:?}", err);
    assert_eq!(site.requests().len(), 3);
    assert_eq!(metrics.snapshot().records_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_jobs_serialize_for_output() {
    let search = r##"<html><body><div class="box">
  <table class="items"><tbody>
    <tr>
      <td><table class="inline-table"><tr><td class="hauptlink"><a title="Real Madrid" href="/real-madrid/startseite/verein/418">Real Madrid</a></td></tr></table></td>
      <td class="zentriert"><img class="flaggenrahmen" title="Spain"></td>
      <td class="zentriert">25</td>
      <td class="rechts">€1.34bn</td>
    </tr>
  </tbody></table>
</div></body></html>"##;
    let site = Site::default().page(
        "/schnellsuche/ergebnis/schnellsuche?query=real%20madrid&Verein_page=1",
        200,
        search,
    );
    let (engine, _site, _metrics) = engine(site, 0);

    let result = engine
        .run(Job::Search {
            kind: SearchKind::Clubs,
            query: "real madrid".into(),
            page: 1,
        })
        .await;
    assert_eq!(result.kind, "search_clubs");
    assert_eq!(result.id, "real madrid");
    assert_eq!(result.outcome["status"], "complete");
    let hit = &result.outcome["record"]["results"][0];
    assert_eq!(hit["id"], "418");
    assert_eq!(hit["country"], "Spain");
    assert_eq!(hit["market_value_eur"], 1_340_000_000u64);

    let missing = engine.run(Job::Competition { id: "XX9".into(), season: None }).await;
    assert_eq!(missing.kind, "competition");
    assert_eq!(missing.outcome["status"], "not_found");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_jobs_share_the_limiter() {
    let mut site = Site::default();
    for id in 1..=5 {
        site = site.page(
            &format!("/-/profil/spieler/{}", id),
            200,
            &player_page("Someone", "Jan 1, 2000 (25)"),
        );
    }
    let (engine, site, _metrics) = engine(site, 0);

    let started = tokio::time::Instant::now();
    let handles: Vec<_> = (1..=5)
        .map(|id| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.player(&id.to_string()).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_complete());
    }

    assert_eq!(site.requests().len(), 5);
    // four gaps of 200ms between five requests
    assert!(started.elapsed() >= Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn test_run_all_yields_every_job_once() {
    use futures::StreamExt;

    let site = Site::default()
        .page("/-/profil/spieler/1", 200, &player_page("One", "Jan 1, 2000 (25)"))
        .page("/-/profil/spieler/2", 200, &player_page("Two", "Feb 2, 2001 (24)"));
    let (engine, _site, _metrics) = engine(site, 0);

    let jobs = vec![
        Job::Player("1".into()),
        Job::Player("2".into()),
        Job::Player("3".into()),
        Job::Player("not/valid".into()),
    ];
    let mut results: Vec<_> = engine.run_all(jobs, 2).collect().await;
    results.sort_by(|a, b| a.id.cmp(&b.id));

    let statuses: Vec<(&str, &str)> = results
        .iter()
        .map(|r| (r.id.as_str(), r.outcome["status"].as_str().unwrap_or("")))
        .collect();
    assert_eq!(
        statuses,
        vec![("1", "complete"), ("2", "complete"), ("3", "not_found"), ("not/valid", "not_found")]
    );
}
