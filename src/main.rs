// =============================================================================
// main.rs - THE COMMAND LINE
// =============================================================================
//
//   transfermarkt_engine [--timeout S] [--rate-limit S] ... <command> <ids...>
//
// Every id (or the one search query) becomes a job on its own tokio task,
// with at most pool-size jobs in flight. All jobs share one FetchClient, so
// they share the pool, the limiter and the breaker; the limiter keeps the
// upstream at one request per interval no matter how many ids were given.
//
// Finished jobs go through a crossbeam channel to the emitter thread, which
// owns stdout. Logs go to stderr, so stdout is nothing but JSON lines.
//
// Exit status is non-zero if any job failed to fetch (not for NotFound or
// degraded records), or if the run was interrupted.
// =============================================================================

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use transfermarkt_engine::config::{Config, ConfigFlags};
use transfermarkt_engine::emitter::Emitter;
use transfermarkt_engine::extractors::{Extractors, Job, JobResult, SearchKind};
use transfermarkt_engine::fetch::FetchClient;
use transfermarkt_engine::metrics::MetricsCollector;
use transfermarkt_engine::rate_limiter::RateLimiter;
use transfermarkt_engine::transport::ReqwestTransport;

const RESULT_CHANNEL_CAPACITY: usize = 1_000;

#[derive(Debug, Parser)]
#[command(name = "transfermarkt_engine", version, about = "Scrape Transfermarkt pages into JSON records")]
struct Cli {
    #[command(flatten)]
    flags: ConfigFlags,

    /// Write logs as JSON instead of text
    #[arg(long = "log-json")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Player profiles
    Player {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Transfer history of players
    PlayerTransfers {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Club profiles
    Club {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Squad lists of clubs
    ClubPlayers {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Season start year, e.g. 2023 for 23/24
        #[arg(long)]
        season: Option<u16>,
    },
    /// Clubs taking part in competitions
    Competition {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Season start year, e.g. 2023 for 23/24
        #[arg(long)]
        season: Option<u16>,
    },
    /// Quick search
    Search {
        #[arg(value_enum)]
        kind: SearchKind,
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

impl Command {
    fn into_jobs(self) -> Vec<Job> {
        match self {
            Command::Player { ids } => ids.into_iter().map(Job::Player).collect(),
            Command::PlayerTransfers { ids } => ids.into_iter().map(Job::PlayerTransfers).collect(),
            Command::Club { ids } => ids.into_iter().map(Job::Club).collect(),
            Command::ClubPlayers { ids, season } => ids
                .into_iter()
                .map(|id| Job::ClubPlayers { id, season })
                .collect(),
            Command::Competition { ids, season } => ids
                .into_iter()
                .map(|id| Job::Competition { id, season })
                .collect(),
            Command::Search { kind, query, page } => vec![Job::Search { kind, query, page }],
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(io::stderr().is_terminal()).init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::from_env()
        .with_flags(&cli.flags)
        .context("invalid configuration")?;
    info!(
        base_url = %config.base_url,
        timeout_ms = config.request_timeout.as_millis() as u64,
        rate_limit_ms = config.min_request_interval.as_millis() as u64,
        max_retries = config.max_retries,
        pool_size = config.pool_size,
        "Configuration loaded"
    );

    let transport = Arc::new(ReqwestTransport::new(config.user_agent.clone(), config.request_timeout));
    let limiter = RateLimiter::global(config.min_request_interval);
    let metrics = Arc::new(MetricsCollector::new());
    let client = Arc::new(FetchClient::new(&config, transport, limiter, Arc::clone(&metrics))?);
    let extractors = Extractors::new(Arc::clone(&client));

    let jobs = cli.command.into_jobs();
    let job_count = jobs.len();

    let (result_tx, result_rx) = crossbeam_channel::bounded::<JobResult>(RESULT_CHANNEL_CAPACITY);
    let (emitter, emitter_stats) = Emitter::new(result_rx, io::BufWriter::new(io::stdout()));
    let emitter_handle = std::thread::Builder::new()
        .name("emitter".into())
        .spawn(move || emitter.run().map(|_| ()))
        .context("failed to start emitter thread")?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, abandoning jobs still in flight");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!(error = %e, "Signal listener error"),
        }
    });

    // more jobs in flight than pooled handles would only queue for a handle
    info!(jobs = job_count, concurrency = config.pool_size, "Dispatching jobs");
    let results = extractors.run_all(jobs, config.pool_size);
    tokio::pin!(results);
    let mut failed = 0usize;

    let interrupted = loop {
        tokio::select! {
            next = results.next() => match next {
                Some(result) => {
                    if result.outcome["status"] == "failed" {
                        failed += 1;
                    }
                    let sent = tokio::task::block_in_place(|| result_tx.send(result));
                    if sent.is_err() {
                        error!("Emitter gone, stopping");
                        break false;
                    }
                }
                None => break false,
            },
            Ok(()) = shutdown_rx.changed() => break true,
        }
    };
    drop(result_tx);

    let emitted = emitter_handle
        .join()
        .map_err(|_| anyhow!("emitter thread panicked"))?;
    if let Err(e) = emitted {
        error!(error = %e, "Writing results failed");
    }

    info!(
        metrics = %serde_json::to_string(&metrics.snapshot())?,
        pool = %serde_json::to_string(&client.pool().snapshot())?,
        breaker = %serde_json::to_string(&client.breaker().snapshot())?,
        emitter = %serde_json::to_string(&emitter_stats.snapshot())?,
        "Run finished"
    );

    if interrupted {
        return Err(anyhow!("interrupted"));
    }
    if failed > 0 {
        return Err(anyhow!("{} of {} jobs failed", failed, job_count));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_and_subcommand_parse() {
        let cli = Cli::try_parse_from([
            "transfermarkt_engine",
            "--timeout",
            "5",
            "club-players",
            "281",
            "418",
            "--season",
            "2023",
        ])
        .unwrap();
        assert_eq!(cli.flags.timeout, Some(5.0));
        assert_eq!(cli.flags.max_retries, None);

        let jobs = cli.command.into_jobs();
        assert_eq!(
            jobs,
            vec![
                Job::ClubPlayers { id: "281".into(), season: Some(2023) },
                Job::ClubPlayers { id: "418".into(), season: Some(2023) },
            ]
        );
    }

    #[test]
    fn test_search_command() {
        let cli = Cli::try_parse_from(["transfermarkt_engine", "search", "clubs", "real madrid", "--page", "2"]).unwrap();
        assert_eq!(
            cli.command.into_jobs(),
            vec![Job::Search { kind: SearchKind::Clubs, query: "real madrid".into(), page: 2 }]
        );
    }

    #[test]
    fn test_ids_are_required() {
        assert!(Cli::try_parse_from(["transfermarkt_engine", "player"]).is_err());
    }
}
