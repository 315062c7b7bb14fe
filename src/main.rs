mod config;
mod db;
mod error;
mod fetcher;
mod merge;
mod orchestrator;
mod record;
mod sink;
mod sources;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use config::{ScrapeConfig, SourceKind};
use fetcher::{Fetcher, HttpTransport};
use orchestrator::{Orchestrator, RunReport};
use record::PlayerRecord;
use sources::api::ApiSource;
use sources::reference::ReferenceSource;
use sources::tabular::TabularSource;
use sources::SourceAdapter;

#[derive(Parser)]
#[command(name = "football_scraper", about = "African football player aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all sources, merge, and write the CSV (and optionally SQLite)
    Run {
        /// CSV output path
        #[arg(short, long, default_value = "african_players.csv")]
        output: PathBuf,
        /// Also upsert the merged players into this SQLite database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Sources to run (api, tabular, reference)
        #[arg(long, value_delimiter = ',', default_value = "api,tabular,reference")]
        sources: Vec<SourceKind>,
        /// Restrict the API source to these league ids (repeatable)
        #[arg(long = "league")]
        leagues: Vec<u32>,
        /// API-Football key
        #[arg(long, env = config::API_KEY_ENV, hide_env_values = true)]
        api_key: Option<String>,
        /// Concurrent league pages for the tabular source
        #[arg(short, long, default_value_t = config::DEFAULT_WORKERS)]
        workers: usize,
        /// Retries per request after the first attempt
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
        /// Per-attempt timeout
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Show counts from the SQLite database
    Stats {
        #[arg(long, default_value = "data/players.sqlite")]
        db: PathBuf,
    },
    /// Top scorers from the SQLite database
    Top {
        #[arg(long, default_value = "data/players.sqlite")]
        db: PathBuf,
        #[arg(short, long)]
        league: Option<String>,
        #[arg(short, long)]
        club: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "25")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            output,
            db,
            sources,
            leagues,
            api_key,
            workers,
            max_retries,
            timeout_secs,
        } => {
            let mut cfg = ScrapeConfig {
                sources,
                api_key: api_key.filter(|k| !k.trim().is_empty()),
                leagues: config::leagues(&leagues),
                workers,
                output,
                db_path: db,
                ..ScrapeConfig::default()
            }
            .with_timeout(timeout_secs);
            cfg.retry.max_retries = max_retries;
            run(&cfg).await
        }
        Commands::Stats { db } => {
            let conn = db::connect(&db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Players:   {}", s.total);
            println!("Last run:  {}", s.last_run.as_deref().unwrap_or("never"));
            println!("\nBy source:");
            for (source, n) in &s.by_source {
                println!("  {:<18} {:>6}", source, n);
            }
            println!("\nBy league:");
            for (league, n) in &s.by_league {
                println!("  {:<40} {:>6}", truncate(league, 40), n);
            }
            Ok(())
        }
        Commands::Top {
            db,
            league,
            club,
            limit,
        } => {
            let conn = db::connect(&db)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_top(&conn, league.as_deref(), club.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No players found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<24} | {:<20} | {:<20} | {:<10} | {:>5} | {:>5} | {:>4} | {:<9}",
                "#", "Player", "Club", "League", "Pos", "Goals", "Ast", "Apps", "Value"
            );
            println!("{}", "-".repeat(122));

            let num = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<24} | {:<20} | {:<20} | {:<10} | {:>5} | {:>5} | {:>4} | {:<9}",
                    i + 1,
                    truncate(&r.full_name, 24),
                    truncate(&r.club, 20),
                    truncate(&r.league, 20),
                    truncate(&r.position, 10),
                    num(r.goals),
                    num(r.assists),
                    num(r.appearances),
                    r.market_value
                );
            }
            println!("\n{} players", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_sources(cfg: &ScrapeConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    // merge order: API first, reference pages last so they win collisions
    if cfg.enabled(SourceKind::Api) {
        match &cfg.api_key {
            Some(key) => sources.push(Arc::new(ApiSource::new(
                &cfg.api_base_url,
                key,
                cfg.leagues.clone(),
                config::MAX_LISTING_PAGES,
            ))),
            None => warn!(
                "No API key (--api-key or {}), skipping the API source",
                config::API_KEY_ENV
            ),
        }
    }
    if cfg.enabled(SourceKind::Tabular) {
        sources.push(Arc::new(TabularSource::new(&cfg.tabular_index_url, cfg.workers)));
    }
    if cfg.enabled(SourceKind::Reference) {
        sources.push(Arc::new(ReferenceSource::new(cfg.reference_urls.clone())));
    }

    sources
}

async fn run(cfg: &ScrapeConfig) -> anyhow::Result<()> {
    info!("Starting football player scraping");
    let transport = HttpTransport::new(cfg.retry.timeout).context("building HTTP client")?;
    let fetcher = Arc::new(Fetcher::new(Arc::new(transport), cfg.retry));

    let sources = build_sources(cfg);
    if sources.is_empty() {
        warn!("No sources enabled, nothing to do");
        return Ok(());
    }

    let report = Orchestrator::new(fetcher).run(&sources).await;

    persist(cfg, &report)?;
    Ok(())
}

/// Writes the CSV, then updates the database if one is configured. A
/// database failure is logged and never costs the CSV.
fn persist(cfg: &ScrapeConfig, report: &RunReport) -> anyhow::Result<usize> {
    let players = merge::merge(report.records());
    info!("Total players after dedup: {}", players.len());

    let written = sink::save_csv(&cfg.output, &players)?;
    if written > 0 {
        println!("Saved {} players to {}.", written, cfg.output.display());
    }

    if let Some(path) = &cfg.db_path {
        if let Err(e) = save_to_db(path, report, &players) {
            error!("Database update at {} failed: {:#}", path.display(), e);
        }
    }

    Ok(written)
}

fn save_to_db(path: &Path, report: &RunReport, players: &[PlayerRecord]) -> anyhow::Result<()> {
    let conn = db::connect(path)?;
    db::init_schema(&conn)?;
    db::record_run(&conn, &report.sources)?;
    let saved = db::save_players(&conn, players)?;
    info!("Upserted {} players into {}", saved, path.display());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
