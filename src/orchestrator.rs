use std::sync::Arc;

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::record::{PlayerRecord, SourceTag};
use crate::sources::{Batch, FanOut, ParseOutcome, SourceAdapter};

/// What one source contributed to a run.
#[derive(Debug)]
pub struct SourceReport {
    pub source: SourceTag,
    pub records: Vec<PlayerRecord>,
    pub units: usize,
    pub failed_units: usize,
    pub skipped_rows: usize,
}

impl SourceReport {
    fn empty(source: SourceTag) -> Self {
        Self {
            source,
            records: Vec::new(),
            units: 0,
            failed_units: 0,
            skipped_rows: 0,
        }
    }

    fn absorb(&mut self, units: usize, failed: usize, outcome: ParseOutcome) {
        self.units += units;
        self.failed_units += failed;
        self.skipped_rows += outcome.skipped;
        self.records.extend(outcome.records);
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.sources.iter().map(|s| s.records.len()).sum()
    }

    /// Records in source order, ready for merging.
    pub fn records(&self) -> Vec<PlayerRecord> {
        self.sources.iter().flat_map(|s| s.records.iter().cloned()).collect()
    }
}

pub struct Orchestrator {
    fetcher: Arc<Fetcher>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Runs every source concurrently. Never fails: sources or units that
    /// break simply contribute nothing.
    pub async fn run(&self, sources: &[Arc<dyn SourceAdapter>]) -> RunReport {
        let reports = join_all(sources.iter().map(|s| self.run_source(Arc::clone(s)))).await;

        for r in &reports {
            info!(
                "{}: {} records from {} units ({} failed units, {} skipped rows)",
                r.source,
                r.records.len(),
                r.units,
                r.failed_units,
                r.skipped_rows
            );
        }
        let report = RunReport { sources: reports };
        info!("Collected {} records before dedup", report.total());
        report
    }

    async fn run_source(&self, source: Arc<dyn SourceAdapter>) -> SourceReport {
        let tag = source.tag();
        let mut report = SourceReport::empty(tag);

        let batches = source.discover(&self.fetcher).await;
        if batches.is_empty() {
            warn!("{}: discovery produced no work, source contributes nothing", tag);
            return report;
        }

        let fan_out = source.fan_out();
        let results = join_all(batches.into_iter().map(|batch| {
            let source = Arc::clone(&source);
            async move {
                let units = batch.units.len();
                let label = batch.label.clone();
                let (failed, outcome) = match fan_out {
                    FanOut::Gather => self.gather(&source, batch).await,
                    FanOut::Pool { workers } => self.pool(&source, batch, workers).await,
                };
                info!(
                    "Scraped {} players from {} ({}/{} units ok)",
                    outcome.records.len(),
                    label,
                    units - failed,
                    units
                );
                (units, failed, outcome)
            }
        }))
        .await;

        for (units, failed, outcome) in results {
            report.absorb(units, failed, outcome);
        }
        if report.records.is_empty() {
            warn!("{}: no records collected", tag);
        }
        report
    }

    /// All units in flight on this task; payloads parsed on the rayon pool.
    async fn gather(&self, source: &Arc<dyn SourceAdapter>, batch: Batch) -> (usize, ParseOutcome) {
        let pb = progress_bar(batch.units.len(), &batch.label);
        let fetched = join_all(batch.units.into_iter().map(|unit| {
            let pb = pb.clone();
            async move {
                let result = self.fetcher.fetch(&unit).await;
                pb.inc(1);
                (unit, result)
            }
        }))
        .await;
        pb.finish_and_clear();

        let mut failed = 0;
        let mut payloads = Vec::with_capacity(fetched.len());
        for (unit, result) in fetched {
            match result {
                Ok(payload) => payloads.push((unit, payload)),
                Err(e) => {
                    log_unit_failure(&unit.label, &e);
                    failed += 1;
                }
            }
        }

        // parse on rayon from the blocking pool so other sources keep polling
        let parsed = payloads.len();
        let parser = Arc::clone(source);
        let outcomes = tokio::task::spawn_blocking(move || {
            payloads
                .par_iter()
                .map(|(unit, payload)| parser.parse(unit, payload))
                .collect::<Vec<ParseOutcome>>()
        })
        .await;

        let mut merged = ParseOutcome::default();
        match outcomes {
            Ok(outcomes) => {
                for outcome in outcomes {
                    merged.extend(outcome);
                }
            }
            Err(e) => {
                warn!("Parsing {} failed: {}", batch.label, e);
                failed += parsed;
            }
        }
        (failed, merged)
    }

    /// Spawned tasks bounded by a semaphore; results come back over a channel.
    async fn pool(
        &self,
        source: &Arc<dyn SourceAdapter>,
        batch: Batch,
        workers: usize,
    ) -> (usize, ParseOutcome) {
        let workers = workers.max(1);
        let total = batch.units.len();
        let pb = progress_bar(total, &batch.label);
        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel::<(String, Result<ParseOutcome, FetchError>)>(workers * 2);

        for unit in batch.units {
            let fetcher = Arc::clone(&self.fetcher);
            let source = Arc::clone(source);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                let result = match fetcher.fetch(&unit).await {
                    Ok(payload) => Ok(source.parse(&unit, &payload)),
                    Err(e) => Err(e),
                };
                let _ = tx.send((unit.label, result)).await;
            });
        }

        // rx closes once every task has sent or died
        drop(tx);

        let mut failed = 0;
        let mut received = 0;
        let mut merged = ParseOutcome::default();
        while let Some((label, result)) = rx.recv().await {
            received += 1;
            match result {
                Ok(outcome) => merged.extend(outcome),
                Err(e) => {
                    log_unit_failure(&label, &e);
                    failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        // a task that panicked never reported
        failed += total - received;
        (failed, merged)
    }
}

fn log_unit_failure(label: &str, err: &FetchError) {
    match err {
        FetchError::Unavailable {
            status: Some(status),
            ..
        } => warn!(url = err.url(), status, "Dropping {}: {}", label, err),
        _ => warn!(url = err.url(), "Dropping {}: {}", label, err),
    }
}

fn progress_bar(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg} ({per_sec}, eta {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}
