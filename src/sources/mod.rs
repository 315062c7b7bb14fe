pub mod api;
pub mod html;
pub mod reference;
pub mod tabular;

use async_trait::async_trait;
use tracing::warn;

use crate::error::RowSkip;
use crate::fetcher::{FetchUnit, Fetcher, Payload};
use crate::record::{PlayerRecord, SourceTag};

/// How the orchestrator runs a batch of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// All units in flight at once on the calling task.
    Gather,
    /// Spawned tasks, at most `workers` running.
    Pool { workers: usize },
}

/// Units that belong together, e.g. the player details of one league.
#[derive(Debug, Clone)]
pub struct Batch {
    pub label: String,
    pub units: Vec<FetchUnit>,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<PlayerRecord>,
    pub skipped: usize,
}

impl ParseOutcome {
    /// Keep the record or count and log the skip.
    pub fn push(&mut self, unit: &FetchUnit, row: usize, result: Result<PlayerRecord, RowSkip>) {
        match result {
            Ok(record) => self.records.push(record),
            Err(skip) => {
                warn!("Skipped row {} of {} ({}): {}", row, unit.label, unit.source, skip);
                self.skipped += 1;
            }
        }
    }

    pub fn extend(&mut self, other: ParseOutcome) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn tag(&self) -> SourceTag;

    fn fan_out(&self) -> FanOut;

    /// Resolve the units of work. May fetch (index pages, league metadata);
    /// failures there shrink the result rather than erroring.
    async fn discover(&self, fetcher: &Fetcher) -> Vec<Batch>;

    fn parse(&self, unit: &FetchUnit, payload: &Payload) -> ParseOutcome;
}
