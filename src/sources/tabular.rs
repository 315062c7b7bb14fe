//! Transfermarkt-style listing pages: an index of leagues, then one table of
//! players per league.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::html::{first_href, img_title, name_from_cell, row_cells, text_of};
use super::{Batch, FanOut, ParseOutcome, SourceAdapter};
use crate::error::RowSkip;
use crate::fetcher::{FetchUnit, Fetcher, Payload};
use crate::record::{non_empty, PlayerRecord, SourceTag};

const MIN_INDEX_COLUMNS: usize = 3;
const MIN_PLAYER_COLUMNS: usize = 7;

static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.items > tbody > tr").unwrap());

pub struct TabularSource {
    index_url: String,
    workers: usize,
}

impl TabularSource {
    pub fn new(index_url: &str, workers: usize) -> Self {
        Self {
            index_url: index_url.to_string(),
            workers: workers.max(1),
        }
    }
}

/// `(league name, absolute url)` for every index row that links somewhere.
pub fn parse_league_index(html: &str, base: &str) -> Vec<(String, String)> {
    let Ok(base) = Url::parse(base) else {
        warn!("Index base URL {} is not absolute", base);
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut leagues = Vec::new();

    for row in doc.select(&ROW_SEL) {
        let cells = row_cells(row);
        if cells.len() < MIN_INDEX_COLUMNS {
            continue;
        }
        let Some(href) = cells.iter().find_map(|c| first_href(*c)) else {
            continue;
        };
        let Ok(url) = base.join(&href) else {
            warn!("Unusable league link {}", href);
            continue;
        };
        let url = url.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }
        let name = cells
            .iter()
            .map(|c| name_from_cell(*c))
            .find(|n| !n.is_empty())
            .unwrap_or_else(|| url.clone());
        leagues.push((name, url));
    }

    leagues
}

fn player_row(row: ElementRef<'_>, league: &str) -> Result<PlayerRecord, RowSkip> {
    let cells = row_cells(row);
    if cells.len() < MIN_PLAYER_COLUMNS {
        return Err(RowSkip::TooFewColumns {
            found: cells.len(),
            expected: MIN_PLAYER_COLUMNS,
        });
    }

    let name = name_from_cell(cells[1]);
    let club = img_title(cells[5]);
    let mut r =
        PlayerRecord::new(&name, club.as_deref(), SourceTag::TabularScrape).ok_or(RowSkip::EmptyName)?;
    r.position = non_empty(text_of(cells[2]));
    r.nationality = img_title(cells[4]);
    r.market_value = non_empty(text_of(cells[6]));
    r.league = non_empty(league);
    Ok(r)
}

#[async_trait]
impl SourceAdapter for TabularSource {
    fn tag(&self) -> SourceTag {
        SourceTag::TabularScrape
    }

    fn fan_out(&self) -> FanOut {
        FanOut::Pool {
            workers: self.workers,
        }
    }

    async fn discover(&self, fetcher: &Fetcher) -> Vec<Batch> {
        info!("Scraping league index: {}", self.index_url);
        let unit = FetchUnit::html(SourceTag::TabularScrape, self.index_url.as_str(), "league index");
        let html = match fetcher.fetch(&unit).await {
            Ok(Payload::Html(html)) => html,
            Ok(Payload::Json(_)) => return Vec::new(),
            Err(e) => {
                warn!("Failed to fetch league index: {}", e);
                return Vec::new();
            }
        };

        let leagues = parse_league_index(&html, &self.index_url);
        info!("Found {} league pages", leagues.len());
        if leagues.is_empty() {
            return Vec::new();
        }

        let units = leagues
            .into_iter()
            .map(|(name, url)| FetchUnit::html(SourceTag::TabularScrape, url, name))
            .collect();
        vec![Batch {
            label: "league pages".to_string(),
            units,
        }]
    }

    fn parse(&self, unit: &FetchUnit, payload: &Payload) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let Payload::Html(html) = payload else {
            outcome.push(unit, 0, Err(RowSkip::Malformed("expected HTML".into())));
            return outcome;
        };

        let doc = Html::parse_document(html);
        for (i, row) in doc.select(&ROW_SEL).enumerate() {
            outcome.push(unit, i, player_row(row, &unit.label));
        }
        outcome
    }
}
