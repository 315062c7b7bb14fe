//! Static reference pages (squad lists): fixed URLs, every marked table.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::html::{clean_date_of_birth, name_from_cell, row_cells, table_rows, text_of};
use super::{Batch, FanOut, ParseOutcome, SourceAdapter};
use crate::error::RowSkip;
use crate::fetcher::{FetchUnit, Fetcher, Payload};
use crate::record::{non_empty, PlayerRecord, SourceTag};

const MIN_COLUMNS: usize = 4;
const NAME_COL: usize = 0;
const POSITION_COL: usize = 1;
const BIRTH_COL: usize = 2;
const CLUB_COL: usize = 3;

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table.wikitable").unwrap());

pub struct ReferenceSource {
    urls: Vec<String>,
}

impl ReferenceSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

fn reference_row(row: ElementRef<'_>) -> Result<PlayerRecord, RowSkip> {
    let cells = row_cells(row);
    if cells.len() < MIN_COLUMNS {
        return Err(RowSkip::TooFewColumns {
            found: cells.len(),
            expected: MIN_COLUMNS,
        });
    }

    let name = name_from_cell(cells[NAME_COL]);
    let club = name_from_cell(cells[CLUB_COL]);
    let mut r = PlayerRecord::new(&name, Some(&club), SourceTag::StaticReference)
        .ok_or(RowSkip::EmptyName)?;
    r.position = non_empty(text_of(cells[POSITION_COL]));
    r.date_of_birth = clean_date_of_birth(&text_of(cells[BIRTH_COL]));
    Ok(r)
}

#[async_trait]
impl SourceAdapter for ReferenceSource {
    fn tag(&self) -> SourceTag {
        SourceTag::StaticReference
    }

    fn fan_out(&self) -> FanOut {
        FanOut::Gather
    }

    async fn discover(&self, _fetcher: &Fetcher) -> Vec<Batch> {
        if self.urls.is_empty() {
            return Vec::new();
        }
        let units = self
            .urls
            .iter()
            .map(|url| {
                let label = url.rsplit('/').next().unwrap_or(url).replace('_', " ");
                FetchUnit::html(SourceTag::StaticReference, url.as_str(), label)
            })
            .collect();
        vec![Batch {
            label: "reference pages".to_string(),
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
        for table in doc.select(&TABLE_SEL) {
            // first row is the header
            for (i, row) in table_rows(table).into_iter().enumerate().skip(1) {
                outcome.push(unit, i, reference_row(row));
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_fixture() -> ParseOutcome {
        let html = std::fs::read_to_string("tests/fixtures/reference_squad.html").unwrap();
        let src = ReferenceSource::new(vec![]);
        let unit = FetchUnit::html(
            SourceTag::StaticReference,
            "https://en.wikipedia.test/wiki/Squad",
            "Squad",
        );
        src.parse(&unit, &Payload::Html(html))
    }

    #[test]
    fn every_marked_table_is_scanned() {
        let out = parse_fixture();
        let names: Vec<&str> = out.records.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Yassine Bounou", "Achraf Hakimi", "Lamine Camara", "Pape Matar Sarr"]
        );
        // not a wikitable
        assert!(!names.contains(&"Ignored Player"));
    }

    #[test]
    fn dates_and_clubs_are_cleaned() {
        let out = parse_fixture();
        let bounou = &out.records[0];
        assert_eq!(bounou.date_of_birth.as_deref(), Some("1991-04-05"));
        assert_eq!(bounou.club, "Al-Hilal");
        assert_eq!(bounou.position.as_deref(), Some("GK"));

        let camara = &out.records[2];
        assert_eq!(camara.date_of_birth.as_deref(), Some("2004-01-01"));

        // free-text date without an ISO key
        let hakimi = &out.records[1];
        assert_eq!(hakimi.date_of_birth, None);
        assert_eq!(hakimi.club, "Paris Saint-Germain");
    }

    #[test]
    fn bad_rows_are_counted_not_fatal() {
        let out = parse_fixture();
        // one short row, one nameless row
        assert_eq!(out.skipped, 2);
        assert!(out.records.iter().all(|r| !r.full_name.is_empty()));
    }

    #[tokio::test]
    async fn fixed_urls_become_one_batch() {
        use crate::fetcher::testing::{fast_policy, StubTransport};
        use std::sync::Arc;

        let src = ReferenceSource::new(vec![
            "https://en.wikipedia.test/wiki/Morocco_national_football_team".into(),
        ]);
        let fetcher = Fetcher::new(Arc::new(StubTransport::new()), fast_policy());
        let batches = src.discover(&fetcher).await;
        assert_eq!(batches[0].units.len(), 1);
        assert_eq!(batches[0].units[0].label, "Morocco national football team");
    }
}
