//! API-Football v3: league → current season → player ids → player detail.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::html::iso_date;
use super::{Batch, FanOut, ParseOutcome, SourceAdapter};
use crate::config::League;
use crate::error::RowSkip;
use crate::fetcher::{FetchUnit, Fetcher, Payload};
use crate::record::{non_empty, PlayerRecord, SourceTag};

const KEY_HEADER: &str = "x-apisports-key";

// ── Response shapes ──

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default, deserialize_with = "null_as_empty")]
    response: Vec<T>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    total: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LeagueEntry {
    #[serde(default, deserialize_with = "null_as_empty")]
    seasons: Vec<SeasonEntry>,
}

#[derive(Debug, Deserialize)]
struct SeasonEntry {
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    player: Option<ListingPlayer>,
}

#[derive(Debug, Deserialize)]
struct ListingPlayer {
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlayerEntry {
    player: ApiPlayer,
    #[serde(default, deserialize_with = "null_as_empty")]
    statistics: Vec<ApiStatistics>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPlayer {
    name: Option<String>,
    firstname: Option<String>,
    lastname: Option<String>,
    nationality: Option<String>,
    birth: Option<Birth>,
    height: Option<String>,
    weight: Option<String>,
    injured: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct Birth {
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStatistics {
    team: Option<Named>,
    league: Option<Named>,
    games: Option<Games>,
    goals: Option<Goals>,
    cards: Option<Cards>,
    shots: Option<Shots>,
    passes: Option<Passes>,
    tackles: Option<Tackles>,
    dribbles: Option<Dribbles>,
}

#[derive(Debug, Default, Deserialize)]
struct Games {
    // sic, the API's spelling
    appearences: Option<u32>,
    minutes: Option<u32>,
    position: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rating: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Goals {
    total: Option<u32>,
    assists: Option<u32>,
    saves: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Cards {
    yellow: Option<u32>,
    red: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Shots {
    on: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Passes {
    #[serde(default, deserialize_with = "lenient_f64")]
    accuracy: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Tackles {
    total: Option<u32>,
    interceptions: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Dribbles {
    success: Option<u32>,
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// Numbers that sometimes arrive as strings ("7.2", "81").
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

/// "180 cm" → 180
fn leading_number(raw: &str) -> Option<u16> {
    raw.split_whitespace().next()?.parse().ok()
}

// ── Adapter ──

pub struct ApiSource {
    base_url: String,
    api_key: String,
    leagues: Vec<League>,
    max_pages: u32,
}

impl ApiSource {
    pub fn new(base_url: &str, api_key: &str, leagues: Vec<League>, max_pages: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            leagues,
            max_pages: max_pages.max(1),
        }
    }

    fn unit(&self, url: String, label: String) -> FetchUnit {
        FetchUnit::json(
            SourceTag::RestApi,
            url,
            vec![(KEY_HEADER.to_string(), self.api_key.clone())],
            label,
        )
    }

    /// Latest season year the API lists for the league.
    pub async fn resolve_season(&self, fetcher: &Fetcher, league: &League) -> Option<i32> {
        let url = format!("{}/leagues?id={}", self.base_url, league.id);
        let payload = match fetcher.fetch(&self.unit(url, league.name.clone())).await {
            Ok(Payload::Json(v)) => v,
            Ok(Payload::Html(_)) => return None,
            Err(e) => {
                warn!("Season lookup failed for {}: {}", league.name, e);
                return None;
            }
        };

        match Envelope::<LeagueEntry>::deserialize(&payload) {
            Ok(env) => env
                .response
                .first()
                .and_then(|entry| entry.seasons.iter().filter_map(|s| s.year).max()),
            Err(e) => {
                warn!("Unexpected league payload for {}: {}", league.name, e);
                None
            }
        }
    }

    /// Distinct player ids across all listing pages, in listing order.
    pub async fn player_ids(&self, fetcher: &Fetcher, league: &League, season: i32) -> Vec<u64> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1;
        let mut last_page = 1;

        while page <= last_page {
            let url = format!(
                "{}/players?league={}&season={}&page={}",
                self.base_url, league.id, season, page
            );
            let label = format!("{} page {}", league.name, page);
            let env = match fetcher.fetch(&self.unit(url, label)).await {
                Ok(Payload::Json(v)) => match Envelope::<ListingEntry>::deserialize(&v) {
                    Ok(env) => env,
                    Err(e) => {
                        warn!("Unexpected listing payload for {} page {}: {}", league.name, page, e);
                        break;
                    }
                },
                Ok(Payload::Html(_)) => break,
                Err(e) => {
                    warn!("Listing fetch failed for {} page {}: {}", league.name, page, e);
                    break;
                }
            };

            if page == 1 {
                last_page = env
                    .paging
                    .and_then(|p| p.total)
                    .unwrap_or(1)
                    .clamp(1, self.max_pages);
            }

            for id in env.response.iter().filter_map(|e| e.player.as_ref()?.id) {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            page += 1;
        }

        ids
    }

    /// Detail units for one league, or `None` when the league yields nothing.
    pub async fn league_batch(&self, fetcher: &Fetcher, league: &League) -> Option<Batch> {
        let Some(season) = self.resolve_season(fetcher, league).await else {
            warn!("No season data found for league {} ({})", league.id, league.name);
            return None;
        };

        let ids = self.player_ids(fetcher, league, season).await;
        if ids.is_empty() {
            warn!("No players found for league {} in season {}", league.name, season);
            return None;
        }
        info!("{}: {} players listed for season {}", league.name, ids.len(), season);

        let units = ids
            .into_iter()
            .map(|id| {
                let url = format!("{}/players?id={}&season={}", self.base_url, id, season);
                self.unit(url, format!("player {id}"))
            })
            .collect();

        Some(Batch {
            label: league.name.clone(),
            units,
        })
    }
}

#[async_trait]
impl SourceAdapter for ApiSource {
    fn tag(&self) -> SourceTag {
        SourceTag::RestApi
    }

    fn fan_out(&self) -> FanOut {
        FanOut::Gather
    }

    async fn discover(&self, fetcher: &Fetcher) -> Vec<Batch> {
        join_all(self.leagues.iter().map(|l| self.league_batch(fetcher, l)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    fn parse(&self, unit: &FetchUnit, payload: &Payload) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let Payload::Json(value) = payload else {
            outcome.push(unit, 0, Err(RowSkip::Malformed("expected JSON".into())));
            return outcome;
        };

        match Envelope::<PlayerEntry>::deserialize(value) {
            Ok(env) => match env.response.first() {
                Some(entry) => outcome.push(unit, 0, player_record(entry)),
                None => debug!("No detail data for {}", unit.label),
            },
            Err(e) => outcome.push(unit, 0, Err(RowSkip::Malformed(e.to_string()))),
        }
        outcome
    }
}

fn player_record(entry: &PlayerEntry) -> Result<PlayerRecord, RowSkip> {
    let p = &entry.player;
    let name = p.name.as_deref().and_then(non_empty).or_else(|| {
        let joined = format!(
            "{} {}",
            p.firstname.as_deref().unwrap_or(""),
            p.lastname.as_deref().unwrap_or("")
        );
        non_empty(joined)
    });
    let name = name.ok_or(RowSkip::EmptyName)?;

    let stats = entry.statistics.first();
    let club = stats
        .and_then(|s| s.team.as_ref())
        .and_then(|t| t.name.as_deref());

    let mut r = PlayerRecord::new(&name, club, SourceTag::RestApi).ok_or(RowSkip::EmptyName)?;
    r.nationality = p.nationality.as_deref().and_then(non_empty);
    r.date_of_birth = p
        .birth
        .as_ref()
        .and_then(|b| b.date.as_deref())
        .and_then(iso_date);
    r.height_cm = p.height.as_deref().and_then(leading_number);
    r.weight_kg = p.weight.as_deref().and_then(leading_number);
    r.injured = p.injured;

    if let Some(s) = stats {
        r.league = s.league.as_ref().and_then(|l| l.name.as_deref()).and_then(non_empty);
        if let Some(g) = &s.games {
            r.position = g.position.as_deref().and_then(non_empty);
            r.appearances = g.appearences;
            r.minutes_played = g.minutes;
            r.rating = g.rating;
        }
        if let Some(g) = &s.goals {
            r.goals = g.total;
            r.assists = g.assists;
            r.saves = g.saves;
        }
        if let Some(c) = &s.cards {
            r.yellow_cards = c.yellow;
            r.red_cards = c.red;
        }
        r.shots_on_target = s.shots.as_ref().and_then(|x| x.on);
        r.pass_accuracy = s.passes.as_ref().and_then(|x| x.accuracy);
        if let Some(t) = &s.tackles {
            r.tackles = t.total;
            r.interceptions = t.interceptions;
        }
        r.dribbles_completed = s.dribbles.as_ref().and_then(|x| x.success);
    }

    Ok(r)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fetcher::testing::{fast_policy, StubTransport};

    const BASE: &str = "https://api.test";

    fn league() -> League {
        League::new(308, "Egyptian Premier League")
    }

    fn source() -> ApiSource {
        ApiSource::new(BASE, "secret", vec![league()], 10)
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    fn detail_unit() -> FetchUnit {
        source().unit(format!("{BASE}/players?id=306&season=2024"), "player 306".into())
    }

    #[test]
    fn detail_payload_maps_stats_and_keeps_nulls_absent() {
        let value: Value = serde_json::from_str(&fixture("api_player.json")).unwrap();
        let out = source().parse(&detail_unit(), &Payload::Json(value));
        assert_eq!(out.skipped, 0);
        let r = &out.records[0];
        assert_eq!(r.full_name, "Mohamed Sherif");
        assert_eq!(r.club, "Al Ahly");
        assert_eq!(r.league.as_deref(), Some("Premier League"));
        assert_eq!(r.position.as_deref(), Some("Attacker"));
        assert_eq!(r.date_of_birth.as_deref(), Some("1996-02-04"));
        assert_eq!(r.goals, Some(11));
        assert_eq!(r.assists, None);
        assert_eq!(r.red_cards, Some(0));
        assert_eq!(r.height_cm, Some(183));
        assert_eq!(r.weight_kg, None);
        assert_eq!(r.rating, Some(7.05));
        assert_eq!(r.pass_accuracy, Some(71.0));
    }

    #[test]
    fn empty_response_is_no_data() {
        let value = serde_json::json!({ "response": [] });
        let out = source().parse(&detail_unit(), &Payload::Json(value));
        assert!(out.records.is_empty());
        assert_eq!(out.skipped, 0);
    }

    #[test]
    fn nameless_player_is_dropped() {
        let value = serde_json::json!({
            "response": [{ "player": { "name": " ", "firstname": null, "lastname": "" }, "statistics": [] }]
        });
        let out = source().parse(&detail_unit(), &Payload::Json(value));
        assert!(out.records.is_empty());
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn name_falls_back_to_first_and_last() {
        let value = serde_json::json!({
            "response": [{ "player": { "name": null, "firstname": "Hakim", "lastname": "Ziyech" }, "statistics": null }]
        });
        let out = source().parse(&detail_unit(), &Payload::Json(value));
        assert_eq!(out.records[0].full_name, "Hakim Ziyech");
        assert_eq!(out.records[0].club, crate::record::UNKNOWN_CLUB);
    }

    #[tokio::test]
    async fn season_is_the_latest_listed_year() {
        let stub = StubTransport::new().route(
            &format!("{BASE}/leagues?id=308"),
            200,
            r#"{"response":[{"seasons":[{"year":2022},{"year":2024},{"year":2023}]}]}"#,
        );
        let fetcher = Fetcher::new(Arc::new(stub), fast_policy());
        assert_eq!(source().resolve_season(&fetcher, &league()).await, Some(2024));
    }

    #[tokio::test]
    async fn empty_league_listing_yields_no_batch() {
        let stub = StubTransport::new()
            .route(&format!("{BASE}/leagues?id=308"), 200, r#"{"response":[{"seasons":[{"year":2024}]}]}"#)
            .route(&format!("{BASE}/players?league=308&season=2024&page=1"), 200, r#"{"response":[]}"#);
        let fetcher = Fetcher::new(Arc::new(stub), fast_policy());
        assert!(source().league_batch(&fetcher, &league()).await.is_none());
        assert!(source().discover(&fetcher).await.is_empty());
    }

    #[tokio::test]
    async fn missing_season_skips_league() {
        let stub = StubTransport::new().route(&format!("{BASE}/leagues?id=308"), 200, r#"{"response":null}"#);
        let fetcher = Fetcher::new(Arc::new(stub), fast_policy());
        assert!(source().league_batch(&fetcher, &league()).await.is_none());
    }

    #[tokio::test]
    async fn listing_follows_pages_and_dedupes_ids() {
        let stub = StubTransport::new()
            .route(&format!("{BASE}/leagues?id=308"), 200, r#"{"response":[{"seasons":[{"year":2024}]}]}"#)
            .route(
                &format!("{BASE}/players?league=308&season=2024&page=1"),
                200,
                r#"{"paging":{"current":1,"total":2},"response":[{"player":{"id":1}},{"player":{"id":2}}]}"#,
            )
            .route(
                &format!("{BASE}/players?league=308&season=2024&page=2"),
                200,
                r#"{"paging":{"current":2,"total":2},"response":[{"player":{"id":2}},{"player":{"id":3}},{"player":null}]}"#,
            );
        let fetcher = Fetcher::new(Arc::new(stub), fast_policy());
        let batch = source().league_batch(&fetcher, &league()).await.unwrap();
        let urls: Vec<&str> = batch.units.iter().map(|u| u.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.test/players?id=1&season=2024",
                "https://api.test/players?id=2&season=2024",
                "https://api.test/players?id=3&season=2024",
            ]
        );
        assert!(batch.units[0].headers.contains(&(KEY_HEADER.to_string(), "secret".to_string())));
    }
}
