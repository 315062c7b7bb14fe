use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::RetryPolicy;

pub const API_BASE_URL: &str = "https://v3.football.api-sports.io";
pub const TABULAR_INDEX_URL: &str = "https://www.transfermarkt.com/wettbewerbe/afrika";
pub const API_KEY_ENV: &str = "API_FOOTBALL_KEY";
pub const DEFAULT_WORKERS: usize = 5;
pub const MAX_LISTING_PAGES: u32 = 50;

/// Squad pages whose `wikitable`s list name, position, birth date, club.
pub const REFERENCE_URLS: &[&str] = &[
    "https://en.wikipedia.org/wiki/2024_Africa_Cup_of_Nations_squads",
    "https://en.wikipedia.org/wiki/2023_Africa_U-17_Cup_of_Nations_squads",
];

const DEFAULT_LEAGUES: &[(u32, &str)] = &[
    (384, "Premier Soccer League"),
    (308, "Egyptian Premier League"),
    (233, "Botola Pro"),
    (173, "Tunisian Ligue Professionnelle 1"),
    (174, "Algerian Ligue Professionnelle 1"),
    (306, "Nigeria Professional Football League"),
    (376, "Ghana Premier League"),
    (377, "Senegal Premier League"),
    (378, "Ivory Coast Ligue 1"),
    (379, "Cameroon Elite One"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct League {
    pub id: u32,
    pub name: String,
}

impl League {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// Default leagues, narrowed to `only` when it is non-empty. Ids not in the
/// default table are kept under a generic name.
pub fn leagues(only: &[u32]) -> Vec<League> {
    if only.is_empty() {
        return DEFAULT_LEAGUES
            .iter()
            .map(|(id, name)| League::new(*id, name))
            .collect();
    }
    only.iter()
        .map(|id| {
            let name = DEFAULT_LEAGUES
                .iter()
                .find(|(known, _)| known == id)
                .map(|(_, name)| name.to_string())
                .unwrap_or_else(|| format!("league {id}"));
            League { id: *id, name }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Api,
    Tabular,
    Reference,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" | "rest" => Ok(SourceKind::Api),
            "tabular" | "transfermarkt" => Ok(SourceKind::Tabular),
            "reference" | "static" | "wikipedia" => Ok(SourceKind::Reference),
            other => Err(format!("unknown source '{other}' (expected api, tabular, reference)")),
        }
    }
}

/// Everything one run needs; built once from the CLI.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub sources: Vec<SourceKind>,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub leagues: Vec<League>,
    pub tabular_index_url: String,
    pub reference_urls: Vec<String>,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub output: PathBuf,
    pub db_path: Option<PathBuf>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            sources: vec![SourceKind::Api, SourceKind::Tabular, SourceKind::Reference],
            api_base_url: API_BASE_URL.to_string(),
            api_key: None,
            leagues: leagues(&[]),
            tabular_index_url: TABULAR_INDEX_URL.to_string(),
            reference_urls: REFERENCE_URLS.iter().map(|u| u.to_string()).collect(),
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            output: PathBuf::from("african_players.csv"),
            db_path: None,
        }
    }
}

impl ScrapeConfig {
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.retry.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn enabled(&self, kind: SourceKind) -> bool {
        self.sources.contains(&kind)
    }
}
