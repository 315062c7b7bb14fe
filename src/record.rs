use std::fmt;

/// Club value used when a source does not report one.
pub const UNKNOWN_CLUB: &str = "unknown";

/// Canonical CSV header, one entry per `PlayerRecord` field.
pub const COLUMNS: &[&str] = &[
    "full_name",
    "club",
    "nationality",
    "position",
    "league",
    "date_of_birth",
    "market_value",
    "goals",
    "assists",
    "yellow_cards",
    "red_cards",
    "minutes_played",
    "appearances",
    "shots_on_target",
    "tackles",
    "interceptions",
    "dribbles_completed",
    "saves",
    "pass_accuracy",
    "rating",
    "height_cm",
    "weight_kg",
    "injured",
    "source",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    RestApi,
    TabularScrape,
    StaticReference,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::RestApi => "rest_api",
            SourceTag::TabularScrape => "tabular_scrape",
            SourceTag::StaticReference => "static_reference",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(full_name, club)`: two records with the same key are the same player.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub full_name: String,
    pub club: String,
}

/// One player as seen by one source. Statistics are `None` when the source
/// did not report them; `Some(0)` is an observed zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub full_name: String,
    pub club: String,
    pub nationality: Option<String>,
    pub position: Option<String>,
    pub league: Option<String>,
    pub date_of_birth: Option<String>,
    pub market_value: Option<String>,
    pub goals: Option<u32>,
    pub assists: Option<u32>,
    pub yellow_cards: Option<u32>,
    pub red_cards: Option<u32>,
    pub minutes_played: Option<u32>,
    pub appearances: Option<u32>,
    pub shots_on_target: Option<u32>,
    pub tackles: Option<u32>,
    pub interceptions: Option<u32>,
    pub dribbles_completed: Option<u32>,
    pub saves: Option<u32>,
    pub pass_accuracy: Option<f64>,
    pub rating: Option<f64>,
    pub height_cm: Option<u16>,
    pub weight_kg: Option<u16>,
    pub injured: Option<bool>,
    pub source: SourceTag,
}

impl PlayerRecord {
    /// Returns `None` when `full_name` is blank after trimming. A blank club
    /// becomes [`UNKNOWN_CLUB`].
    pub fn new(full_name: &str, club: Option<&str>, source: SourceTag) -> Option<Self> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return None;
        }
        let club = club
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_CLUB);

        Some(Self {
            full_name: full_name.to_string(),
            club: club.to_string(),
            nationality: None,
            position: None,
            league: None,
            date_of_birth: None,
            market_value: None,
            goals: None,
            assists: None,
            yellow_cards: None,
            red_cards: None,
            minutes_played: None,
            appearances: None,
            shots_on_target: None,
            tackles: None,
            interceptions: None,
            dribbles_completed: None,
            saves: None,
            pass_accuracy: None,
            rating: None,
            height_cm: None,
            weight_kg: None,
            injured: None,
            source,
        })
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            full_name: self.full_name.clone(),
            club: self.club.clone(),
        }
    }

    /// Cells in [`COLUMNS`] order; absent values are empty cells.
    pub fn to_row(&self) -> Vec<String> {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(|x| x.to_string()).unwrap_or_default()
        }

        vec![
            self.full_name.clone(),
            self.club.clone(),
            opt(&self.nationality),
            opt(&self.position),
            opt(&self.league),
            opt(&self.date_of_birth),
            opt(&self.market_value),
            opt(&self.goals),
            opt(&self.assists),
            opt(&self.yellow_cards),
            opt(&self.red_cards),
            opt(&self.minutes_played),
            opt(&self.appearances),
            opt(&self.shots_on_target),
            opt(&self.tackles),
            opt(&self.interceptions),
            opt(&self.dribbles_completed),
            opt(&self.saves),
            opt(&self.pass_accuracy),
            opt(&self.rating),
            opt(&self.height_cm),
            opt(&self.weight_kg),
            opt(&self.injured),
            self.source.to_string(),
        ]
    }
}

/// Treat blank strings as absent.
pub fn non_empty(s: impl AsRef<str>) -> Option<String> {
    let t = s.as_ref().trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_is_rejected() {
        assert!(PlayerRecord::new("   ", Some("Al Ahly"), SourceTag::RestApi).is_none());
        assert!(PlayerRecord::new("", None, SourceTag::RestApi).is_none());
    }

    #[test]
    fn missing_club_uses_sentinel() {
        let r = PlayerRecord::new(" Percy Tau ", Some("  "), SourceTag::TabularScrape).unwrap();
        assert_eq!(r.full_name, "Percy Tau");
        assert_eq!(r.club, UNKNOWN_CLUB);
    }

    #[test]
    fn row_matches_header_width_and_keeps_zero_distinct() {
        let mut r = PlayerRecord::new("A", Some("X"), SourceTag::RestApi).unwrap();
        r.goals = Some(0);
        let row = r.to_row();
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[7], "0");
        // assists never reported
        assert_eq!(row[8], "");
        assert_eq!(row.last().map(String::as_str), Some("rest_api"));
    }
}
