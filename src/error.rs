use thiserror::Error;

/// Terminal outcome of a fetch once its retry budget is spent.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx status, transport failure or timeout on every attempt.
    #[error("{url} unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        url: String,
        attempts: u32,
        status: Option<u16>,
        last_error: String,
    },

    /// The source kept answering 429.
    #[error("{url} still rate limited after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    /// The body arrived but could not be decoded as the expected content.
    #[error("malformed payload from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Unavailable { url, .. }
            | FetchError::RateLimited { url, .. }
            | FetchError::Malformed { url, .. } => url,
        }
    }
}

/// Why a single row (or detail payload) produced no record.
#[derive(Debug, Error, PartialEq)]
pub enum RowSkip {
    #[error("row has {found} columns, expected at least {expected}")]
    TooFewColumns { found: usize, expected: usize },

    #[error("row has no player name")]
    EmptyName,

    #[error("unexpected payload shape: {0}")]
    Malformed(String),
}
