use async_trait::async_trait;
use thiserror::Error;

use crate::store::models::Match;

/// League shortcuts accepted by the provider.
pub const VALID_LEAGUE_SHORTCUTS: &[&str] = &["bl1", "bl2", "bl3", "dfb"];

/// First Bundesliga season.
pub const SEASON_YEAR_MIN: i32 = 1963;
pub const SEASON_YEAR_MAX: i32 = 2100;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid league shortcut: {0} (allowed: {allowed})", allowed = VALID_LEAGUE_SHORTCUTS.join(", "))]
    InvalidLeague(String),

    #[error("invalid season year: {0} (must be between {min} and {max})", min = SEASON_YEAR_MIN, max = SEASON_YEAR_MAX)]
    InvalidSeason(i32),

    #[error("invalid match id: {0} (must be a positive integer)")]
    InvalidMatchId(i64),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned {status} for {url}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("malformed response from {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl ProviderError {
    /// Input validation failures: retrying the same request cannot succeed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidLeague(_)
                | ProviderError::InvalidSeason(_)
                | ProviderError::InvalidMatchId(_)
        )
    }
}

pub fn validate_league(shortcut: &str) -> Result<(), ProviderError> {
    if VALID_LEAGUE_SHORTCUTS.contains(&shortcut) {
        Ok(())
    } else {
        Err(ProviderError::InvalidLeague(shortcut.to_string()))
    }
}

pub fn validate_season(year: i32) -> Result<(), ProviderError> {
    if (SEASON_YEAR_MIN..=SEASON_YEAR_MAX).contains(&year) {
        Ok(())
    } else {
        Err(ProviderError::InvalidSeason(year))
    }
}

pub fn validate_match_id(match_id: i64) -> Result<(), ProviderError> {
    if match_id > 0 {
        Ok(())
    } else {
        Err(ProviderError::InvalidMatchId(match_id))
    }
}

/// Trait that every match data source must implement.
#[async_trait]
pub trait MatchProvider: Send + Sync {
    /// All matches of a league season.
    async fn fetch_by_league(
        &self,
        league_shortcut: &str,
        season_year: i32,
    ) -> Result<Vec<Match>, ProviderError>;

    /// A single match by provider id.
    async fn fetch_by_id(&self, match_id: i64) -> Result<Match, ProviderError>;

    /// Concurrent composition of [`fetch_by_id`](Self::fetch_by_id). Fails as
    /// a whole if any single request fails.
    async fn fetch_by_ids(&self, match_ids: &[i64]) -> Result<Vec<Match>, ProviderError> {
        futures_util::future::try_join_all(match_ids.iter().map(|id| self.fetch_by_id(*id))).await
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
