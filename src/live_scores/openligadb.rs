use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::provider::{
    validate_league, validate_match_id, validate_season, MatchProvider, ProviderError,
};
use crate::store::models::{Match, MatchStatus, Score, Team};

const PROVIDER_NAME: &str = "OpenLigaDB";

/// `resultTypeID` of the halftime result entry.
const RESULT_HALFTIME: i64 = 1;
/// `resultTypeID` of the final result entry.
const RESULT_FINAL: i64 = 2;

const KICKOFF_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Match provider backed by the free OpenLigaDB REST API.
/// Docs: <https://api.openligadb.de/index.html>
pub struct OpenLigaDb {
    http: Client,
    base_url: Url,
}

impl OpenLigaDb {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(base_url).context("Invalid OpenLigaDB base URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("OpenLigaDB base URL cannot carry a path: {base_url}");
        }
        Ok(OpenLigaDb { http, base_url })
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, ProviderError> {
        debug!("Fetching {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER_NAME,
                status: resp.status(),
                url: url.to_string(),
            });
        }

        let body = resp.text().await.map_err(|source| ProviderError::Transport {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_str(&body).map_err(|e| ProviderError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MatchProvider for OpenLigaDb {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_by_league(
        &self,
        league_shortcut: &str,
        season_year: i32,
    ) -> Result<Vec<Match>, ProviderError> {
        validate_league(league_shortcut)?;
        validate_season(season_year)?;

        let season = season_year.to_string();
        let url = self.endpoint(&["getmatchdata", league_shortcut, &season]);
        let raw: Vec<RawMatch> = self.get_json(url.clone()).await?;

        let now = Utc::now();
        raw.into_iter()
            .map(|m| map_match(m, now))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| ProviderError::Parse {
                url: url.to_string(),
                reason,
            })
    }

    async fn fetch_by_id(&self, match_id: i64) -> Result<Match, ProviderError> {
        validate_match_id(match_id)?;

        let id = match_id.to_string();
        let url = self.endpoint(&["getmatchdata", &id]);
        let raw: RawMatch = self.get_json(url.clone()).await?;

        map_match(raw, Utc::now()).map_err(|reason| ProviderError::Parse {
            url: url.to_string(),
            reason,
        })
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTeam {
    team_id: i64,
    team_name: String,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    team_icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    #[serde(rename = "resultTypeID")]
    result_type_id: i64,
    #[serde(rename = "resultOrderID")]
    result_order_id: i64,
    points_team1: u32,
    points_team2: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSeason {
    Number(i32),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGroup {
    #[serde(rename = "groupOrderID", default)]
    group_order_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatch {
    #[serde(rename = "matchID")]
    match_id: i64,
    #[serde(default)]
    match_date_time: Option<String>,
    #[serde(rename = "matchDateTimeUTC", default)]
    match_date_time_utc: Option<String>,
    team1: RawTeam,
    team2: RawTeam,
    #[serde(default)]
    match_results: Option<Vec<RawResult>>,
    #[serde(default)]
    match_is_finished: bool,
    league_shortcut: String,
    league_season: RawSeason,
    #[serde(default)]
    group: Option<RawGroup>,
}

// ── Mapping ──────────────────────────────────────────────────────────────────

fn map_team(raw: RawTeam) -> Team {
    let short_name = match raw.short_name {
        Some(s) if !s.is_empty() => s,
        _ => raw.team_name.chars().take(3).collect(),
    };
    Team {
        id: raw.team_id,
        name: raw.team_name,
        short_name,
        icon_url: raw.team_icon_url.filter(|u| !u.is_empty()),
    }
}

fn parse_kickoff(raw: &RawMatch) -> Result<DateTime<Utc>, String> {
    if let Some(utc) = raw.match_date_time_utc.as_deref() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(utc) {
            return Ok(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(utc, KICKOFF_FORMAT) {
            return Ok(naive.and_utc());
        }
    }
    let local = raw
        .match_date_time
        .as_deref()
        .ok_or_else(|| format!("match {} has no usable kickoff time", raw.match_id))?;
    let naive = NaiveDateTime::parse_from_str(local, KICKOFF_FORMAT)
        .map_err(|e| format!("match {}: bad kickoff time {local:?}: {e}", raw.match_id))?;
    german_local_to_utc(naive)
        .ok_or_else(|| format!("match {}: kickoff {local:?} out of range", raw.match_id))
}

/// `matchDateTime` is German wall-clock time: CET (UTC+1), or CEST (UTC+2)
/// from 02:00 on the last Sunday of March to 03:00 on the last Sunday of
/// October. The repeated hour in October resolves to CEST.
fn german_local_to_utc(local: NaiveDateTime) -> Option<DateTime<Utc>> {
    let year = local.year();
    let summer_start = last_sunday(year, 3)?.and_hms_opt(2, 0, 0)?;
    let summer_end = last_sunday(year, 10)?.and_hms_opt(3, 0, 0)?;
    let offset_hours = if local >= summer_start && local < summer_end {
        2
    } else {
        1
    };
    Some((local - chrono::Duration::hours(offset_hours)).and_utc())
}

/// Last Sunday of a 31-day month.
fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let last = NaiveDate::from_ymd_opt(year, month, 31)?;
    Some(last - chrono::Duration::days(i64::from(last.weekday().num_days_from_sunday())))
}

/// OpenLigaDB has no live status field, so the status is inferred from the
/// finished flag, the kickoff time and the halftime result entry.
fn determine_status(
    finished: bool,
    kickoff: DateTime<Utc>,
    results: &[RawResult],
    now: DateTime<Utc>,
) -> MatchStatus {
    if finished {
        return MatchStatus::Finished;
    }
    if kickoff > now {
        return MatchStatus::Scheduled;
    }

    let has_halftime = results.iter().any(|r| r.result_type_id == RESULT_HALFTIME);
    let has_final = results.iter().any(|r| r.result_type_id == RESULT_FINAL);
    if has_halftime && !has_final {
        let since_kickoff = (now - kickoff).num_minutes();
        if (45..=60).contains(&since_kickoff) {
            return MatchStatus::Halftime;
        }
    }

    MatchStatus::InPlay
}

fn extract_score(finished: bool, results: &[RawResult]) -> Option<Score> {
    if finished {
        if let Some(r) = results.iter().find(|r| r.result_type_id == RESULT_FINAL) {
            return Some(Score::new(r.points_team1, r.points_team2));
        }
    }
    results
        .iter()
        .max_by_key(|r| r.result_order_id)
        .map(|r| Score::new(r.points_team1, r.points_team2))
}

/// Rough minute estimate from wall-clock time, assuming a 15 minute break.
fn estimate_minute(finished: bool, kickoff: DateTime<Utc>, now: DateTime<Utc>) -> Option<u32> {
    if finished {
        return Some(90);
    }
    if kickoff > now {
        return None;
    }
    let elapsed = (now - kickoff).num_minutes();
    let minute = match elapsed {
        m if m > 105 => 90,
        // During the break the second-half formula would go below 45.
        m if m > 45 => (45 + (m - 60)).clamp(45, 90),
        m => m.min(45),
    };
    u32::try_from(minute).ok()
}

fn map_match(raw: RawMatch, now: DateTime<Utc>) -> Result<Match, String> {
    let kickoff = parse_kickoff(&raw)?;
    let results = raw.match_results.unwrap_or_default();
    let season_year = match raw.league_season {
        RawSeason::Number(n) => n,
        RawSeason::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("match {}: bad season {s:?}", raw.match_id))?,
    };

    Ok(Match {
        match_id: raw.match_id,
        home_team: map_team(raw.team1),
        away_team: map_team(raw.team2),
        score: extract_score(raw.match_is_finished, &results),
        status: determine_status(raw.match_is_finished, kickoff, &results, now),
        kickoff,
        minute: estimate_minute(raw.match_is_finished, kickoff, now),
        league_shortcut: raw.league_shortcut,
        season_year,
        match_day: raw.group.map(|g| g.group_order_id).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 13, 13, 30, 0).unwrap()
    }

    fn raw(json: &str) -> RawMatch {
        serde_json::from_str(json).unwrap()
    }

    const LIVE_MATCH: &str = r#"{
        "matchID": 72301,
        "matchDateTime": "2025-09-13T15:30:00",
        "matchDateTimeUTC": "2025-09-13T13:30:00Z",
        "team1": {"teamId": 40, "teamName": "FC Bayern München", "shortName": "FCB", "teamIconUrl": "https://i.imgur.com/bayern.png"},
        "team2": {"teamId": 7, "teamName": "Borussia Dortmund", "shortName": ""},
        "matchResults": [
            {"resultTypeID": 1, "resultOrderID": 1, "pointsTeam1": 1, "pointsTeam2": 0, "resultDescription": "Halbzeit"},
            {"resultTypeID": 2, "resultOrderID": 2, "pointsTeam1": 2, "pointsTeam2": 1, "resultDescription": "Endergebnis"}
        ],
        "matchIsFinished": false,
        "leagueShortcut": "bl1",
        "leagueSeason": "2025",
        "group": {"groupName": "3. Spieltag", "groupOrderID": 3}
    }"#;

    #[test]
    fn maps_live_match() {
        let now = kickoff() + chrono::Duration::minutes(30);
        let m = map_match(raw(LIVE_MATCH), now).unwrap();
        assert_eq!(m.match_id, 72301);
        assert_eq!(m.home_team.short_name, "FCB");
        assert_eq!(m.away_team.short_name, "Bor");
        assert_eq!(m.away_team.icon_url, None);
        assert_eq!(m.kickoff, kickoff());
        assert_eq!(m.status, MatchStatus::InPlay);
        // Latest result by order wins while the match is running.
        assert_eq!(m.score, Some(Score::new(2, 1)));
        assert_eq!(m.minute, Some(30));
        assert_eq!(m.season_year, 2025);
        assert_eq!(m.match_day, 3);
    }

    #[test]
    fn scheduled_match_has_no_score_or_minute() {
        let json = r#"{
            "matchID": 5, "matchDateTimeUTC": "2025-09-13T13:30:00Z",
            "team1": {"teamId": 1, "teamName": "A"}, "team2": {"teamId": 2, "teamName": "B"},
            "matchResults": [], "matchIsFinished": false,
            "leagueShortcut": "bl2", "leagueSeason": 2025
        }"#;
        let m = map_match(raw(json), kickoff() - chrono::Duration::hours(2)).unwrap();
        assert_eq!(m.status, MatchStatus::Scheduled);
        assert_eq!(m.score, None);
        assert_eq!(m.minute, None);
        assert_eq!(m.match_day, 0);
    }

    #[test]
    fn finished_match_prefers_final_result() {
        let results = vec![
            RawResult { result_type_id: 2, result_order_id: 1, points_team1: 3, points_team2: 1 },
            RawResult { result_type_id: 1, result_order_id: 2, points_team1: 1, points_team2: 1 },
        ];
        assert_eq!(extract_score(true, &results), Some(Score::new(3, 1)));
        assert_eq!(extract_score(false, &results), Some(Score::new(1, 1)));
        assert_eq!(extract_score(false, &[]), None);
    }

    #[test]
    fn halftime_window_is_inferred() {
        let ht = vec![RawResult { result_type_id: 1, result_order_id: 1, points_team1: 0, points_team2: 0 }];
        let at = |mins| kickoff() + chrono::Duration::minutes(mins);
        assert_eq!(determine_status(false, kickoff(), &ht, at(50)), MatchStatus::Halftime);
        assert_eq!(determine_status(false, kickoff(), &ht, at(70)), MatchStatus::InPlay);
        assert_eq!(determine_status(false, kickoff(), &[], at(50)), MatchStatus::InPlay);
        assert_eq!(determine_status(true, kickoff(), &ht, at(50)), MatchStatus::Finished);
    }

    #[test]
    fn minute_estimate() {
        let at = |mins| kickoff() + chrono::Duration::minutes(mins);
        assert_eq!(estimate_minute(false, kickoff(), at(12)), Some(12));
        assert_eq!(estimate_minute(false, kickoff(), at(50)), Some(45));
        assert_eq!(estimate_minute(false, kickoff(), at(80)), Some(65));
        assert_eq!(estimate_minute(false, kickoff(), at(120)), Some(90));
        assert_eq!(estimate_minute(true, kickoff(), at(10)), Some(90));
    }

    #[test]
    fn local_kickoff_is_converted_from_german_time() {
        let summer = LIVE_MATCH.replace(r#""matchDateTimeUTC": "2025-09-13T13:30:00Z","#, "");
        let m = map_match(raw(&summer), kickoff()).unwrap();
        assert_eq!(m.kickoff, kickoff());

        let winter = summer.replace("2025-09-13T15:30:00", "2025-12-06T15:30:00");
        let m = map_match(raw(&winter), kickoff()).unwrap();
        assert_eq!(m.kickoff, Utc.with_ymd_and_hms(2025, 12, 6, 14, 30, 0).unwrap());
    }

    #[test]
    fn summer_time_boundaries() {
        let local = |d: u32, m: u32, h: u32| {
            NaiveDate::from_ymd_opt(2025, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
        };
        // 2025: CEST from 30 March to 26 October.
        assert_eq!(last_sunday(2025, 3), NaiveDate::from_ymd_opt(2025, 3, 30));
        assert_eq!(last_sunday(2025, 10), NaiveDate::from_ymd_opt(2025, 10, 26));
        let utc = |n| german_local_to_utc(n).unwrap();
        assert_eq!(utc(local(30, 3, 1)), Utc.with_ymd_and_hms(2025, 3, 30, 0, 0, 0).unwrap());
        assert_eq!(utc(local(30, 3, 3)), Utc.with_ymd_and_hms(2025, 3, 30, 1, 0, 0).unwrap());
        assert_eq!(utc(local(26, 10, 2)), Utc.with_ymd_and_hms(2025, 10, 26, 0, 0, 0).unwrap());
        assert_eq!(utc(local(26, 10, 3)), Utc.with_ymd_and_hms(2025, 10, 26, 2, 0, 0).unwrap());
    }

    #[test]
    fn missing_kickoff_is_a_parse_error() {
        let json = LIVE_MATCH
            .replace(r#""matchDateTimeUTC": "2025-09-13T13:30:00Z","#, "")
            .replace(r#""matchDateTime": "2025-09-13T15:30:00","#, "");
        assert!(map_match(raw(&json), kickoff()).is_err());
    }

    #[test]
    fn bad_season_is_a_parse_error() {
        let json = LIVE_MATCH.replace(r#""leagueSeason": "2025""#, r#""leagueSeason": "twenty""#);
        assert!(map_match(raw(&json), kickoff()).is_err());
    }

    #[test]
    fn endpoint_encodes_segments() {
        let client = OpenLigaDb::new("https://api.openligadb.de", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint(&["getmatchdata", "bl1", "2025"]).as_str(),
            "https://api.openligadb.de/getmatchdata/bl1/2025"
        );
        let nested = OpenLigaDb::new("https://www.openligadb.de/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            nested.endpoint(&["getmatchdata", "a b"]).as_str(),
            "https://www.openligadb.de/api/getmatchdata/a%20b"
        );
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_request() {
        // Unroutable base: a network call would surface as Transport, not validation.
        let client = OpenLigaDb::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let err = client.fetch_by_league("xx1", 2025).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidLeague(_)));
        let err = client.fetch_by_league("bl1", 1900).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSeason(1900)));
        let err = client.fetch_by_ids(&[0, 3]).await.unwrap_err();
        assert!(err.is_validation());
    }
}
