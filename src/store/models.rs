use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::notifier::Deduplicator;

/// A football team as reported by the match provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub icon_url: Option<String>,
}

/// Home/away goal tally. `Option<Score>::None` means "no score yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub const NIL: Score = Score { home: 0, away: 0 };

    pub fn new(home: u32, away: u32) -> Self {
        Score { home, away }
    }

    pub fn is_nil(&self) -> bool {
        self.home == 0 && self.away == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InPlay,
    Halftime,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    /// Statuses that drive the fast polling interval and the badge count.
    pub fn is_live(self) -> bool {
        matches!(self, MatchStatus::InPlay | MatchStatus::Halftime)
    }

    /// Stable identifier used in event signatures and notification ids.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::InPlay => "in_play",
            MatchStatus::Halftime => "halftime",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "Scheduled",
            MatchStatus::InPlay => "Live",
            MatchStatus::Halftime => "Halftime",
            MatchStatus::Finished => "Full Time",
            MatchStatus::Postponed => "Postponed",
            MatchStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical match representation produced by a provider on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: i64,
    pub home_team: Team,
    pub away_team: Team,
    pub score: Option<Score>,
    pub status: MatchStatus,
    pub kickoff: DateTime<Utc>,
    /// Estimated minute of play, if the match has started
    pub minute: Option<u32>,
    pub league_shortcut: String,
    pub season_year: i32,
    pub match_day: u32,
}

/// Last known state of all matches of interest. Holds at most one match per id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Match>", into = "Vec<Match>")]
pub struct Snapshot {
    matches: Vec<Match>,
}

impl Snapshot {
    /// Build a snapshot, keeping the first occurrence of each match id.
    pub fn new(matches: Vec<Match>) -> Self {
        let mut seen = HashSet::with_capacity(matches.len());
        let matches = matches
            .into_iter()
            .filter(|m| seen.insert(m.match_id))
            .collect();
        Snapshot { matches }
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn get(&self, match_id: i64) -> Option<&Match> {
        self.matches.iter().find(|m| m.match_id == match_id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Number of watched matches currently in play or at halftime.
    pub fn live_count(&self, watchlist: &[i64]) -> usize {
        self.matches
            .iter()
            .filter(|m| watchlist.contains(&m.match_id) && m.status.is_live())
            .count()
    }
}

impl From<Vec<Match>> for Snapshot {
    fn from(matches: Vec<Match>) -> Self {
        Snapshot::new(matches)
    }
}

impl From<Snapshot> for Vec<Match> {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.matches
    }
}

// ── Preferences (synced partition) ───────────────────────────────────────────

/// User-editable settings. Missing fields fall back to defaults on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub league_shortcut: String,
    pub season_year: i32,
    pub notifications: NotificationPrefs,
    pub polling: PollingPrefs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPrefs {
    pub goals: bool,
    /// Kickoff, halftime, full time, postponements and cancellations
    pub match_events: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingPrefs {
    pub in_play_interval_secs: u64,
    pub idle_interval_secs: u64,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            league_shortcut: "bl1".to_string(),
            season_year: Utc::now().year(),
            notifications: NotificationPrefs::default(),
            polling: PollingPrefs::default(),
        }
    }
}

impl Preferences {
    /// Apply a partial JSON update on top of these preferences. Nested
    /// objects merge key by key; any other value replaces the current one.
    pub fn merged(&self, patch: serde_json::Value) -> serde_json::Result<Preferences> {
        let mut current = serde_json::to_value(self)?;
        merge_json(&mut current, patch);
        serde_json::from_value(current)
    }
}

fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        NotificationPrefs {
            goals: true,
            match_events: true,
        }
    }
}

impl Default for PollingPrefs {
    fn default() -> Self {
        PollingPrefs {
            in_play_interval_secs: 60,
            idle_interval_secs: 300,
        }
    }
}

// ── Local partition ──────────────────────────────────────────────────────────

/// Volatile polling state, always read and written as one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalData {
    pub watchlist: Vec<i64>,
    pub snapshot: Snapshot,
    pub processed_signatures: Deduplicator,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}

impl LocalData {
    pub fn is_watched(&self, match_id: i64) -> bool {
        self.watchlist.contains(&match_id)
    }

    /// Returns `true` if the id was newly added.
    pub fn watch(&mut self, match_id: i64) -> bool {
        if self.is_watched(match_id) {
            return false;
        }
        self.watchlist.push(match_id);
        true
    }

    /// Returns `true` if the id was present.
    pub fn unwatch(&mut self, match_id: i64) -> bool {
        let before = self.watchlist.len();
        self.watchlist.retain(|id| *id != match_id);
        self.watchlist.len() != before
    }

    /// Flip watch state; returns the new state.
    pub fn toggle_watch(&mut self, match_id: i64) -> bool {
        if self.unwatch(match_id) {
            false
        } else {
            self.watchlist.push(match_id);
            true
        }
    }
}

// ── Notification history ─────────────────────────────────────────────────────

/// A dispatched notification, kept for the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub title: String,
    pub message: String,
    pub context: Option<String>,
    pub priority: u8,
    pub dispatched_at: DateTime<Utc>,
}


#[cfg(test)]
mod tests {
    use super::fixtures::fixture;
    use super::*;

    #[test]
    fn snapshot_keeps_first_match_per_id() {
        let snap = Snapshot::new(vec![
            fixture(1, None, MatchStatus::Scheduled),
            fixture(1, Some(Score::new(2, 0)), MatchStatus::InPlay),
            fixture(2, None, MatchStatus::Scheduled),
        ]);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get(1).unwrap().status, MatchStatus::Scheduled);
    }

    #[test]
    fn live_count_only_counts_watched_matches() {
        let snap = Snapshot::new(vec![
            fixture(1, None, MatchStatus::InPlay),
            fixture(2, None, MatchStatus::Halftime),
            fixture(3, None, MatchStatus::Finished),
        ]);
        assert_eq!(snap.live_count(&[1, 3]), 1);
        assert_eq!(snap.live_count(&[1, 2, 3]), 2);
        assert_eq!(snap.live_count(&[]), 0);
    }

    #[test]
    fn preferences_missing_fields_take_defaults() {
        let raw = r#"{"league_shortcut":"bl2","notifications":{"goals":false}}"#;
        let prefs: Preferences = serde_json::from_str(raw).unwrap();
        assert_eq!(prefs.league_shortcut, "bl2");
        assert!(!prefs.notifications.goals);
        assert!(prefs.notifications.match_events);
        assert_eq!(prefs.polling, PollingPrefs::default());
        assert_eq!(prefs.season_year, Utc::now().year());
    }

    #[test]
    fn partial_update_keeps_stored_fields() {
        let mut stored = Preferences::default();
        stored.league_shortcut = "bl2".into();
        stored.season_year = 2024;
        stored.polling.idle_interval_secs = 600;

        let patch = serde_json::json!({"notifications": {"goals": false}});
        let merged = stored.merged(patch).unwrap();
        assert_eq!(merged.league_shortcut, "bl2");
        assert_eq!(merged.season_year, 2024);
        assert_eq!(merged.polling.idle_interval_secs, 600);
        assert!(!merged.notifications.goals);
        assert!(merged.notifications.match_events);

        let bad = serde_json::json!({"season_year": "soon"});
        assert!(stored.merged(bad).is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&MatchStatus::InPlay).unwrap();
        assert_eq!(json, "\"in_play\"");
        assert_eq!(MatchStatus::Finished.label(), "Full Time");
    }

    #[test]
    fn watchlist_toggle() {
        let mut local = LocalData::default();
        assert!(local.watch(7));
        assert!(!local.watch(7));
        assert!(!local.toggle_watch(7));
        assert!(local.watchlist.is_empty());
        assert!(local.toggle_watch(7));
        assert!(local.unwatch(7));
        assert!(!local.unwatch(7));
    }
}
