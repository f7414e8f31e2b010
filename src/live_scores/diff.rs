//! Snapshot comparison: turns two successive match lists into goal and
//! status events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::store::models::{Match, MatchStatus, Score, Snapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalEvent {
    pub match_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub old_score: Score,
    pub new_score: Score,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub match_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub old_status: MatchStatus,
    pub new_status: MatchStatus,
    pub score: Option<Score>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    Goal(GoalEvent),
    Status(StatusEvent),
}

impl MatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchEvent::Goal(_) => "goal",
            MatchEvent::Status(_) => "status",
        }
    }

    pub fn match_id(&self) -> i64 {
        match self {
            MatchEvent::Goal(ev) => ev.match_id,
            MatchEvent::Status(ev) => ev.match_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MatchEvent::Goal(ev) => ev.timestamp,
            MatchEvent::Status(ev) => ev.timestamp,
        }
    }

    /// Identifies what the event means, not when it was seen. Two events with
    /// the same signature are duplicates.
    pub fn signature(&self) -> String {
        match self {
            MatchEvent::Goal(ev) => format!(
                "goal:{}:{}-{}",
                ev.match_id, ev.new_score.home, ev.new_score.away
            ),
            MatchEvent::Status(ev) => format!("status:{}:{}", ev.match_id, ev.new_status),
        }
    }
}

/// Transitions worth a notification. Anything into postponed/cancelled is
/// handled separately.
const SIGNIFICANT_TRANSITIONS: &[(MatchStatus, MatchStatus)] = &[
    (MatchStatus::Scheduled, MatchStatus::InPlay),
    (MatchStatus::InPlay, MatchStatus::Halftime),
    (MatchStatus::Halftime, MatchStatus::InPlay),
    (MatchStatus::InPlay, MatchStatus::Finished),
    (MatchStatus::Halftime, MatchStatus::Finished),
];

/// Compare two snapshots and return the detected events in current-snapshot
/// order. Within a match the goal event precedes the status event.
pub fn diff(previous: &Snapshot, current: &Snapshot, now: DateTime<Utc>) -> Vec<MatchEvent> {
    let previous_by_id: HashMap<i64, &Match> = previous
        .matches()
        .iter()
        .map(|m| (m.match_id, m))
        .collect();

    let mut events = Vec::new();

    for curr in current.matches() {
        let Some(prev) = previous_by_id.get(&curr.match_id) else {
            // First sighting of a match that is already running.
            if curr.status == MatchStatus::InPlay {
                events.push(MatchEvent::Status(status_event(
                    curr,
                    MatchStatus::Scheduled,
                    now,
                )));
            }
            continue;
        };

        if let Some(ev) = detect_score_change(prev, curr, now) {
            events.push(MatchEvent::Goal(ev));
        }
        if let Some(ev) = detect_status_change(prev, curr, now) {
            events.push(MatchEvent::Status(ev));
        }
    }

    events
}

fn detect_score_change(prev: &Match, curr: &Match, now: DateTime<Utc>) -> Option<GoalEvent> {
    let (old_score, new_score) = match (prev.score, curr.score) {
        // Tracking starts with a score already on the board. A bare 0-0 is
        // just kickoff and not a goal.
        (None, Some(new)) if !new.is_nil() => (Score::NIL, new),
        // NOTE: decreases (provider corrections) are reported as goals too.
        (Some(old), Some(new)) if old != new => (old, new),
        _ => return None,
    };

    Some(GoalEvent {
        match_id: curr.match_id,
        home_team: curr.home_team.name.clone(),
        away_team: curr.away_team.name.clone(),
        old_score,
        new_score,
        timestamp: now,
    })
}

fn detect_status_change(prev: &Match, curr: &Match, now: DateTime<Utc>) -> Option<StatusEvent> {
    if prev.status == curr.status {
        return None;
    }
    let significant = SIGNIFICANT_TRANSITIONS.contains(&(prev.status, curr.status))
        || matches!(curr.status, MatchStatus::Postponed | MatchStatus::Cancelled);

    significant.then(|| status_event(curr, prev.status, now))
}

fn status_event(curr: &Match, old_status: MatchStatus, now: DateTime<Utc>) -> StatusEvent {
    StatusEvent {
        match_id: curr.match_id,
        home_team: curr.home_team.name.clone(),
        away_team: curr.away_team.name.clone(),
        old_status,
        new_status: curr.status,
        score: curr.score,
        timestamp: now,
    }
}

/// `"2 : 1"`, or `"- : -"` before any score is known.
pub fn format_score(score: Option<Score>) -> String {
    match score {
        Some(s) => format!("{} : {}", s.home, s.away),
        None => "- : -".to_string(),
    }
}
