use serde::Serialize;

use crate::live_scores::diff::{format_score, GoalEvent, MatchEvent, StatusEvent};
use crate::store::models::{MatchStatus, Preferences};

/// User-facing text for a single event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
    /// Secondary line, e.g. who scored
    pub context: Option<String>,
}

/// Render an event, or `None` if its category is switched off.
pub fn format(event: &MatchEvent, prefs: &Preferences) -> Option<NotificationContent> {
    match event {
        MatchEvent::Goal(ev) if prefs.notifications.goals => Some(format_goal(ev)),
        MatchEvent::Status(ev) if prefs.notifications.match_events => Some(format_status(ev)),
        _ => None,
    }
}

fn format_goal(ev: &GoalEvent) -> NotificationContent {
    let home_scored = ev.new_score.home > ev.old_score.home;
    let away_scored = ev.new_score.away > ev.old_score.away;

    let scorer = match (home_scored, away_scored) {
        (true, false) => Some(&ev.home_team),
        (false, true) => Some(&ev.away_team),
        _ => None,
    };

    NotificationContent {
        title: "Goal!".to_string(),
        message: format!(
            "{} {} {}",
            ev.home_team,
            format_score(Some(ev.new_score)),
            ev.away_team
        ),
        context: scorer.map(|team| format!("{team} scores!")),
    }
}

fn status_title(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::InPlay => "Kick Off!",
        MatchStatus::Halftime => "Halftime",
        MatchStatus::Finished => "Full Time",
        MatchStatus::Postponed => "Match Postponed",
        MatchStatus::Cancelled => "Match Cancelled",
        MatchStatus::Scheduled => "Match Update",
    }
}

fn format_status(ev: &StatusEvent) -> NotificationContent {
    let message = match ev.score {
        Some(_) => format!(
            "{} {} {}",
            ev.home_team,
            format_score(ev.score),
            ev.away_team
        ),
        None => format!("{} vs {}", ev.home_team, ev.away_team),
    };

    NotificationContent {
        title: status_title(ev.new_status).to_string(),
        message,
        context: Some(ev.new_status.label().to_string()),
    }
}
