use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::format::NotificationContent;
use crate::live_scores::MatchEvent;
use crate::store::models::NotificationRecord;
use crate::store::Store;

pub const NOTIFICATION_ICON: &str = "icons/icon128.png";
pub const BADGE_COLOR_LIVE: &str = "#4CAF50";
pub const BADGE_COLOR_IDLE: &str = "#607D8B";

/// A platform notification request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// `{type}-{match_id}-{timestamp_millis}`: unique per event instance
    pub id: String,
    pub title: String,
    pub message: String,
    pub context: Option<String>,
    /// 2 for goals, 1 otherwise
    pub priority: u8,
    pub icon: &'static str,
    /// Opened on click; the notification is cleared afterwards
    pub click_url: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn for_event(event: &MatchEvent, content: NotificationContent, click_url: &str) -> Self {
        let priority = match event {
            MatchEvent::Goal(_) => 2,
            MatchEvent::Status(_) => 1,
        };
        Notification {
            id: format!(
                "{}-{}-{}",
                event.kind(),
                event.match_id(),
                event.timestamp().timestamp_millis()
            ),
            title: content.title,
            message: content.message,
            context: content.context,
            priority,
            icon: NOTIFICATION_ICON,
            click_url: click_url.to_string(),
            created_at: event.timestamp(),
        }
    }
}

/// Toolbar-style summary of the watchlist.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Badge {
    pub text: String,
    pub color: Option<&'static str>,
}

impl Badge {
    /// Live count when anything watched is in play, otherwise the watchlist
    /// size. Blank when nothing is watched.
    pub fn compute(watchlist_len: usize, live_count: usize) -> Self {
        if watchlist_len == 0 {
            Badge::default()
        } else if live_count > 0 {
            Badge {
                text: live_count.to_string(),
                color: Some(BADGE_COLOR_LIVE),
            }
        } else {
            Badge {
                text: watchlist_len.to_string(),
                color: Some(BADGE_COLOR_IDLE),
            }
        }
    }
}

/// Where notifications and badge updates end up.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
    async fn set_badge(&self, badge: &Badge) -> Result<()>;
}

/// Default sink: logs each notification and keeps it in the store's history.
pub struct LogSink {
    store: Arc<dyn Store>,
}

impl LogSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        LogSink { store }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, n: &Notification) -> Result<()> {
        info!(
            "🔔 {} | {}{} [{}]",
            n.title,
            n.message,
            n.context
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default(),
            n.id
        );
        self.store
            .record_notification(&NotificationRecord {
                id: n.id.clone(),
                title: n.title.clone(),
                message: n.message.clone(),
                context: n.context.clone(),
                priority: n.priority,
                dispatched_at: n.created_at,
            })
            .await
    }

    async fn set_badge(&self, badge: &Badge) -> Result<()> {
        debug!("Badge: {:?} ({:?})", badge.text, badge.color);
        Ok(())
    }
}
