//! The polling state machine.
//!
//! ```text
//!   Idle ──reschedule──▶ Scheduled ──timer / poll now──▶ Polling
//!                           ▲                              │
//!                           ├──────── success ◀────────────┤
//!                           ├──── failure (backoff) ◀──────┤
//!                           │                              ▼
//!                           └──────── reschedule ──────  Stopped
//! ```
//!
//! All timing goes through the injected [`Timer`] and [`Clock`], all I/O
//! through the [`MatchProvider`], [`Store`] and [`NotificationSink`]. Poll
//! cycles never overlap: a poll requested while one is running is skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::schedule::{
    backoff_delay, poll_interval, BACKOFF_BASE_DELAY_SECS, MAX_CONSECUTIVE_ERRORS,
    MIN_SCHEDULABLE_INTERVAL_SECS,
};
use super::timer::{Clock, Timer};
use super::Command;
use crate::live_scores::{diff, MatchProvider, ProviderError};
use crate::notifier::{self, Badge, Notification, NotificationSink};
use crate::store::models::{LocalData, Preferences, Snapshot};
use crate::store::{update_local_data, Store};

pub const DEFAULT_NOTIFICATION_URL: &str = "https://www.openligadb.de/";

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub backoff_base: Duration,
    pub max_consecutive_errors: u32,
    /// Platform timer granularity; no delay is armed below this
    pub min_interval: Duration,
    /// Opened when a notification is clicked
    pub notification_url: String,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            backoff_base: Duration::from_secs(BACKOFF_BASE_DELAY_SECS),
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            min_interval: Duration::from_secs(MIN_SCHEDULABLE_INTERVAL_SECS),
            notification_url: DEFAULT_NOTIFICATION_URL.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl PollError {
    pub fn is_validation(&self) -> bool {
        matches!(self, PollError::Provider(e) if e.is_validation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TooManyErrors,
    InvalidInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Scheduled {
        delay_secs: u64,
        due_at: Option<DateTime<Utc>>,
        /// Set when the delay comes from the backoff schedule
        backoff_attempt: Option<u32>,
    },
    Polling,
    Stopped {
        reason: StopReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed {
        events: usize,
        notified: usize,
        next_poll_in: Duration,
    },
    /// Another cycle was in flight; nothing was done
    AlreadyRunning,
}

/// Observable orchestrator state for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub state: PollerState,
    pub badge: Badge,
    pub consecutive_errors: u32,
    pub last_poll_at: Option<DateTime<Utc>>,
}

/// Acknowledgement sent back for every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReply {
    pub fn ok() -> Self {
        CommandReply {
            success: true,
            error: None,
        }
    }

    pub fn failed(err: impl fmt::Display) -> Self {
        CommandReply {
            success: false,
            error: Some(err.to_string()),
        }
    }
}

struct CycleReport {
    prefs: Preferences,
    local: LocalData,
    events: usize,
    notified: usize,
}

pub struct Orchestrator {
    provider: Arc<dyn MatchProvider>,
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    timer: Arc<dyn Timer>,
    clock: Arc<dyn Clock>,
    settings: PollSettings,
    /// Held for the duration of a poll cycle
    poll_lock: tokio::sync::Mutex<()>,
    status: Mutex<PollerStatus>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn MatchProvider>,
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        timer: Arc<dyn Timer>,
        clock: Arc<dyn Clock>,
        settings: PollSettings,
    ) -> Self {
        Orchestrator {
            provider,
            store,
            sink,
            timer,
            clock,
            settings,
            poll_lock: tokio::sync::Mutex::new(()),
            status: Mutex::new(PollerStatus {
                state: PollerState::Idle,
                badge: Badge::default(),
                consecutive_errors: 0,
                last_poll_at: None,
            }),
        }
    }

    /// Single entry point for the host: timer fires and external commands.
    pub async fn dispatch(&self, command: Command) -> CommandReply {
        let result = match command {
            Command::PollNow | Command::TimerFired => {
                self.poll().await.map(|_| ()).map_err(anyhow::Error::from)
            }
            Command::Reschedule => self.reschedule().await,
            Command::UpdateBadge => self.update_badge().await,
        };
        match result {
            Ok(()) => CommandReply::ok(),
            Err(e) => {
                warn!("Command {:?} failed: {:#}", command, e);
                CommandReply::failed(format!("{e:#}"))
            }
        }
    }

    pub fn status(&self) -> PollerStatus {
        self.status_mut().clone()
    }

    /// Run one fetch → diff → notify → persist cycle and schedule the next
    /// one. Failures are counted and answered with backoff or a stop before
    /// being returned.
    pub async fn poll(&self) -> Result<PollOutcome, PollError> {
        let Ok(_running) = self.poll_lock.try_lock() else {
            debug!("Poll already in flight, skipping");
            return Ok(PollOutcome::AlreadyRunning);
        };
        self.set_state(PollerState::Polling);

        let report = match self.run_cycle().await {
            Ok(report) => report,
            Err(err) => {
                self.on_failure(&err).await;
                return Err(err);
            }
        };

        {
            let mut status = self.status_mut();
            status.consecutive_errors = 0;
            status.last_poll_at = report.local.last_poll_at;
        }
        if let Err(e) = self.publish_badge(&report.local).await {
            warn!("Failed to update badge: {:#}", e);
        }
        let next_poll_in = self.arm_interval(&report.prefs, &report.local);

        info!(
            "Poll complete: {} match(es), {} event(s), {} notification(s), next poll in {:?}",
            report.local.snapshot.len(),
            report.events,
            report.notified,
            next_poll_in
        );
        Ok(PollOutcome::Completed {
            events: report.events,
            notified: report.notified,
            next_poll_in,
        })
    }

    /// Re-arm the timer from current preferences without polling. Also the
    /// way out of `Stopped`.
    pub async fn reschedule(&self) -> anyhow::Result<()> {
        let prefs = self.store.get_preferences().await?;
        let local = self.store.get_local_data().await?;
        {
            let mut status = self.status_mut();
            status.consecutive_errors = local.consecutive_errors;
            status.last_poll_at = local.last_poll_at;
        }
        let delay = self.arm_interval(&prefs, &local);
        info!("Next poll in {:?}", delay);
        Ok(())
    }

    pub async fn update_badge(&self) -> anyhow::Result<()> {
        let local = self.store.get_local_data().await?;
        self.publish_badge(&local).await
    }

    async fn run_cycle(&self) -> Result<CycleReport, PollError> {
        let prefs = self
            .store
            .get_preferences()
            .await
            .map_err(PollError::Storage)?;
        let local = self
            .store
            .get_local_data()
            .await
            .map_err(PollError::Storage)?;
        let now = self.clock.now();

        let fetched = if local.watchlist.is_empty() {
            // Nothing is watched, so filtering the league list leaves nothing.
            let all = self
                .provider
                .fetch_by_league(&prefs.league_shortcut, prefs.season_year)
                .await?;
            all.into_iter()
                .filter(|m| local.is_watched(m.match_id))
                .collect()
        } else {
            self.provider.fetch_by_ids(&local.watchlist).await?
        };
        let current = Snapshot::new(fetched);

        let events = diff(&local.snapshot, &current, now);
        let mut ledger = local.processed_signatures.clone();
        let mut notified = 0;

        for event in &events {
            let signature = event.signature();
            if ledger.is_processed(&signature) {
                debug!("Event already processed: {}", signature);
                continue;
            }

            // Persisted before dispatch: if this write fails nothing is sent,
            // and a retried cycle never sends the event a second time.
            let mark = signature.clone();
            update_local_data(self.store.as_ref(), move |data| {
                if !data.processed_signatures.is_processed(&mark) {
                    data.processed_signatures.mark_processed(mark);
                }
            })
            .await
            .map_err(PollError::Storage)?;
            ledger.mark_processed(signature);

            if let Some(content) = notifier::format(event, &prefs) {
                let notification =
                    Notification::for_event(event, content, &self.settings.notification_url);
                // At most once: a failed dispatch is not retried.
                match self.sink.notify(&notification).await {
                    Ok(()) => notified += 1,
                    Err(e) => warn!("Failed to dispatch {}: {:#}", notification.id, e),
                }
            }
        }

        let saved = self
            .store
            .with_local_data(Box::new(move |data: &mut LocalData| {
                data.snapshot = current;
                data.last_poll_at = Some(now);
                data.consecutive_errors = 0;
            }))
            .await
            .map_err(PollError::Storage)?;

        Ok(CycleReport {
            prefs,
            local: saved,
            events: events.len(),
            notified,
        })
    }

    async fn on_failure(&self, err: &PollError) {
        if err.is_validation() {
            error!("Poll rejected, stopping until rescheduled: {}", err);
            self.timer.cancel();
            self.set_state(PollerState::Stopped {
                reason: StopReason::InvalidInput,
            });
            return;
        }

        error!("Polling error: {}", err);

        let fallback = self.status_mut().consecutive_errors.saturating_add(1);
        let count = match update_local_data(self.store.as_ref(), |data| {
            data.consecutive_errors = data.consecutive_errors.saturating_add(1);
            data.consecutive_errors
        })
        .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to persist error count: {:#}", e);
                fallback
            }
        };
        self.status_mut().consecutive_errors = count;

        if count >= self.settings.max_consecutive_errors {
            error!("{} consecutive poll failures, stopping polling", count);
            self.timer.cancel();
            self.set_state(PollerState::Stopped {
                reason: StopReason::TooManyErrors,
            });
        } else {
            let delay = backoff_delay(self.settings.backoff_base, count).max(self.settings.min_interval);
            warn!(
                "Backing off for {:?} (failure {}/{})",
                delay, count, self.settings.max_consecutive_errors
            );
            self.arm(delay, Some(count));
        }
    }

    async fn publish_badge(&self, local: &LocalData) -> anyhow::Result<()> {
        let badge = Badge::compute(
            local.watchlist.len(),
            local.snapshot.live_count(&local.watchlist),
        );
        self.status_mut().badge = badge.clone();
        self.sink.set_badge(&badge).await
    }

    fn arm_interval(&self, prefs: &Preferences, local: &LocalData) -> Duration {
        let delay = poll_interval(prefs, local).max(self.settings.min_interval);
        self.arm(delay, None);
        delay
    }

    fn arm(&self, delay: Duration, backoff_attempt: Option<u32>) {
        self.timer.arm(delay);
        let due_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| self.clock.now().checked_add_signed(d));
        self.set_state(PollerState::Scheduled {
            delay_secs: delay.as_secs(),
            due_at,
            backoff_attempt,
        });
    }

    fn set_state(&self, state: PollerState) {
        self.status_mut().state = state;
    }

    fn status_mut(&self) -> MutexGuard<'_, PollerStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}
