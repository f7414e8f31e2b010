use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Command;

/// Wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A single re-armable alarm. Arming replaces any pending alarm.
pub trait Timer: Send + Sync {
    fn arm(&self, delay: Duration);
    fn cancel(&self);
}

/// Timer backed by a tokio task that sends [`Command::TimerFired`] into the
/// driver channel when it elapses.
pub struct TokioTimer {
    tx: mpsc::Sender<Command>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TokioTimer {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        TokioTimer {
            tx,
            pending: Mutex::new(None),
        }
    }

    fn replace(&self, next: Option<JoinHandle<()>>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = pending.take() {
            prev.abort();
        }
        *pending = next;
    }
}

impl Timer for TokioTimer {
    fn arm(&self, delay: Duration) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(Command::TimerFired).await.is_err() {
                warn!("Poll timer fired but the driver loop is gone");
            }
        });
        debug!("Poll timer armed for {:?}", delay);
        self.replace(Some(handle));
    }

    fn cancel(&self) {
        debug!("Poll timer cancelled");
        self.replace(None);
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.replace(None);
    }
}
