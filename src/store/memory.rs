use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::models::{LocalData, NotificationRecord, Preferences};
use super::{LocalMutator, Store};

/// In-process store for tests. `fail_writes` simulates an unavailable backend;
/// `writes_left` lets a fixed number of writes through before failing.
#[derive(Default)]
pub struct MemoryStore {
    prefs: Mutex<Preferences>,
    local: Mutex<LocalData>,
    notifications: Mutex<Vec<NotificationRecord>>,
    fail_writes: AtomicBool,
    writes_left: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn with(prefs: Preferences, local: LocalData) -> Self {
        MemoryStore {
            prefs: Mutex::new(prefs),
            local: Mutex::new(local),
            ..Default::default()
        }
    }

    pub fn local(&self) -> LocalData {
        self.local.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
        *self.writes_left.lock().unwrap() = None;
    }

    /// Allow `writes` more writes, then fail every write after them.
    pub fn fail_after(&self, writes: usize) {
        *self.writes_left.lock().unwrap() = Some(writes);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("storage unavailable");
        }
        if let Some(left) = self.writes_left.lock().unwrap().as_mut() {
            if *left == 0 {
                bail!("storage unavailable");
            }
            *left -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_preferences(&self) -> Result<Preferences> {
        Ok(self.prefs.lock().unwrap().clone())
    }

    async fn save_preferences(&self, prefs: &Preferences) -> Result<()> {
        self.check_writable()?;
        *self.prefs.lock().unwrap() = prefs.clone();
        Ok(())
    }

    async fn get_local_data(&self) -> Result<LocalData> {
        Ok(self.local.lock().unwrap().clone())
    }

    async fn save_local_data(&self, data: &LocalData) -> Result<()> {
        self.check_writable()?;
        *self.local.lock().unwrap() = data.clone();
        Ok(())
    }

    async fn with_local_data(&self, mutate: LocalMutator<'_>) -> Result<LocalData> {
        self.check_writable()?;
        let mut local = self.local.lock().unwrap();
        mutate(&mut local);
        Ok(local.clone())
    }

    async fn record_notification(&self, record: &NotificationRecord) -> Result<()> {
        self.notifications.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn recent_notifications(&self, limit: i64) -> Result<Vec<NotificationRecord>> {
        let all = self.notifications.lock().unwrap();
        Ok(all.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }
}
