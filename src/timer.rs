//! Auto-Changer Timer
//!
//! Fires at a fixed interval so the daemon can switch to a random favorite.
//!
//! ## Timer Behavior
//! - Interval is one of the presets in [`crate::config::INTERVALS`]
//! - The first change happens one full interval after start (or after enabling)
//! - Changing the interval restarts the countdown
//! - Enabled state and interval are persisted to `settings.json`

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

use crate::config::{AutoChangeInterval, JsonSettings};

/// How often a disabled timer wakes up to re-check its state
const DISABLED_POLL: Duration = Duration::from_secs(60);

/// Interval-driven trigger for automatic wallpaper changes.
#[derive(Debug)]
pub struct AutoChanger {
    /// Whether the timer is currently enabled
    enabled: Arc<AtomicBool>,
    /// Index into the interval presets
    interval_index: Arc<AtomicUsize>,
    /// Next scheduled change
    next_run: Arc<RwLock<Option<DateTime<Local>>>>,
    /// Wakes the loop when the schedule changes
    reschedule: Arc<Notify>,
    /// Where enabled/interval are persisted
    settings: JsonSettings,
    /// Background task handle (not cloneable, so wrapped in Option)
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AutoChanger {
    /// Creates a timer with the state stored in `settings`.
    pub fn new(settings: JsonSettings) -> Self {
        let stored = settings.load();
        Self {
            enabled: Arc::new(AtomicBool::new(stored.auto_changer_enabled)),
            interval_index: Arc::new(AtomicUsize::new(stored.auto_changer_interval)),
            next_run: Arc::new(RwLock::new(None)),
            reschedule: Arc::new(Notify::new()),
            settings,
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Starts the timer loop.
    ///
    /// A message is sent on the returned receiver every time a change is due.
    /// The channel holds a single pending tick, so ticks that pile up while a
    /// change is still running collapse into one.
    pub fn start(&self) -> tokio::sync::mpsc::Receiver<()> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        let enabled = self.enabled.clone();
        let interval_index = self.interval_index.clone();
        let next_run = self.next_run.clone();
        let reschedule = self.reschedule.clone();

        let handle = tokio::spawn(async move {
            loop {
                if !enabled.load(Ordering::SeqCst) {
                    *next_run.write().await = None;
                    tokio::select! {
                        _ = tokio::time::sleep(DISABLED_POLL) => {}
                        _ = reschedule.notified() => {}
                    }
                    continue;
                }

                let period = AutoChangeInterval::from_index(interval_index.load(Ordering::SeqCst)).period;
                *next_run.write().await = Some(next_run_after(Local::now(), period));

                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        if enabled.load(Ordering::SeqCst) && tx.try_send(()).is_err() && tx.is_closed() {
                            break;
                        }
                    }
                    // Enabled state or interval changed: start the countdown over
                    _ = reschedule.notified() => {}
                }
            }
        });

        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }

        rx
    }

    /// Stop the timer background task
    pub fn stop(&self) {
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    /// Enables or disables the timer and, if given, switches to another interval preset.
    pub fn configure(&self, enabled: bool, interval_index: Option<usize>) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if let Some(index) = interval_index {
            self.interval_index.store(index, Ordering::SeqCst);
        }
        self.reschedule.notify_one();

        let index = self.interval_index.load(Ordering::SeqCst);
        if let Err(e) = self.settings.update(|s| {
            s.auto_changer_enabled = enabled;
            s.auto_changer_interval = index;
        }) {
            tracing::warn!("could not save auto-changer settings: {e}");
        }
    }

    /// Check if the timer is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn interval_index(&self) -> usize {
        self.interval_index.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> AutoChangeInterval {
        AutoChangeInterval::from_index(self.interval_index())
    }

    /// Get the next scheduled change time
    pub async fn next_run(&self) -> Option<DateTime<Local>> {
        *self.next_run.read().await
    }

    /// Get the next change time formatted as a string ("" when disabled)
    pub async fn next_run_string(&self) -> String {
        if !self.is_enabled() {
            return String::new();
        }

        match self.next_run().await {
            Some(dt) => dt.format("%a %b %d %H:%M").to_string(),
            None => "Scheduled".to_string(),
        }
    }
}

impl Drop for AutoChanger {
    fn drop(&mut self) {
        self.stop();
    }
}

/// When a change started at `now` with `period` is due.
fn next_run_after(now: DateTime<Local>, period: Duration) -> DateTime<Local> {
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}
