use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::datastore::TaskStore;
use crate::error::StoreError;
use crate::keyvalue::KeyValueStore;
use crate::task::TaskId;

/// Source of "now", plus the way to wait for it to move.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(std_duration) = duration.to_std() {
            std::thread::sleep(std_duration);
        }
    }
}

/// Test clock; `sleep` advances time instead of blocking.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderEvent {
    pub id: TaskId,
    pub title: String,
    pub due: DateTime<Utc>,
}

impl ReminderEvent {
    pub fn message(&self) -> String {
        format!("⏰ Reminder: \"{}\" is due soon!", self.title)
    }
}

/// Result of one scan. `events` is populated even when the write failed;
/// the flags stay unsaved in the store and the next scan retries them.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub events: Vec<ReminderEvent>,
    pub persist_error: Option<StoreError>,
}

/// Flags pending tasks whose due-instant is within `lookahead`. A task is
/// reminded at most once; the `reminder_shown` flag is the only guard.
#[derive(Debug, Clone)]
pub struct ReminderScanner {
    lookahead: Duration,
    tz: Tz,
}

impl ReminderScanner {
    pub fn new(lookahead: Duration, tz: Tz) -> Self {
        Self { lookahead, tz }
    }

    pub fn lookahead(&self) -> Duration {
        self.lookahead
    }

    #[tracing::instrument(skip(self, store), fields(now = %now))]
    pub fn scan<K: KeyValueStore>(
        &self,
        store: &mut TaskStore<K>,
        now: DateTime<Utc>,
    ) -> ScanOutcome {
        let lookahead = self.lookahead;
        let tz = self.tz;

        let flagged = store.mark_where(|task| {
            if task.completed || task.reminder_shown {
                return false;
            }
            let until_due = task.due_instant(&tz) - now;
            if until_due > Duration::zero() && until_due <= lookahead {
                task.reminder_shown = true;
                return true;
            }
            false
        });

        let events: Vec<ReminderEvent> = flagged
            .into_iter()
            .map(|task| ReminderEvent {
                id: task.id,
                due: task.due_instant(&tz),
                title: task.title,
            })
            .collect();

        if !events.is_empty() {
            info!(count = events.len(), "reminders due");
        }

        let persist_error = if store.has_unsaved_changes() {
            store.persist().err()
        } else {
            None
        };
        if let Some(err) = &persist_error {
            warn!(error = %err, "reminder flags not saved; retrying next scan");
        }

        ScanOutcome { events, persist_error }
    }
}

/// Explicitly started and stopped periodic scan. Nothing runs until
/// [`ReminderSchedule::poll`] is called.
#[derive(Debug, Clone)]
pub struct ReminderSchedule {
    interval: Duration,
    next_tick: Option<DateTime<Utc>>,
}

impl ReminderSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: None,
        }
    }

    /// The first tick is due immediately.
    pub fn start(&mut self, now: DateTime<Utc>) {
        debug!(interval_secs = self.interval.num_seconds(), "reminder schedule started");
        self.next_tick = Some(now);
    }

    pub fn stop(&mut self) {
        debug!("reminder schedule stopped");
        self.next_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn next_tick(&self) -> Option<DateTime<Utc>> {
        self.next_tick
    }

    /// Runs one scan if the schedule is running and a tick is due, then
    /// books the next tick.
    pub fn poll<K: KeyValueStore>(
        &mut self,
        store: &mut TaskStore<K>,
        scanner: &ReminderScanner,
        now: DateTime<Utc>,
    ) -> Option<ScanOutcome> {
        let due = self.next_tick?;
        if now < due {
            return None;
        }

        self.next_tick = Some(now + self.interval);
        Some(scanner.scan(store, now))
    }
}

/// Blocking driver for a [`ReminderSchedule`]. Returns the number of ticks
/// that ran. Exits when `stop` is set or `max_ticks` is reached.
#[tracing::instrument(skip_all, fields(max_ticks = ?max_ticks))]
pub fn run_until_stopped<K, C, F>(
    schedule: &mut ReminderSchedule,
    scanner: &ReminderScanner,
    store: &mut TaskStore<K>,
    clock: &C,
    stop: &AtomicBool,
    max_ticks: Option<usize>,
    mut on_event: F,
) -> usize
where
    K: KeyValueStore,
    C: Clock,
    F: FnMut(&ReminderEvent),
{
    if !schedule.is_running() {
        schedule.start(clock.now());
    }

    let mut ticks = 0_usize;
    while !stop.load(Ordering::SeqCst) {
        if max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }

        if let Some(outcome) = schedule.poll(store, scanner, clock.now()) {
            ticks += 1;
            for event in &outcome.events {
                on_event(event);
            }
        }

        if max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }

        let Some(next) = schedule.next_tick() else {
            break;
        };
        let wait = next - clock.now();
        if wait > Duration::zero() {
            clock.sleep(wait.min(Duration::seconds(1)));
        }
    }

    schedule.stop();
    info!(ticks, "reminder loop finished");
    ticks
}
