//! Shared cron engine.
//!
//! A single background loop drives every cron-based generator in the
//! process. The loop keeps all entries, sleeps until the earliest next fire
//! time (or until a new entry is registered) and forwards a copy of each
//! fired entry's payload to its sender. Entries whose receiver has gone away
//! are dropped on the next pass.
//!
//! The loop is spawned lazily on the first registration so the engine can be
//! created outside a runtime.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::event_data::EventData;
use crate::core::schedule::Schedule;

/// Identifier of a registered cron entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

struct Entry {
    id: EntryId,
    schedule: Schedule,
    next: Option<DateTime<Local>>,
    payload: EventData,
    tx: mpsc::UnboundedSender<EventData>,
}

#[derive(Default)]
struct Shared {
    entries: Mutex<Vec<Entry>>,
    wake: Notify,
}

impl Shared {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide cron scheduler.
pub struct CronEngine {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl CronEngine {
    /// Create an idle engine.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            next_id: AtomicU64::new(1),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register `schedule`; every fire sends a clone of `payload` to `tx`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(
        &self,
        schedule: Schedule,
        payload: EventData,
        tx: mpsc::UnboundedSender<EventData>,
    ) -> EntryId {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let next = schedule.next_after(&Local::now());
        tracing::debug!(cron = schedule.expression(), next = ?next, "cron entry registered");

        self.shared.entries().push(Entry {
            id,
            schedule,
            next,
            payload,
            tx,
        });
        self.shared.wake.notify_one();

        if !self.started.swap(true, Ordering::SeqCst) {
            tokio::spawn(run(Arc::clone(&self.shared), self.shutdown.clone()));
        }
        id
    }

    /// Remove an entry. Returns false if it was not registered.
    pub fn remove(&self, id: EntryId) -> bool {
        let mut entries = self.shared.entries();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        before != entries.len()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.shared.entries().len()
    }

    /// Returns true when no entry is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the background loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for CronEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CronEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronEngine")
            .field("entries", &self.len())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

/// Main engine loop.
async fn run(shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        let notified = shared.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let sleep_for = fire_due(&shared, Local::now());

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("cron engine stopped");
                return;
            }
            _ = &mut notified => {}
            _ = sleep_until(sleep_for) => {}
        }
    }
}

/// Fire every entry due at `now`, reschedule it, and return how long to
/// sleep until the earliest upcoming fire.
fn fire_due(shared: &Shared, now: DateTime<Local>) -> Option<Duration> {
    let mut entries = shared.entries();
    entries.retain(|e| !e.tx.is_closed());

    for entry in entries.iter_mut() {
        let Some(next) = entry.next else {
            continue;
        };
        if next > now {
            continue;
        }
        tracing::trace!(cron = entry.schedule.expression(), "cron entry fired");
        if entry.tx.send(entry.payload.clone()).is_err() {
            entry.next = None;
            continue;
        }
        entry.next = entry.schedule.next_after(&now);
    }

    entries
        .iter()
        .filter_map(|e| e.next)
        .min()
        .map(|earliest| (earliest - now).to_std().unwrap_or(Duration::ZERO))
}

async fn sleep_until(after: Option<Duration>) {
    match after {
        Some(d) => tokio::time::sleep_until(Instant::now() + d).await,
        None => std::future::pending().await,
    }
}
