//! Event debouncing for live reload.
//!
//! Editors emit several filesystem operations per save (temp file, rename,
//! metadata touch). The debouncer collapses such a burst into a single
//! reload: the first event of a burst opens a window, later events are
//! absorbed without moving the deadline, and exactly one batch is released
//! once the window elapses.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::event::{ChangeEvent, ChangeKind};

/// A burst of changes released by the debouncer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebouncedBatch {
    /// Net change per path, sorted by path. Paths created and removed within
    /// the same window are left out.
    pub changes: Vec<(PathBuf, ChangeKind)>,
    /// Number of raw events absorbed into this batch.
    pub events: usize,
}

/// Window that is currently open.
struct PendingBatch {
    deadline: Instant,
    changes: HashMap<PathBuf, ChangeKind>,
    events: usize,
}

/// Thread-safe trailing-edge debouncer.
pub struct Debouncer {
    pending: Mutex<Option<PendingBatch>>,
    window: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the specified window.
    pub fn new(window: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            window,
        }
    }

    /// Debounce window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an event.
    ///
    /// Thread-safe, can be called from watcher callbacks. Returns `true` if
    /// the event opened a new window.
    pub fn record(&self, event: ChangeEvent) -> bool {
        use std::collections::hash_map::Entry;

        let mut pending = self.lock();
        let opened = pending.is_none();
        let batch = pending.get_or_insert_with(|| PendingBatch {
            deadline: event.timestamp + self.window,
            changes: HashMap::new(),
            events: 0,
        });

        batch.events += 1;
        match batch.changes.entry(event.path) {
            Entry::Vacant(entry) => {
                entry.insert(event.kind);
            }
            Entry::Occupied(mut entry) => {
                if let Some(coalesced) = Self::coalesce(*entry.get(), event.kind) {
                    entry.insert(coalesced);
                } else {
                    entry.remove();
                }
            }
        }

        opened
    }

    /// Coalesce two change kinds for the same path.
    ///
    /// Returns `None` if the path should drop out of the batch summary
    /// (created then removed within one window).
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Created, Modified, Moved, Removed};

        match (existing, new) {
            // Created + anything
            (Created, Created | Modified) => Some(Created),
            (Created, Removed) => None,
            (Created, Moved) => Some(Moved),

            // Modified + anything
            (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) => Some(Removed),
            (Modified, Moved) => Some(Moved),

            // Removed + anything
            (Removed, Created) => Some(Modified), // Replaced (write temp + rename)
            (Removed, Modified | Removed) => Some(Removed),
            (Removed, Moved) => Some(Moved),

            // Moved + anything
            (Moved, Removed) => Some(Removed),
            (Moved, Created | Modified | Moved) => Some(Moved),
        }
    }

    /// Release the pending batch if its window has elapsed.
    pub fn drain_ready(&self) -> Option<DebouncedBatch> {
        self.drain_ready_at(Instant::now())
    }

    /// Release the pending batch if its window has elapsed at `now`.
    pub fn drain_ready_at(&self, now: Instant) -> Option<DebouncedBatch> {
        let mut pending = self.lock();
        if pending.as_ref().is_none_or(|batch| batch.deadline > now) {
            return None;
        }

        let batch = pending.take()?;
        let mut changes: Vec<_> = batch.changes.into_iter().collect();
        changes.sort_by(|a, b| a.0.cmp(&b.0));

        Some(DebouncedBatch {
            changes,
            events: batch.events,
        })
    }

    /// Deadline of the open window, for timer scheduling.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().as_ref().map(|batch| batch.deadline)
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingBatch>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
