//! Filesystem change events.
//!
//! Raw `notify` events are converted into [`ChangeEvent`]s before they reach
//! the debouncer.

use std::path::PathBuf;
use std::time::Instant;

use notify::EventKind;
use notify::event::{CreateKind, ModifyKind, RemoveKind};

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Path was created.
    Created,
    /// Path contents or metadata changed.
    Modified,
    /// Path was removed.
    Removed,
    /// Path was renamed (either side of the rename).
    Moved,
}

impl ChangeKind {
    /// Convert a `notify::EventKind` to a `ChangeKind`.
    ///
    /// Returns `None` for event kinds that never warrant a reload (e.g., Access).
    pub(crate) fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Moved),
            EventKind::Modify(_) | EventKind::Any => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Removed),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }
}

/// Whether a `notify` event is known to concern a directory.
///
/// Backends only report this for some create/remove events; everything else
/// is treated as a file.
pub(crate) fn is_dir_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    )
}

/// A relevant filesystem change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path as reported by the OS watcher.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: ChangeKind,
    /// When the change was observed.
    pub timestamp: Instant,
}

impl ChangeEvent {
    /// Create an event observed now.
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Instant::now(),
        }
    }
}
