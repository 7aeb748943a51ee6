//! Filesystem watcher for live reload.
//!
//! Bridges OS change notifications (via `notify`) into the pattern filter and
//! the debouncer, and triggers [`Broadcaster::notify`] once per debounced
//! burst. All of this runs on one dedicated thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::WatchConfig;
use crate::broadcaster::Broadcaster;
use crate::debouncer::{DebouncedBatch, Debouncer};
use crate::event::{ChangeEvent, ChangeKind, is_dir_event};
use crate::patterns::PatternMatcher;

/// Watcher startup error.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The OS notification mechanism could not be initialized.
    #[error("failed to initialize filesystem watcher: {0}")]
    Init(#[from] notify::Error),
    /// None of the configured roots exists or could be watched.
    #[error("no live reload root could be watched")]
    NoRoots,
    /// The watcher thread could not be spawned.
    #[error("failed to spawn watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Message sent to the watcher thread.
enum Control {
    Fs(notify::Result<Event>),
    Shutdown,
}

/// A registered root directory.
#[derive(Debug)]
struct WatchRoot {
    path: PathBuf,
    /// Canonical form, as reported by backends that resolve symlinks.
    canonical: PathBuf,
}

impl WatchRoot {
    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.canonical)
            .or_else(|_| path.strip_prefix(&self.path))
            .ok()
    }
}

/// Watches the configured roots and notifies the broadcaster on changes.
pub struct FileWatcher {
    config: WatchConfig,
    matcher: Arc<PatternMatcher>,
    debounce: Duration,
    broadcaster: Arc<Broadcaster>,
    started: AtomicBool,
    watched_roots: AtomicUsize,
    control: Mutex<Option<mpsc::Sender<Control>>>,
}

impl FileWatcher {
    /// Create a watcher. Nothing is registered until [`start`](Self::start).
    pub fn new(config: WatchConfig, debounce: Duration, broadcaster: Arc<Broadcaster>) -> Self {
        let matcher = Arc::new(PatternMatcher::from_config(&config));
        Self {
            config,
            matcher,
            debounce,
            broadcaster,
            started: AtomicBool::new(false),
            watched_roots: AtomicUsize::new(0),
            control: Mutex::new(None),
        }
    }

    /// Start watching.
    ///
    /// Returns the number of roots registered. Calling `start` on a running
    /// watcher registers nothing new and returns the same count. Missing roots
    /// are skipped; an error is returned only when nothing can be watched.
    pub fn start(&self) -> Result<usize, WatchError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(self.watched_roots.load(Ordering::Acquire));
        }

        match self.spawn() {
            Ok(count) => {
                self.watched_roots.store(count, Ordering::Release);
                Ok(count)
            }
            Err(e) => {
                self.started.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Stop watching and release OS watches.
    pub fn stop(&self) {
        if let Some(tx) = self.control_lock().take() {
            let _ = tx.send(Control::Shutdown);
            self.watched_roots.store(0, Ordering::Release);
            self.started.store(false, Ordering::Release);
        }
    }

    /// Whether the watcher thread is running.
    pub fn is_running(&self) -> bool {
        self.control_lock().is_some()
    }

    /// Compiled pattern matcher.
    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    fn spawn(&self) -> Result<usize, WatchError> {
        let (tx, rx) = mpsc::channel();

        let callback_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = callback_tx.send(Control::Fs(res));
        })?;

        let roots = self.register_roots(&mut watcher);
        if roots.is_empty() {
            return Err(WatchError::NoRoots);
        }
        let count = roots.len();

        let worker = WatchWorker {
            roots,
            matcher: Arc::clone(&self.matcher),
            debouncer: Debouncer::new(self.debounce),
            broadcaster: Arc::clone(&self.broadcaster),
        };

        // The notify watcher is moved in to keep OS watches alive
        thread::Builder::new()
            .name("livereload-watcher".to_owned())
            .spawn(move || {
                let _watcher = watcher;
                worker.run(&rx);
            })
            .map_err(WatchError::Spawn)?;

        *self.control_lock() = Some(tx);
        Ok(count)
    }

    /// Register every existing root, skipping the ones that fail.
    fn register_roots(&self, watcher: &mut RecommendedWatcher) -> Vec<WatchRoot> {
        let mut roots: Vec<WatchRoot> = Vec::new();

        for path in &self.config.roots {
            if !path.is_dir() {
                tracing::info!(root = %path.display(), "Live reload root does not exist, skipping");
                continue;
            }

            let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
            if roots.iter().any(|root| root.canonical == canonical) {
                continue;
            }

            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    tracing::info!(root = %path.display(), "Watching for changes");
                    roots.push(WatchRoot {
                        path: path.clone(),
                        canonical,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        root = %path.display(),
                        error = %e,
                        "Failed to watch live reload root, skipping"
                    );
                }
            }
        }

        roots
    }

    fn control_lock(&self) -> MutexGuard<'_, Option<mpsc::Sender<Control>>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the watcher thread.
struct WatchWorker {
    roots: Vec<WatchRoot>,
    matcher: Arc<PatternMatcher>,
    debouncer: Debouncer,
    broadcaster: Arc<Broadcaster>,
}

impl WatchWorker {
    fn run(&self, rx: &mpsc::Receiver<Control>) {
        loop {
            // Sleep until the next message, or until the open window elapses
            let message = match self.debouncer.next_deadline() {
                Some(deadline) => {
                    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(message) => Some(message),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
            };

            match message {
                Some(Control::Fs(res)) => self.record(res),
                Some(Control::Shutdown) => break,
                None => {}
            }

            if let Some(batch) = self.debouncer.drain_ready() {
                self.emit(&batch);
            }
        }

        tracing::debug!("Live reload watcher stopped");
    }

    /// Record the relevant paths of a raw event into the debouncer.
    fn record(&self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Filesystem watcher error");
                return;
            }
        };
        let Some(kind) = ChangeKind::from_notify(&event.kind) else {
            return;
        };
        let is_dir = is_dir_event(&event.kind);

        for path in event.paths {
            if !self.is_relevant(&path, is_dir) {
                tracing::trace!(path = %path.display(), "Ignored filesystem event");
                continue;
            }

            tracing::debug!(path = %path.display(), ?kind, "Recorded filesystem event");
            self.debouncer.record(ChangeEvent::new(path, kind));
        }
    }

    fn is_relevant(&self, path: &Path, is_dir: bool) -> bool {
        self.roots
            .iter()
            .filter_map(|root| root.relative(path))
            .any(|relative| self.matcher.matches(relative, is_dir))
    }

    fn emit(&self, batch: &DebouncedBatch) {
        let outcome = self.broadcaster.notify();

        for (path, kind) in &batch.changes {
            tracing::debug!(path = %path.display(), ?kind, "Changed");
        }
        tracing::info!(
            changes = batch.changes.len(),
            events = batch.events,
            clients = outcome.delivered,
            pruned = outcome.pruned,
            "Live reload triggered"
        );
    }
}
