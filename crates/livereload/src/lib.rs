//! Live reload for axum development servers.
//!
//! Watches template and static directories and pushes a `reload` signal to
//! connected browsers over a server-sent event stream at `/_livereload`.
//! HTML responses get a small script appended that listens on that stream.
//!
//! # Quick Start
//!
//! ```ignore
//! use axum::Router;
//! use axum::response::Html;
//! use axum::routing::get;
//! use livereload::{LiveReload, LiveReloadSettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::new().route("/", get(|| async { Html("<h1>Hello</h1>") }));
//!
//!     let settings = LiveReloadSettings {
//!         enabled: cfg!(debug_assertions),
//!         ..LiveReloadSettings::default()
//!     };
//!     let (router, live_reload) = LiveReload::init_app(router, settings);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//!
//!     if let Some(live_reload) = live_reload {
//!         live_reload.shutdown();
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! filesystem ──► FileWatcher ──► PatternMatcher ──► Debouncer
//!                (notify thread)                        │
//!                                                       ▼
//! browser ◄── SSE stream ◄── Subscription ◄──── Broadcaster::notify()
//!             (one task per client)
//! ```

mod app;
mod broadcaster;
mod debouncer;
mod event;
mod inject;
mod patterns;
mod stream;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

pub use broadcaster::{Broadcaster, NotifyOutcome, ReloadMessage, SubscriberId, Subscription};
pub use debouncer::{DebouncedBatch, Debouncer};
pub use event::{ChangeEvent, ChangeKind};
pub use inject::{LIVE_RELOAD_SCRIPT, inject_script};
pub use patterns::{PatternError, PatternMatcher};
pub use stream::STREAM_PATH;
pub use watcher::{FileWatcher, WatchError};

/// What to watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    /// Glob patterns a changed path must match. Empty means every path that
    /// is not ignored.
    pub watch_patterns: Vec<String>,
    /// Glob patterns that never trigger a reload. Take precedence over
    /// `watch_patterns`.
    pub ignore_patterns: Vec<String>,
    /// Directories watched recursively. Patterns are evaluated relative to
    /// the root a path belongs to.
    pub roots: Vec<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        let defaults = livereload_config::LiveReloadConfig::default();
        Self {
            watch_patterns: defaults.watch_patterns,
            ignore_patterns: defaults.ignore_patterns,
            roots: vec![PathBuf::from("templates"), PathBuf::from("static")],
        }
    }
}

impl WatchConfig {
    /// Find the first root under which `path` would trigger a reload.
    ///
    /// `path` must be expressed the same way as the roots (both absolute or
    /// both relative to the same directory).
    pub fn relevant_root(
        &self,
        matcher: &PatternMatcher,
        path: &Path,
        is_dir: bool,
    ) -> Option<&Path> {
        self.roots
            .iter()
            .find(|root| {
                path.strip_prefix(root)
                    .is_ok_and(|relative| matcher.matches(relative, is_dir))
            })
            .map(PathBuf::as_path)
    }
}

/// Live reload settings.
#[derive(Clone, Debug)]
pub struct LiveReloadSettings {
    /// Only a host running in debug mode should enable live reload.
    pub enabled: bool,
    /// Paths and patterns to watch.
    pub watch: WatchConfig,
    /// Window used to coalesce bursts of filesystem events.
    pub debounce: Duration,
    /// Idle interval after which a keep-alive frame is sent.
    pub keep_alive: Duration,
    /// Per-client buffer of pending reload messages.
    pub channel_capacity: usize,
}

impl Default for LiveReloadSettings {
    fn default() -> Self {
        let defaults = livereload_config::LiveReloadConfig::default();
        Self {
            enabled: false,
            watch: WatchConfig::default(),
            debounce: Duration::from_millis(defaults.debounce_ms),
            keep_alive: Duration::from_secs(defaults.keep_alive_secs),
            channel_capacity: defaults.channel_capacity,
        }
    }
}

impl LiveReloadSettings {
    /// Build settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &livereload_config::Config) -> Self {
        let live_reload = &config.live_reload;
        Self {
            enabled: config.app_resolved.debug,
            watch: WatchConfig {
                watch_patterns: live_reload.watch_patterns.clone(),
                ignore_patterns: live_reload.ignore_patterns.clone(),
                roots: config.watch_roots.clone(),
            },
            debounce: Duration::from_millis(live_reload.debounce_ms),
            keep_alive: Duration::from_secs(live_reload.keep_alive_secs),
            channel_capacity: live_reload.channel_capacity,
        }
    }
}

/// Live reload extension for an axum application.
pub struct LiveReload {
    settings: LiveReloadSettings,
    broadcaster: Arc<Broadcaster>,
    watcher: FileWatcher,
}

impl LiveReload {
    /// Create the extension. Nothing is watched until [`start`](Self::start).
    #[must_use]
    pub fn new(settings: LiveReloadSettings) -> Self {
        let broadcaster = Arc::new(Broadcaster::new(settings.channel_capacity));
        let watcher = FileWatcher::new(
            settings.watch.clone(),
            settings.debounce,
            Arc::clone(&broadcaster),
        );

        Self {
            settings,
            broadcaster,
            watcher,
        }
    }

    /// Wire live reload into `router` when enabled.
    ///
    /// Outside debug mode the router is returned untouched and nothing is
    /// started. Otherwise the watcher is started, the stream route and the
    /// script injection layer are installed, and the extension is returned so
    /// the host can shut it down. Call this after all routes are registered.
    ///
    /// # Panics
    ///
    /// When enabled, panics if `router` already has a route at
    /// [`STREAM_PATH`].
    pub fn init_app<S>(router: Router<S>, settings: LiveReloadSettings) -> (Router<S>, Option<Self>)
    where
        S: Clone + Send + Sync + 'static,
    {
        if !settings.enabled {
            tracing::debug!("Live reload disabled");
            return (router, None);
        }

        let live_reload = Self::new(settings);
        live_reload.start();
        let router = live_reload.install(router);
        (router, Some(live_reload))
    }

    /// Start the file watcher.
    ///
    /// Returns `false` when nothing could be watched. The failure is logged
    /// and the server keeps running without reload notifications.
    pub fn start(&self) -> bool {
        match self.watcher.start() {
            Ok(roots) => {
                tracing::info!(
                    roots,
                    watch_patterns = self.settings.watch.watch_patterns.len(),
                    ignore_patterns = self.settings.watch.ignore_patterns.len(),
                    debounce = ?self.settings.debounce,
                    "Live reload started"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Live reload watcher unavailable, reloads disabled");
                false
            }
        }
    }

    /// Add the stream route and the script injection layer to `router`.
    ///
    /// # Panics
    ///
    /// Panics if `router` already has a route at [`STREAM_PATH`].
    pub fn install<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        app::install(
            router,
            Arc::clone(&self.broadcaster),
            self.settings.keep_alive,
        )
    }

    /// Stop watching and end every open stream.
    pub fn shutdown(&self) {
        self.watcher.stop();
        self.broadcaster.close();
        tracing::info!("Live reload stopped");
    }

    /// Shared broadcaster, e.g. to trigger a reload manually.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Number of connected clients.
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// Active settings.
    pub fn settings(&self) -> &LiveReloadSettings {
        &self.settings
    }

    /// Compiled pattern matcher.
    pub fn matcher(&self) -> &PatternMatcher {
        self.watcher.matcher()
    }
}
