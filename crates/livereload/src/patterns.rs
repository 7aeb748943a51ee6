//! Watch/ignore pattern matching.
//!
//! Patterns use `.gitignore` glob semantics:
//!
//! - `*` matches within a single path segment
//! - `**` matches across segment boundaries
//! - a trailing `/` matches a directory and everything beneath it
//! - a pattern without a slash (e.g. `.git`, `*.log`) matches that name in
//!   any directory
//!
//! Paths are evaluated relative to the watched root they belong to.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::WatchConfig;

/// A pattern that failed to compile and was left out of the matcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {set} pattern `{pattern}`: {message}")]
pub struct PatternError {
    /// Which pattern set the pattern came from ("watch" or "ignore").
    pub set: &'static str,
    /// The offending pattern.
    pub pattern: String,
    /// Why it was rejected.
    pub message: String,
}

/// Decides whether a changed path should trigger a reload.
///
/// Immutable after construction and safe to share between threads.
#[derive(Debug)]
pub struct PatternMatcher {
    /// `None` when no watch patterns are configured (everything not ignored is relevant).
    watch: Option<Gitignore>,
    ignore: Gitignore,
    rejected: Vec<PatternError>,
}

impl PatternMatcher {
    /// Compile watch and ignore patterns.
    ///
    /// Patterns the glob compiler rejects (unclosed `{`, inverted ranges such
    /// as `[z-a]`) are logged once and skipped; the remaining patterns still
    /// apply. An unclosed `[` is taken literally, as in `.gitignore`. If every
    /// watch pattern is rejected the matcher falls back to "watch everything
    /// not ignored".
    pub fn new(watch_patterns: &[String], ignore_patterns: &[String]) -> Self {
        let mut rejected = Vec::new();
        let watch = compile("watch", watch_patterns, &mut rejected);
        let ignore = compile("ignore", ignore_patterns, &mut rejected);

        for err in &rejected {
            tracing::warn!(
                set = err.set,
                pattern = %err.pattern,
                error = %err.message,
                "Ignoring malformed live reload pattern"
            );
        }

        Self {
            watch: (!watch.is_empty()).then_some(watch),
            ignore,
            rejected,
        }
    }

    /// Compile the patterns of a [`WatchConfig`].
    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(&config.watch_patterns, &config.ignore_patterns)
    }

    /// Check whether a root-relative path is relevant.
    ///
    /// `is_dir` tells whether `path` itself is a directory; its parents are
    /// always treated as directories. Absolute and empty paths never match.
    pub fn matches(&self, path: &Path, is_dir: bool) -> bool {
        if path.has_root() || path.as_os_str().is_empty() {
            return false;
        }

        if self
            .ignore
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
        {
            return false;
        }

        self.watch.as_ref().is_none_or(|watch| {
            watch
                .matched_path_or_any_parents(path, is_dir)
                .is_ignore()
        })
    }

    /// Whether a watch filter is active.
    pub fn has_watch_patterns(&self) -> bool {
        self.watch.is_some()
    }

    /// Patterns that failed to compile.
    pub fn rejected(&self) -> &[PatternError] {
        &self.rejected
    }
}

/// Compile one pattern set, collecting rejected patterns.
fn compile(set: &'static str, patterns: &[String], rejected: &mut Vec<PatternError>) -> Gitignore {
    let mut builder = GitignoreBuilder::new("");

    for pattern in patterns {
        if let Err(e) = builder.add_line(None, pattern) {
            rejected.push(PatternError {
                set,
                pattern: pattern.clone(),
                message: e.to_string(),
            });
        }
    }

    builder.build().unwrap_or_else(|e| {
        tracing::warn!(set, error = %e, "Failed to build live reload pattern set");
        Gitignore::empty()
    })
}
