//! `livereload-demo check` command implementation.

use std::path::{Path, PathBuf};

use clap::Args;
use livereload::{LiveReloadSettings, PatternMatcher, WatchConfig};
use livereload_config::{CliSettings, Config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    /// Path to configuration file (default: auto-discover livereload.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to watch; repeat for several (overrides config).
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Paths to check.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

/// Verdict for one checked path.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Reload { root: PathBuf },
    Ignored,
}

impl CheckArgs {
    /// Execute the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or a path cannot be resolved.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            roots: (!self.roots.is_empty()).then(|| self.roots.clone()),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let mut watch = LiveReloadSettings::from_config(&config).watch;
        watch.roots = watch
            .roots
            .iter()
            .map(std::path::absolute)
            .collect::<Result<_, _>>()?;

        let matcher = PatternMatcher::from_config(&watch);
        for rejected in matcher.rejected() {
            output.warning(&format!("Skipped {rejected}"));
        }

        for path in &self.paths {
            let absolute = std::path::absolute(path)?;
            match check_path(&watch, &matcher, &absolute, absolute.is_dir()) {
                Verdict::Reload { root } => output.success(&format!(
                    "reload   {} (root: {})",
                    path.display(),
                    root.display()
                )),
                Verdict::Ignored => output.muted(&format!("ignored  {}", path.display())),
            }
        }

        Ok(())
    }
}

fn check_path(watch: &WatchConfig, matcher: &PatternMatcher, path: &Path, is_dir: bool) -> Verdict {
    match watch.relevant_root(matcher, path, is_dir) {
        Some(root) => Verdict::Reload {
            root: root.to_path_buf(),
        },
        None => Verdict::Ignored,
    }
}
