//! `livereload-demo serve` command implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use livereload::{LiveReload, LiveReloadSettings};
use livereload_config::{CliSettings, Config};
use tower_http::trace::TraceLayer;

use crate::error::CliError;
use crate::output::Output;
use crate::site;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover livereload.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to watch; repeat for several (overrides config).
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Run in debug mode, which enables live reload.
    #[arg(long)]
    debug: Option<bool>,

    /// Disable debug mode.
    #[arg(long, conflicts_with = "debug")]
    no_debug: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host.clone(),
            port: self.port,
            debug: self.resolve_debug(),
            roots: (!self.roots.is_empty()).then(|| self.roots.clone()),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let settings = LiveReloadSettings::from_config(&config);

        print_summary(&output, &config, &settings);

        let router = site::router(&config.app_resolved);
        let (router, live_reload) = LiveReload::init_app(router, settings);
        let router = router.layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from_str(&format!("{}:{}", config.server.host, config.server.port))
            .map_err(|e| CliError::Server(format!("Invalid address: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        output.highlight(&format!("Listening on http://{addr}"));
        tracing::info!(address = %addr, "Starting server");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                // Open streams never finish on their own
                if let Some(live_reload) = live_reload {
                    live_reload.shutdown();
                }
            })
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }

    /// Resolve `debug` from --debug/--no-debug flags.
    fn resolve_debug(&self) -> Option<bool> {
        self.no_debug.then_some(false).or(self.debug)
    }
}

fn print_summary(output: &Output, config: &Config, settings: &LiveReloadSettings) {
    output.info(&format!(
        "Starting server on {}:{}",
        config.server.host, config.server.port
    ));
    output.info(&format!(
        "Templates: {}",
        config.app_resolved.template_dir.display()
    ));
    output.info(&format!(
        "Static files: {}",
        config.app_resolved.static_dir.display()
    ));

    if !settings.enabled {
        output.warning("Live reload: disabled (not in debug mode)");
        return;
    }

    output.success("Live reload: enabled");
    for root in &settings.watch.roots {
        if root.is_dir() {
            output.muted(&format!("  watching {}", root.display()));
        } else {
            output.warning(&format!("  missing  {}", root.display()));
        }
    }
    output.muted(&format!(
        "  {} watch pattern(s), {} ignore pattern(s), {} ms debounce",
        settings.watch.watch_patterns.len(),
        settings.watch.ignore_patterns.len(),
        settings.debounce.as_millis()
    ));
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
