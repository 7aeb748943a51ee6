//! Live reload demo server.
//!
//! Provides commands for:
//! - `serve`: Serve a templates/static tree with live reload
//! - `check`: Show whether paths would trigger a reload

mod commands;
mod error;
mod output;
mod site;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CheckArgs, ServeArgs};
use output::Output;

/// Live reload demo server.
#[derive(Parser)]
#[command(name = "livereload-demo", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the development server.
    Serve(ServeArgs),
    /// Check which paths would trigger a reload.
    Check(CheckArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // Only the serve command takes --verbose
    let verbose = matches!(&cli.command, Commands::Serve(args) if args.verbose);

    // Initialize tracing before any command runs
    // --verbose enables INFO level, otherwise use RUST_LOG (errors only when unset)
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        // Serve needs an async runtime; check is synchronous
        Commands::Serve(args) => match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(args.execute()),
            Err(e) => Err(e.into()),
        },
        Commands::Check(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
