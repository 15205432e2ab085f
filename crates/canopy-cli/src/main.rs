//! Canopy CLI - Command-line interface for Canopy
//!
//! Watches folders from the terminal, or serves the watcher to a host
//! process over stdio.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "canopy")]
#[command(author = "Canopy Contributors")]
#[command(version)]
#[command(about = "Keeps recursive folder watches alive", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Watcher config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch folders and print changes as they happen
    Watch {
        /// Folders to watch (defaults to current directory)
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Glob to exclude; may be repeated
        #[arg(short, long = "exclude")]
        excludes: Vec<String>,

        /// Poll every N milliseconds instead of using native events
        #[arg(long, value_name = "MS")]
        poll: Option<u64>,
    },

    /// Serve the watcher over stdio (JSON-RPC, one message per line)
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Stdout belongs to the protocol in serve mode; logs go to stderr.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Watch {
            paths,
            excludes,
            poll,
        } => commands::watch(&paths, excludes, poll, cli.config.as_deref(), cli.verbose).await,
        Commands::Serve => commands::serve(cli.config.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
