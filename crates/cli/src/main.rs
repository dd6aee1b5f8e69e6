//! Lookout CLI - lookout command

use anyhow::{Context, Result};
use clap::Parser;
use lookout::{Changes, Config, Listener};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

/// Lookout - Watch directories and print what changed
#[derive(Parser, Debug)]
#[command(name = "lookout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to watch (repeatable)
    #[arg(short = 'd', long = "directory", value_name = "DIR", default_value = ".")]
    directories: Vec<PathBuf>,

    /// Print paths relative to the current directory
    #[arg(short, long)]
    relative: bool,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Poll instead of using native notifications
    #[arg(long)]
    force_polling: bool,

    /// Polling interval in milliseconds (polling adapter only)
    #[arg(long, value_name = "MS")]
    latency: Option<u64>,

    /// Minimum delay between two reports, in milliseconds
    #[arg(long, value_name = "MS")]
    wait_for_delay: Option<u64>,

    /// Additional ignore pattern, a regex over the relative path (repeatable)
    #[arg(long, value_name = "REGEX")]
    ignore: Vec<String>,

    /// Only report files matching this regex (repeatable)
    #[arg(long, value_name = "REGEX")]
    only: Vec<String>,

    /// TOML file with listener options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also write debug logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = build_config(&cli)?;
    let listener = Listener::new(&cli.directories, config, print_changes)
        .context("Failed to set up listener")?;
    listener.start().context("Failed to start listening")?;

    let watched: Vec<String> = listener
        .directories()
        .iter()
        .map(|dir| dir.display().to_string())
        .collect();
    eprintln!(
        "{} {} ({})",
        "Watching".green().bold(),
        watched.join(", "),
        listener.adapter_kind().dimmed()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::debug!("Interrupted, stopping listener");
    eprintln!("{}", "Stopping".yellow());
    listener.stop()?;
    Ok(())
}

/// Console logs on stderr, plus an optional non-blocking log file
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = level_for(verbose);
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(level.max(LevelFilter::DEBUG));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Config file (or defaults) with command-line flags layered on top
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };

    config.relative |= cli.relative;
    config.force_polling |= cli.force_polling;
    if let Some(latency) = cli.latency {
        config.latency_ms = Some(latency);
    }
    if let Some(delay) = cli.wait_for_delay {
        config.wait_for_delay_ms = Some(delay);
    }
    config.ignore.extend(cli.ignore.iter().cloned());
    if !cli.only.is_empty() {
        config.only = Some(cli.only.clone());
    }

    config.validate().context("Invalid options")?;
    Ok(config)
}

fn print_changes(changes: &Changes) {
    for (sign, path) in change_lines(changes) {
        let path = path.display();
        match sign {
            '+' => println!("{} {}", sign.green(), path),
            '-' => println!("{} {}", sign.red(), path),
            _ => println!("{} {}", sign.yellow(), path),
        }
    }
}

/// One `(sign, path)` per reported change: modified, then added, then removed
fn change_lines(changes: &Changes) -> Vec<(char, &Path)> {
    let modified = changes.modified.iter().map(|path| ('>', path.as_path()));
    let added = changes.added.iter().map(|path| ('+', path.as_path()));
    let removed = changes.removed.iter().map(|path| ('-', path.as_path()));
    modified.chain(added).chain(removed).collect()
}
