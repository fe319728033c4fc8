//! Pipecache - Checkpointing cache for multi-step pipelines
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use pipecache::cli::{Cli, Commands};
use pipecache::config::ConfigManager;
use pipecache::error::CacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load()?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("pipecache=warn"),
        1 => EnvFilter::new("pipecache=info"),
        _ => EnvFilter::new("pipecache=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    if config.general.json_logs() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Truncate(args) => pipecache::cli::commands::truncate(args, &config),
        Commands::List(args) => pipecache::cli::commands::list(args, &config),
        Commands::Clear(args) => pipecache::cli::commands::clear(args, &config),
        Commands::Config(args) => pipecache::cli::commands::config(args, &config, &config_manager),
    }
}
