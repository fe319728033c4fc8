//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pipecache - Checkpointing cache for multi-step pipelines
///
/// Inspect, truncate and clear the checkpoint cache written by pipeline
/// stages.
#[derive(Parser, Debug)]
#[command(name = "pipecache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PIPECACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Remove a checkpoint and every checkpoint after it
    Truncate(TruncateArgs),

    /// List checkpoints in manifest order
    List(ListArgs),

    /// Delete every cache entry and empty the manifest
    Clear(ClearArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Cache location shared by cache commands
#[derive(Args, Debug, Clone, Default)]
pub struct CacheDirArgs {
    /// Cache directory (defaults to [cache].dir from config, then pipeline_cache)
    #[arg(long, env = "PIPECACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Arguments for the truncate command
#[derive(Parser, Debug)]
pub struct TruncateArgs {
    /// Checkpoint to truncate from
    pub checkpoint: String,

    #[command(flatten)]
    pub location: CacheDirArgs,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub location: CacheDirArgs,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    #[command(flatten)]
    pub location: CacheDirArgs,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
