//! Truncate command - invalidate a checkpoint and everything after it

use super::resolve_cache_dir;
use crate::cache::{Cache, Truncation};
use crate::cli::args::TruncateArgs;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;
use tracing::debug;

/// Execute the truncate command
///
/// A missing manifest or an unknown checkpoint is reported and still exits
/// successfully; there is nothing to truncate in either case.
pub fn execute(args: TruncateArgs, config: &Config) -> CacheResult<()> {
    let root = resolve_cache_dir(&args.location, config);
    debug!("Truncating {} in {}", args.checkpoint, root.display());

    let Some(cache) = Cache::open_existing(&root)? else {
        println!("No manifest file found.");
        return Ok(());
    };

    match cache.truncate(&args.checkpoint)? {
        Truncation::UnknownCheckpoint(name) => {
            println!("Checkpoint '{}' not found in manifest.", name);
        }
        Truncation::Truncated { removed, entries } => {
            println!(
                "{} Cache truncated from checkpoint '{}'.",
                style("✓").green(),
                args.checkpoint
            );
            for name in &removed {
                println!("  {} {}", style("•").red(), name);
            }
            println!(
                "Removed {} checkpoint(s), {} entr{}",
                removed.len(),
                entries,
                if entries == 1 { "y" } else { "ies" }
            );
        }
    }

    Ok(())
}
