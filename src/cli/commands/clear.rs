//! Clear command - delete every entry and empty the manifest

use super::resolve_cache_dir;
use crate::cache::Cache;
use crate::cli::args::ClearArgs;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;
use std::io::{self, Write};

/// Execute the clear command
pub fn execute(args: ClearArgs, config: &Config) -> CacheResult<()> {
    let root = resolve_cache_dir(&args.location, config);

    let Some(cache) = Cache::open_existing(&root)? else {
        println!("No manifest file found.");
        return Ok(());
    };

    let names = cache.list_checkpoints();
    let entries = cache.entries()?.len();
    if names.is_empty() && entries == 0 {
        println!("Cache at {} is already empty.", root.display());
        return Ok(());
    }

    println!(
        "This will remove {} entr{} across {} checkpoint(s):",
        entries,
        if entries == 1 { "y" } else { "ies" },
        names.len()
    );
    for name in &names {
        println!("  {} {}", style("•").red(), name);
    }
    println!();

    if !args.yes {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = cache.clear_cache()?;
    println!(
        "{} cleared {} entr{}",
        style("✓").green(),
        removed,
        if removed == 1 { "y" } else { "ies" }
    );

    Ok(())
}
