//! List command - show checkpoints in manifest order

use super::resolve_cache_dir;
use crate::cache::Cache;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::CacheResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// One manifest row
#[derive(Debug, Serialize)]
struct CheckpointRow {
    position: usize,
    name: String,
    entries: usize,
}

/// Execute the list command
pub fn execute(args: ListArgs, config: &Config) -> CacheResult<()> {
    let root = resolve_cache_dir(&args.location, config);

    let Some(cache) = Cache::open_existing(&root)? else {
        match args.format {
            OutputFormat::Json => println!("[]"),
            _ => println!("No manifest file found."),
        }
        return Ok(());
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for key in cache.entries()? {
        *counts.entry(key.checkpoint().to_string()).or_default() += 1;
    }

    let names = cache.list_checkpoints();
    let rows: Vec<CheckpointRow> = names
        .iter()
        .enumerate()
        .map(|(i, name)| CheckpointRow {
            position: i + 1,
            name: name.clone(),
            entries: counts.remove(name).unwrap_or(0),
        })
        .collect();

    // Whatever is left has entries on disk but no manifest record
    let unregistered: usize = counts.values().sum();

    match args.format {
        OutputFormat::Table => print_table(&rows, unregistered),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.name);
            }
        }
    }

    Ok(())
}

fn print_table(rows: &[CheckpointRow], unregistered: usize) {
    if rows.is_empty() {
        println!("No checkpoints recorded.");
    } else {
        println!("{:<4} {:<40} {:>8}", "#", "CHECKPOINT", "ENTRIES");
        println!("{}", "-".repeat(54));
        for row in rows {
            println!("{:<4} {:<40} {:>8}", row.position, row.name, row.entries);
        }
        println!();
        println!("Total: {} checkpoint(s)", rows.len());
    }

    if unregistered > 0 {
        println!(
            "{} entries belong to checkpoints missing from the manifest",
            unregistered
        );
    }
}
