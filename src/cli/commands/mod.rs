//! CLI command implementations

pub mod clear;
pub mod config;
pub mod list;
pub mod truncate;

pub use clear::execute as clear;
pub use config::execute as config;
pub use list::execute as list;
pub use truncate::execute as truncate;

use crate::cli::args::CacheDirArgs;
use crate::config::Config;
use std::path::PathBuf;

/// Cache root for a command: `--cache-dir` / `PIPECACHE_DIR`, then `[cache].dir`
pub(crate) fn resolve_cache_dir(location: &CacheDirArgs, config: &Config) -> PathBuf {
    location
        .cache_dir
        .clone()
        .unwrap_or_else(|| config.cache.dir.clone())
}
