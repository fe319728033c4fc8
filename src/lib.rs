//! Pipecache - Checkpointing cache for multi-step pipelines
//!
//! Wraps pipeline stages so their results are persisted under a
//! fingerprint of their arguments, skipping unchanged stages on re-run
//! and invalidating a stage and everything after it on truncation.

pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;

pub use cache::{
    Arg, BoundArgs, Cache, CallArgs, Checkpoint, CheckpointOptions, EntryKey, Fingerprint,
    Signature, Truncation, DEFAULT_CACHE_DIR,
};
pub use error::{ArgumentError, CacheError, CacheResult, CallError};
