//! Truncation: rewind a pipeline to just before a checkpoint
//!
//! Truncating at checkpoint `c` deletes the entries of `c` and of every
//! checkpoint registered after it, then shortens the manifest to end just
//! before `c`. Entries go first so an interrupted truncation never leaves
//! entries whose checkpoint has already left the manifest.

use crate::cache::Cache;
use crate::error::CacheResult;
use tracing::{debug, info};

/// Outcome of a truncation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Truncation {
    /// Checkpoints dropped from the manifest, and entries deleted
    Truncated { removed: Vec<String>, entries: usize },

    /// The checkpoint is not in the manifest; nothing changed
    UnknownCheckpoint(String),
}

impl Truncation {
    /// Whether anything was truncated
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

impl Cache {
    /// Invalidate `checkpoint` and every checkpoint registered after it
    ///
    /// Upstream checkpoints keep their entries. Truncating at a checkpoint
    /// that is not registered (never reached, or already truncated) changes
    /// nothing and reports `Truncation::UnknownCheckpoint`.
    pub fn truncate(&self, checkpoint: &str) -> CacheResult<Truncation> {
        let mut manifest = self.manifest();

        let Some(pos) = manifest.position(checkpoint) else {
            debug!("Checkpoint {} not in manifest, nothing to truncate", checkpoint);
            return Ok(Truncation::UnknownCheckpoint(checkpoint.to_string()));
        };

        let mut entries = 0;
        for name in &manifest.names()[pos..] {
            let deleted = self.store().delete_checkpoint(name)?;
            debug!("Deleted {} entries for {}", deleted, name);
            entries += deleted;
        }

        let removed = manifest.truncate_before(checkpoint)?;
        info!(
            "Truncated cache from {}: {} checkpoint(s), {} entries",
            checkpoint,
            removed.len(),
            entries
        );

        Ok(Truncation::Truncated { removed, entries })
    }
}
