//! Checkpoint manifest
//!
//! The manifest is the ordered list of checkpoint names, in the order each
//! first completed successfully. It decides what comes after what, no
//! matter how many entries a checkpoint has. Stored as a JSON array in
//! `cache_manifest.json` inside the cache root and rewritten whole on every
//! change.

use crate::cache::store::write_atomic;
use crate::error::{CacheError, CacheResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the manifest inside a cache root
pub const MANIFEST_FILE: &str = "cache_manifest.json";

/// Ordered checkpoint names for one cache root
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    order: Vec<String>,
}

impl Manifest {
    /// Path of the manifest for a cache root
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    /// Parse manifest contents
    ///
    /// Duplicates left by hand edits are collapsed, keeping the first.
    pub fn parse(path: &Path, content: &str) -> CacheResult<Vec<String>> {
        let names: Vec<String> =
            serde_json::from_str(content).map_err(|e| CacheError::ManifestCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut order: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !order.contains(&name) {
                order.push(name);
            }
        }
        Ok(order)
    }

    /// Load the manifest of a cache root
    ///
    /// A missing file is an empty manifest. A corrupt one is logged and
    /// treated as empty so the cache can rebuild itself.
    pub fn load(root: &Path) -> CacheResult<Self> {
        let path = Self::path_in(root);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No manifest at {}, starting empty", path.display());
                return Ok(Self { path, order: vec![] });
            }
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading manifest {}", path.display()),
                    e,
                ))
            }
        };

        let order = match Self::parse(&path, &content) {
            Ok(order) => order,
            Err(e) => {
                warn!("{}; treating manifest as empty", e);
                vec![]
            }
        };

        debug!("Loaded manifest with {} checkpoint(s)", order.len());
        Ok(Self { path, order })
    }

    /// Checkpoint names in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Position of a checkpoint in the manifest
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    /// Whether a checkpoint is registered
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Register a checkpoint at the end; no-op if already present
    ///
    /// Returns whether the manifest changed.
    pub fn append(&mut self, name: &str) -> CacheResult<bool> {
        if self.contains(name) {
            return Ok(false);
        }
        let mut order = self.order.clone();
        order.push(name.to_string());
        self.commit(order)?;
        debug!("Registered checkpoint {} at position {}", name, self.order.len() - 1);
        Ok(true)
    }

    /// Drop `name` and everything after it, returning the dropped names
    ///
    /// An unknown name leaves the manifest untouched and returns nothing.
    pub fn truncate_before(&mut self, name: &str) -> CacheResult<Vec<String>> {
        let Some(pos) = self.position(name) else {
            return Ok(vec![]);
        };
        let mut order = self.order.clone();
        let removed = order.split_off(pos);
        self.commit(order)?;
        Ok(removed)
    }

    /// Remove every checkpoint
    pub fn clear(&mut self) -> CacheResult<()> {
        self.commit(vec![])
    }

    /// Rewrite the manifest file from memory
    pub fn persist(&self) -> CacheResult<()> {
        Self::write(&self.path, &self.order)
    }

    /// Write `order` to disk, then adopt it; memory is untouched on failure
    fn commit(&mut self, order: Vec<String>) -> CacheResult<()> {
        Self::write(&self.path, &order)?;
        self.order = order;
        Ok(())
    }

    fn write(path: &Path, order: &[String]) -> CacheResult<()> {
        let content = serde_json::to_string_pretty(order)?;
        write_atomic(path, content.as_bytes())
    }

    /// Manifest file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
