//! Checkpoint cache for multi-step pipelines
//!
//! Each pipeline stage is wrapped as a checkpoint whose results are stored
//! under a fingerprint of the stage name and its arguments. Re-running a
//! pipeline skips every stage whose inputs are unchanged, and truncating at
//! a checkpoint invalidates it together with everything registered after it.
//!
//! # Layout
//!
//! | File | Contents |
//! |------|----------|
//! | `{checkpoint}__{fingerprint}` | JSON-encoded stage result |
//! | `cache_manifest.json` | Checkpoint names in first-completion order |
//!
//! # Example
//!
//! ```no_run
//! use pipecache::{BoundArgs, Cache, CallArgs, CheckpointOptions, Signature};
//!
//! let cache = Cache::open("pipeline_cache")?;
//! let add = cache.checkpoint(
//!     Signature::new("add").var_positional(),
//!     CheckpointOptions::default(),
//!     |a: &BoundArgs| Ok::<_, pipecache::ArgumentError>(a.varargs::<i64>()?.into_iter().sum::<i64>()),
//! )?;
//! assert_eq!(add.call(CallArgs::new().arg(1i64).arg(2i64)).unwrap(), 3);
//! # Ok::<(), pipecache::CacheError>(())
//! ```

pub mod args;
pub mod checkpoint;
pub mod fingerprint;
pub mod manifest;
pub mod store;
pub mod truncate;

pub use args::{Arg, BoundArgs, CallArgs, Signature};
pub use checkpoint::{Checkpoint, CheckpointOptions};
pub use fingerprint::{fingerprint, Fingerprint};
pub use manifest::{Manifest, MANIFEST_FILE};
pub use store::{validate_checkpoint_name, EntryKey, EntryStore};
pub use truncate::Truncation;

use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use checkpoint::KeyLocks;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Default cache root, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "pipeline_cache";

#[derive(Debug)]
struct Inner {
    store: EntryStore,
    manifest: Mutex<Manifest>,
    locks: KeyLocks,
    overrides: HashMap<String, CheckpointOptions>,
}

/// Handle to one cache root
///
/// Cloning is cheap; clones share the manifest and storage.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    /// Open (creating if needed) the cache rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        Self::open_with(root.into(), HashMap::new())
    }

    /// Open an existing cache; `None` when `root` has no manifest yet
    pub fn open_existing(root: impl Into<PathBuf>) -> CacheResult<Option<Self>> {
        let root = root.into();
        if !Manifest::path_in(&root).is_file() {
            debug!("No manifest under {}", root.display());
            return Ok(None);
        }
        Self::open(root).map(Some)
    }

    /// Open the cache described by a configuration
    ///
    /// `[checkpoints.<stage>]` tables override the options given in code.
    pub fn with_config(config: &Config) -> CacheResult<Self> {
        Self::open_with(config.cache.dir.clone(), config.checkpoints.clone())
    }

    fn open_with(root: PathBuf, overrides: HashMap<String, CheckpointOptions>) -> CacheResult<Self> {
        fs::create_dir_all(&root).map_err(|e| {
            CacheError::io(format!("creating cache directory {}", root.display()), e)
        })?;
        let manifest = Manifest::load(&root)?;

        debug!(
            "Opened cache at {} with {} checkpoint(s)",
            root.display(),
            manifest.names().len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                store: EntryStore::new(root),
                manifest: Mutex::new(manifest),
                locks: KeyLocks::default(),
                overrides,
            }),
        })
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        self.store().root()
    }

    /// Manifest file path
    pub fn manifest_path(&self) -> PathBuf {
        Manifest::path_in(self.root())
    }

    /// Wrap a stage function as a checkpoint
    ///
    /// The checkpoint name is, in order of precedence, the configured
    /// override, `options.name`, then the signature name.
    pub fn checkpoint<F>(
        &self,
        signature: Signature,
        options: CheckpointOptions,
        func: F,
    ) -> CacheResult<Checkpoint<F>> {
        let options = match self.inner.overrides.get(signature.name()) {
            Some(configured) => options.merged(configured),
            None => options,
        };
        let name = options
            .name
            .unwrap_or_else(|| signature.name().to_string());
        validate_checkpoint_name(&name)?;

        let exclude: BTreeSet<String> = options.exclude_args.into_iter().collect();
        debug!("Registered stage {} as checkpoint {}", signature.name(), name);
        Ok(Checkpoint::new(self.clone(), name, signature, exclude, func))
    }

    /// Checkpoint names in registration order
    pub fn list_checkpoints(&self) -> Vec<String> {
        self.manifest().names().to_vec()
    }

    /// Every stored entry, sorted by key
    pub fn entries(&self) -> CacheResult<Vec<EntryKey>> {
        self.store().entries()
    }

    /// Number of stored entries for one checkpoint
    pub fn entry_count(&self, checkpoint: &str) -> CacheResult<usize> {
        self.store().count(checkpoint)
    }

    /// Delete every entry and empty the manifest, returning the entry count
    pub fn clear_cache(&self) -> CacheResult<usize> {
        let mut manifest = self.manifest();
        let removed = self.store().delete_all()?;
        manifest.clear()?;
        info!("Cleared cache at {} ({} entries)", self.root().display(), removed);
        Ok(removed)
    }

    fn manifest(&self) -> MutexGuard<'_, Manifest> {
        self.inner
            .manifest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> &EntryStore {
        &self.inner.store
    }

    pub(crate) fn key_locks(&self) -> &KeyLocks {
        &self.inner.locks
    }

    /// Stored bytes for a key, if present
    ///
    /// A hit on a checkpoint missing from the manifest (left by an
    /// interrupted run or a reset manifest) registers it again.
    pub(crate) fn lookup(&self, key: &EntryKey) -> CacheResult<Option<Vec<u8>>> {
        if !self.store().exists(key) {
            return Ok(None);
        }
        let bytes = self.store().read(key)?;
        self.manifest().append(key.checkpoint())?;
        Ok(Some(bytes))
    }

    /// Store a freshly computed result and register its checkpoint
    ///
    /// If the manifest cannot be updated the entry is removed again, so a
    /// failed call leaves neither an entry nor a manifest change behind.
    pub(crate) fn record(&self, key: &EntryKey, bytes: &[u8]) -> CacheResult<()> {
        self.store().write(key, bytes)?;
        match self.manifest().append(key.checkpoint()) {
            Ok(true) => info!("New checkpoint registered: {}", key.checkpoint()),
            Ok(false) => {}
            Err(e) => {
                if let Err(cleanup) = self.store().delete(key) {
                    warn!("Could not remove unregistered entry {}: {}", key, cleanup);
                }
                return Err(e);
            }
        }
        Ok(())
    }
}
