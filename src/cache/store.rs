//! Flat-file entry storage
//!
//! Each cache entry is one file in the cache root named
//! `{checkpoint}__{fingerprint}`. The `__` separator is unambiguous because
//! checkpoint names are validated never to contain it, so deleting one
//! checkpoint's entries cannot touch a checkpoint whose name merely shares
//! a prefix.

use crate::cache::fingerprint::Fingerprint;
use crate::cache::manifest::MANIFEST_FILE;
use crate::error::{CacheError, CacheResult};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Separator between checkpoint name and fingerprint in an entry key
pub const KEY_SEPARATOR: &str = "__";

/// Check that a checkpoint name can be used as an entry key prefix
pub fn validate_checkpoint_name(name: &str) -> CacheResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.contains(KEY_SEPARATOR) {
        Some("name contains '__'")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name contains a path separator or NUL")
    } else if name.starts_with('.') {
        Some("name starts with '.'")
    } else if name == MANIFEST_FILE {
        Some("name is reserved for the manifest")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CacheError::InvalidCheckpointName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Storage key for one (checkpoint, fingerprint) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    checkpoint: String,
    fingerprint: Fingerprint,
}

impl EntryKey {
    /// Build the key for a checkpoint call
    pub fn new(checkpoint: &str, fingerprint: Fingerprint) -> Self {
        Self {
            checkpoint: checkpoint.to_string(),
            fingerprint,
        }
    }

    /// Parse an entry file name back into a key
    pub fn parse(file_name: &str) -> Option<Self> {
        let (checkpoint, digest) = file_name.rsplit_once(KEY_SEPARATOR)?;
        if checkpoint.is_empty() {
            return None;
        }
        Some(Self {
            checkpoint: checkpoint.to_string(),
            fingerprint: Fingerprint::parse(digest)?,
        })
    }

    /// Checkpoint the entry belongs to
    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    /// Fingerprint of the call that produced the entry
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.checkpoint, KEY_SEPARATOR, self.fingerprint)
    }
}

/// Write a file by publishing a finished temporary sibling with a rename
///
/// Readers see either the old contents or the new ones, never a prefix.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));

    fs::write(&tmp, bytes)
        .map_err(|e| CacheError::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CacheError::io(
            format!("renaming {} -> {}", tmp.display(), path.display()),
            e,
        )
    })
}

/// Entry files under one cache root
#[derive(Debug, Clone)]
pub struct EntryStore {
    root: PathBuf,
}

impl EntryStore {
    /// Use `root` as the entry directory (it must already exist for writes)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &EntryKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    /// Check whether an entry exists
    pub fn exists(&self, key: &EntryKey) -> bool {
        self.path(key).is_file()
    }

    /// Store an entry, replacing any previous contents
    pub fn write(&self, key: &EntryKey, bytes: &[u8]) -> CacheResult<()> {
        write_atomic(&self.path(key), bytes)?;
        debug!("Stored entry {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    /// Read an entry; callers check `exists` first
    pub fn read(&self, key: &EntryKey) -> CacheResult<Vec<u8>> {
        let path = self.path(key);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::EntryNotFound(key.to_string()),
            _ => CacheError::io(format!("reading cache entry {}", path.display()), e),
        })
    }

    /// List every entry in the root, sorted by key
    ///
    /// The manifest, temporary files and anything not shaped like an entry
    /// key are skipped.
    pub fn entries(&self) -> CacheResult<Vec<EntryKey>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading cache directory {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut keys = vec![];
        for entry in dir {
            let entry = entry.map_err(|e| CacheError::io("reading cache directory entry", e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') || !entry.path().is_file() {
                continue;
            }
            if let Some(key) = EntryKey::parse(name) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Delete one entry; a missing entry is not an error
    pub fn delete(&self, key: &EntryKey) -> CacheResult<()> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(
                format!("deleting cache entry {}", path.display()),
                e,
            )),
        }
    }

    /// Count the entries belonging to one checkpoint
    pub fn count(&self, checkpoint: &str) -> CacheResult<usize> {
        Ok(self
            .entries()?
            .iter()
            .filter(|k| k.checkpoint() == checkpoint)
            .count())
    }

    /// Delete every entry of exactly this checkpoint, returning how many
    pub fn delete_checkpoint(&self, checkpoint: &str) -> CacheResult<usize> {
        self.delete_where(|key| key.checkpoint() == checkpoint)
    }

    /// Delete every entry in the root, returning how many
    pub fn delete_all(&self) -> CacheResult<usize> {
        self.delete_where(|_| true)
    }

    fn delete_where(&self, matches: impl Fn(&EntryKey) -> bool) -> CacheResult<usize> {
        let mut removed = 0;
        for key in self.entries()?.into_iter().filter(|k| matches(k)) {
            let path = self.path(&key);
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CacheError::io(
                        format!("deleting cache entry {}", path.display()),
                        e,
                    ))
                }
            }
        }
        Ok(removed)
    }
}
