//! Checkpoint wrappers
//!
//! A `Checkpoint` binds a stage function to a checkpoint name and runs it
//! read-through: fingerprint the call, return the stored result on a hit,
//! otherwise run the stage, store its result and register the checkpoint.
//! A hit never runs the stage, so its side effects are skipped.

use crate::cache::args::{BoundArgs, CallArgs, Signature};
use crate::cache::fingerprint::{fingerprint, Fingerprint};
use crate::cache::store::EntryKey;
use crate::cache::Cache;
use crate::codec;
use crate::error::{CacheResult, CallError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Per-checkpoint options
///
/// The same shape is accepted from code and from `[checkpoints.<stage>]`
/// tables in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointOptions {
    /// Checkpoint name; defaults to the signature name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argument names left out of the fingerprint
    ///
    /// An excluded argument never invalidates a stored result, even when it
    /// changes what the stage would return.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_args: Vec<String>,
}

impl CheckpointOptions {
    /// Override the checkpoint name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Exclude arguments from the fingerprint
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_args.extend(names.into_iter().map(Into::into));
        self
    }

    /// Layer `other` on top: its name wins, exclusions are unioned
    pub fn merged(mut self, other: &CheckpointOptions) -> Self {
        if other.name.is_some() {
            self.name.clone_from(&other.name);
        }
        self.exclude_args.extend(other.exclude_args.iter().cloned());
        self
    }
}

/// Serializes work on one entry key within a process
///
/// Concurrent calls with the same fingerprint wait for the first to finish
/// and then read its entry instead of recomputing.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    held: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(held.entry(key.to_string()).or_default())
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if held.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            held.remove(key);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.held.lock().unwrap().len()
    }
}

/// A stage function wrapped as a cached checkpoint
pub struct Checkpoint<F> {
    cache: Cache,
    name: String,
    signature: Signature,
    exclude: BTreeSet<String>,
    func: F,
}

impl<F> Checkpoint<F> {
    pub(crate) fn new(
        cache: Cache,
        name: String,
        signature: Signature,
        exclude: BTreeSet<String>,
        func: F,
    ) -> Self {
        Self {
            cache,
            name,
            signature,
            exclude,
            func,
        }
    }

    /// Resolved checkpoint name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared signature of the stage
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Argument names left out of the fingerprint
    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.exclude
    }

    /// Fingerprint a call without running it
    pub fn fingerprint(&self, args: CallArgs) -> CacheResult<Fingerprint> {
        let bound = self.signature.bind(args)?;
        fingerprint(&self.name, &bound, &self.exclude)
    }

    /// Run the stage through the cache
    ///
    /// Argument or result serialization failures abort before anything is
    /// written. A stage error is returned as `CallError::Stage` and leaves
    /// the cache untouched.
    pub fn call<R, E>(&self, args: CallArgs) -> Result<R, CallError<E>>
    where
        F: Fn(&BoundArgs) -> Result<R, E>,
        R: Serialize + DeserializeOwned,
    {
        let bound = self.signature.bind(args)?;
        let key = EntryKey::new(&self.name, fingerprint(&self.name, &bound, &self.exclude)?);

        self.cache
            .key_locks()
            .with_lock(&key.to_string(), || -> Result<R, CallError<E>> {
                if let Some(bytes) = self.cache.lookup(&key)? {
                    debug!("Cache hit for {}", key);
                    return Ok(codec::decode(&bytes, &format!("cache entry {key}"))?);
                }

                debug!("Cache miss for {}, running stage", key);
                let result = (self.func)(&bound).map_err(CallError::Stage)?;
                let bytes =
                    codec::encode(&result, &format!("result of checkpoint '{}'", self.name))?;
                self.cache.record(&key, &bytes)?;
                Ok(result)
            })
    }
}

impl<F> fmt::Debug for Checkpoint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("exclude", &self.exclude)
            .finish_non_exhaustive()
    }
}
