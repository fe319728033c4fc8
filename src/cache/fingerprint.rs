//! Fingerprint derivation for checkpoint calls
//!
//! A fingerprint is the SHA256 of a canonical JSON document describing the
//! checkpoint name and the bound arguments left after exclusion. Equal bound
//! views always hash equal; keyword order never matters, variadic order does.

use crate::cache::args::{Arg, BoundArgs};
use crate::error::{CacheError, CacheResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use tracing::trace;

/// Hex-encoded SHA256 digest identifying one (checkpoint, arguments) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex digest
    pub const LEN: usize = 64;

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept a string as a fingerprint if it has the digest shape
    ///
    /// Only lowercase hex is accepted, matching what `fingerprint` produces.
    pub fn parse(s: &str) -> Option<Self> {
        let lower_hex = |b: u8| b.is_ascii_digit() || (b'a'..=b'f').contains(&b);
        (s.len() == Self::LEN && s.bytes().all(lower_hex)).then(|| Self(s.to_string()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical pre-image of a fingerprint
#[derive(Serialize)]
struct Canonical<'a> {
    checkpoint: &'a str,
    args: Vec<(&'a str, &'a serde_json::Value)>,
    varargs: Vec<&'a serde_json::Value>,
    kwargs: Vec<(&'a str, &'a serde_json::Value)>,
}

fn encoded<'a>(checkpoint: &str, name: &str, arg: &'a Arg) -> CacheResult<&'a serde_json::Value> {
    arg.encoded().map_err(|reason| {
        CacheError::serialization(
            format!("argument '{name}' of checkpoint '{checkpoint}'"),
            reason,
        )
    })
}

/// Compute the fingerprint of a call
///
/// `exclude` names are dropped from named parameters and variadic keywords
/// before hashing. Excluding a name that is not bound is a no-op.
pub fn fingerprint(
    checkpoint: &str,
    bound: &BoundArgs,
    exclude: &BTreeSet<String>,
) -> CacheResult<Fingerprint> {
    let args = bound
        .named()
        .filter(|(name, _)| !exclude.contains(*name))
        .map(|(name, arg)| encoded(checkpoint, name, arg).map(|v| (name, v)))
        .collect::<CacheResult<Vec<_>>>()?;

    let varargs = bound
        .varargs_raw()
        .iter()
        .enumerate()
        .map(|(i, arg)| encoded(checkpoint, &format!("*args[{i}]"), arg))
        .collect::<CacheResult<Vec<_>>>()?;

    let kwargs = bound
        .kwargs()
        .filter(|(name, _)| !exclude.contains(*name))
        .map(|(name, arg)| encoded(checkpoint, name, arg).map(|v| (name, v)))
        .collect::<CacheResult<Vec<_>>>()?;

    let canonical = Canonical {
        checkpoint,
        args,
        varargs,
        kwargs,
    };
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| CacheError::serialization(format!("arguments of '{checkpoint}'"), e))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    trace!("Fingerprint for {}: {}", checkpoint, digest);
    Ok(Fingerprint(digest))
}
