//! Error types for pipecache
//!
//! Cache operations return `CacheResult<T>`. Calls through a checkpoint
//! wrapper return `CallError<E>`, which keeps the stage's own error intact.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors the cache itself can produce
#[derive(Error, Debug)]
pub enum CacheError {
    // Serialization errors
    #[error("Cannot serialize {context}: {reason}")]
    Serialization { context: String, reason: String },

    // Manifest errors
    #[error("Manifest at {path} is corrupt: {reason}")]
    ManifestCorrupt { path: PathBuf, reason: String },

    // Checkpoint errors
    #[error("Invalid checkpoint name '{name}': {reason}")]
    InvalidCheckpointName { name: String, reason: String },

    #[error("Invalid arguments for '{checkpoint}': {reason}")]
    Binding { checkpoint: String, reason: String },

    // Storage errors
    #[error("Cache entry not found: {0}")]
    EntryNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a serialization error for a value that cannot be stored or hashed
    pub fn serialization(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Serialization {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error means a value could not cross the serialization boundary
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Serialization { .. } => {
                Some("Exclude the argument with exclude_args, or return a serializable value")
            }
            Self::InvalidCheckpointName { .. } => {
                Some("Checkpoint names must be plain file names without '__'")
            }
            Self::ConfigInvalid { .. } => Some("Run: pipecache config init --force"),
            _ => None,
        }
    }
}

/// Error from reading a bound argument inside a stage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("missing argument '{0}'")]
    Missing(String),

    #[error("argument '{name}' is a {found}, not a {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Error from invoking a checkpointed stage
#[derive(Error, Debug)]
pub enum CallError<E> {
    /// The wrapped stage failed; the cache was not touched
    #[error("{0}")]
    Stage(E),

    /// The cache failed before or after running the stage
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl<E> CallError<E> {
    /// The stage error, if the stage itself failed
    pub fn into_stage(self) -> Option<E> {
        match self {
            Self::Stage(e) => Some(e),
            Self::Cache(_) => None,
        }
    }

    /// The cache error, if the cache failed
    pub fn as_cache(&self) -> Option<&CacheError> {
        match self {
            Self::Cache(e) => Some(e),
            Self::Stage(_) => None,
        }
    }
}
