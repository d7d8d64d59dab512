//! Error types for the local tree boundary
//!
//! Provides error handling for:
//! - Scan operations (files → schema definitions)
//! - Write operations (schema definitions → files)
//! - Overlay scaffolding

use converge_model::{FunctionKind, KindError};
use std::path::PathBuf;

/// Errors raised while reading or writing a schema tree
///
/// During a scan every variant except [`ScanError::RootNotFound`] is a
/// validation error: it is reported and the offending schema or function is
/// skipped while the rest of the scan continues.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Scan root does not exist or is not a directory
    #[error("schema root not found: {0}")]
    RootNotFound(PathBuf),

    /// IO error during file access
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Format-version marker file is absent
    #[error("missing format version marker in {0}")]
    MissingFormatVersion(PathBuf),

    /// Format-version marker has an unsupported value
    #[error("unsupported format version '{found}' in {path} (supported: {supported})")]
    UnsupportedFormatVersion {
        path: PathBuf,
        found: String,
        supported: u32,
    },

    /// Metadata file could not be decoded
    #[error("invalid metadata in {path}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },

    /// Schema metadata has no name
    #[error("schema metadata in {0} has a missing or empty name")]
    MissingSchemaName(PathBuf),

    /// Code file is absent
    #[error("missing code file {0}")]
    MissingCode(PathBuf),

    /// Code file is empty
    #[error("code file {0} is empty")]
    EmptyCode(PathBuf),

    /// Function metadata gives a verb its kind does not accept
    #[error("invalid function kind in {path}: {source}")]
    InvalidFunctionKind {
        path: PathBuf,
        #[source]
        source: KindError,
    },

    /// Two functions of one schema share a name
    #[error("schema '{schema}' has more than one function named '{name}' ({kinds:?})")]
    DuplicateFunctionName {
        schema: String,
        name: String,
        kinds: Vec<FunctionKind>,
    },

    /// Two schema directories declare the same name
    #[error("schema name '{name}' is declared more than once (case-insensitive)")]
    DuplicateSchemaName { name: String },

    /// Target already exists and overwriting was not requested
    #[error("refusing to overwrite existing {0}")]
    AlreadyExists(PathBuf),

    /// Serialization of metadata failed
    #[error("failed to serialize metadata for {path}: {message}")]
    Serialize { path: PathBuf, message: String },
}

impl ScanError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create invalid metadata error for path
    pub fn invalid_metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for tree operations
pub type ScanResult<T> = Result<T, ScanError>;
