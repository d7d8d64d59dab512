//! Error types for Converge Core
//!
//! Follows a three-way taxonomy:
//! - Validation errors (bad local files, duplicate names): reported, unit skipped
//! - Resolution errors (ambiguous or unknown references): fatal before any mutation
//! - Transport/API errors: fatal, abandon the change set and propagate

use converge_api::ApiError;
use converge_model::{ComponentSummary, ModelError};
use converge_scan::ScanError;
use std::path::PathBuf;

/// Main converge error type
#[derive(Debug, thiserror::Error)]
pub enum ConvergeError {
    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Local tree could not be read or written
    #[error("schema tree error: {0}")]
    Scan(#[from] ScanError),

    /// Remote call failed
    #[error("remote error: {0}")]
    Api(#[from] ApiError),

    /// Component or subscription reference could not be resolved
    #[error("resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// Invalid attribute document or model value
    #[error("invalid input: {0}")]
    Model(#[from] ModelError),

    /// Input document could not be parsed
    #[error("invalid document {path}: {message}")]
    Document { path: PathBuf, message: String },

    /// IO error on a local file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvergeError {
    /// Whether the error must stop the whole run
    ///
    /// Validation errors concern a single schema, function, or document and
    /// are recoverable by skipping that unit. Everything else is fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Scan(ScanError::RootNotFound(_) | ScanError::Io { .. }) => true,
            Self::Scan(_) | Self::Model(_) | Self::Document { .. } => false,
            Self::Config(_) | Self::Api(_) | Self::Resolve(_) | Self::Io { .. } => true,
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create document error for path
    pub fn document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Document {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Reference resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Nothing matched the reference
    #[error("no component matches '{reference}'")]
    Unresolvable { reference: String },

    /// More than one component matched the reference
    #[error("'{reference}' matches {} components: {}", candidates.len(), candidate_names(candidates))]
    Ambiguous {
        reference: String,
        candidates: Vec<ComponentSummary>,
    },

    /// Lookup failed
    #[error("lookup of '{reference}' failed: {source}")]
    Lookup {
        reference: String,
        #[source]
        source: ApiError,
    },
}

fn candidate_names(candidates: &[ComponentSummary]) -> String {
    candidates
        .iter()
        .map(|c| format!("{} ({})", c.name, c.id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for converge operations
pub type ConvergeResult<T> = Result<T, ConvergeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use converge_model::ComponentId;

    #[test]
    fn validation_errors_are_not_fatal() {
        let err = ConvergeError::from(ScanError::MissingCode(PathBuf::from("x/schema.ts")));
        assert!(!err.is_fatal());
        assert!(!ConvergeError::document("doc.yaml", "bad").is_fatal());
    }

    #[test]
    fn transport_and_resolution_errors_are_fatal() {
        assert!(ConvergeError::from(ApiError::status(500, "POST", "/schemas", "")).is_fatal());
        let err = ConvergeError::from(ResolveError::Unresolvable {
            reference: "db".to_string(),
        });
        assert!(err.is_fatal());
        assert!(ConvergeError::from(ScanError::RootNotFound(PathBuf::from("schemas"))).is_fatal());
    }

    #[test]
    fn ambiguous_lists_candidates() {
        let err = ResolveError::Ambiguous {
            reference: "db".to_string(),
            candidates: vec![
                ComponentSummary {
                    id: ComponentId::new("1"),
                    name: "db-a".to_string(),
                    schema_name: None,
                },
                ComponentSummary {
                    id: ComponentId::new("2"),
                    name: "db-b".to_string(),
                    schema_name: None,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 components"));
        assert!(msg.contains("db-a (1)"));
    }
}
