//! Tree writer (egress)
//!
//! Writes schema definitions back to disk in the layout the scanner reads,
//! so a written schema rescans to an equal definition.

use crate::error::{ScanError, ScanResult};
use crate::layout::{
    function_file_stem, schema_dir_name, FunctionMetadata, SchemaMetadata, StemRegistry,
    DEFAULT_CODE_EXTENSION, FORMAT_VERSION_FILE, METADATA_SUFFIX, SCHEMA_CODE_FILE,
    SCHEMA_METADATA_FILE, SUPPORTED_FORMAT_VERSION,
};
use converge_model::{FunctionDefinition, FunctionKind, SchemaDefinition, SchemaFields};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Writes schemas under a root directory
#[derive(Debug, Clone)]
pub struct TreeWriter {
    root: PathBuf,
    force: bool,
}

impl TreeWriter {
    /// Create a writer rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            force: false,
        }
    }

    /// Replace existing schema directories instead of refusing
    #[inline]
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a schema would be written to
    #[must_use]
    pub fn schema_path(&self, schema_name: &str) -> PathBuf {
        self.root.join(schema_dir_name(schema_name))
    }

    /// Write one schema and all its functions
    ///
    /// Returns the directory written.
    ///
    /// # Errors
    /// [`ScanError::AlreadyExists`] when the directory exists and force is
    /// off; IO or serialization errors otherwise.
    pub async fn write_schema(&self, schema: &SchemaDefinition) -> ScanResult<PathBuf> {
        let dir = self.schema_path(schema.name());
        if path_exists(&dir).await? {
            if !self.force {
                return Err(ScanError::AlreadyExists(dir));
            }
            tracing::debug!(path = %dir.display(), "removing existing schema directory");
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| ScanError::io_error(&dir, e))?;
        }

        create_dir(&dir).await?;
        write_file(
            &dir.join(FORMAT_VERSION_FILE),
            &format!("{SUPPORTED_FORMAT_VERSION}\n"),
        )
        .await?;
        write_json(&dir.join(SCHEMA_METADATA_FILE), &schema_metadata(&schema.fields)).await?;
        write_file(&dir.join(SCHEMA_CODE_FILE), &schema.fields.code).await?;

        for kind in FunctionKind::ALL {
            let mut stems = StemRegistry::new();
            for function in schema.functions.set(kind) {
                let stem = stems.claim(&function_file_stem(function));
                write_function(&dir, function, &stem).await?;
            }
        }

        tracing::info!(
            schema = %schema.name(),
            path = %dir.display(),
            functions = schema.functions.len(),
            "wrote schema"
        );
        Ok(dir)
    }
}

/// Write a function's code and metadata files into its kind directory
///
/// Returns the code file path.
pub(crate) async fn write_function(
    schema_dir: &Path,
    function: &FunctionDefinition,
    stem: &str,
) -> ScanResult<PathBuf> {
    let kind_dir = schema_dir.join(function.kind().directory());
    create_dir(&kind_dir).await?;

    let code_path = kind_dir.join(format!("{stem}.{DEFAULT_CODE_EXTENSION}"));
    write_file(&code_path, &function.code).await?;
    write_json(
        &kind_dir.join(format!("{stem}{METADATA_SUFFIX}")),
        &FunctionMetadata::for_stem(function, stem),
    )
    .await?;
    Ok(code_path)
}

fn schema_metadata(fields: &SchemaFields) -> SchemaMetadata {
    SchemaMetadata {
        name: fields.name.clone(),
        category: fields.category.clone(),
        description: fields.description.clone(),
        link: fields.link.clone(),
        color: fields.color.clone(),
    }
}

pub(crate) async fn path_exists(path: &Path) -> ScanResult<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ScanError::io_error(path, e)),
    }
}

pub(crate) async fn create_dir(path: &Path) -> ScanResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| ScanError::io_error(path, e))
}

pub(crate) async fn write_file(path: &Path, content: &str) -> ScanResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ScanError::io_error(path, e))
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> ScanResult<()> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| ScanError::Serialize {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    json.push('\n');
    write_file(path, &json).await
}
