//! Local tree scanner (ingress)
//!
//! Walks a schema root and parses every schema directory into a
//! [`SchemaDefinition`]. Validation problems are collected into the
//! [`ScanReport`] and only skip the unit they concern.

use crate::error::{ScanError, ScanResult};
use crate::layout::{
    code_stem, metadata_stem, FunctionMetadata, SchemaMetadata, DEFAULT_CODE_EXTENSION,
    FORMAT_VERSION_FILE, SCHEMA_CODE_FILE, SCHEMA_METADATA_FILE, SUPPORTED_FORMAT_VERSION,
};
use converge_model::{
    derive_category, FunctionClass, FunctionDefinition, FunctionKind, ModelError,
    SchemaDefinition, SchemaFields,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A validation problem found while scanning
#[derive(Debug)]
pub struct ScanIssue {
    /// File or directory the problem concerns
    pub path: PathBuf,
    /// What went wrong
    pub error: ScanError,
}

/// Result of scanning a tree
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Schemas that passed validation, in directory order
    pub schemas: Vec<SchemaDefinition>,
    /// Problems that caused a schema or function to be skipped
    pub issues: Vec<ScanIssue>,
}

impl ScanReport {
    /// Check if any problem was reported
    #[inline]
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Find a scanned schema by case-insensitive name
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&SchemaDefinition> {
        let key = name.to_lowercase();
        self.schemas.iter().find(|s| s.key() == key)
    }
}

/// Reads a schema tree into desired state
///
/// Scanning performs no writes and no network access, and is deterministic
/// for a fixed tree: directory entries are visited in name order.
#[derive(Debug, Clone, Default)]
pub struct TreeScanner {
    /// Every function is flagged `is_overlay` and schema code is optional
    overlay: bool,
}

impl TreeScanner {
    /// Scanner for ordinary schema trees
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner for overlay trees
    #[inline]
    #[must_use]
    pub fn overlays() -> Self {
        Self { overlay: true }
    }

    /// Scan every immediate subdirectory of `root`
    ///
    /// # Errors
    /// Only fails when `root` itself cannot be listed. Everything else is
    /// reported in [`ScanReport::issues`].
    pub async fn scan(&self, root: impl AsRef<Path>) -> ScanResult<ScanReport> {
        let root = root.as_ref();
        let entries = match sorted_entries(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ScanError::RootNotFound(root.to_path_buf()))
            }
            Err(e) => return Err(ScanError::io_error(root, e)),
        };

        let mut report = ScanReport::default();
        for entry in entries.into_iter().filter(|e| e.is_dir) {
            match self.scan_schema_dir(&entry.path, &mut report.issues).await {
                Ok(schema) => {
                    tracing::debug!(
                        schema = %schema.name(),
                        functions = schema.functions.len(),
                        "scanned schema"
                    );
                    report.schemas.push(schema);
                }
                Err(error) => report_issue(&mut report.issues, entry.path, error),
            }
        }

        drop_duplicate_schema_names(&mut report);
        tracing::info!(
            root = %root.display(),
            schemas = report.schemas.len(),
            issues = report.issues.len(),
            "scan complete"
        );
        Ok(report)
    }

    /// Scan a single schema directory
    ///
    /// Function-level problems are pushed onto `issues` and the function is
    /// left out; schema-level problems are returned as the error.
    ///
    /// # Errors
    /// Unsupported or missing format version, unreadable or nameless
    /// metadata, missing schema code, or duplicate function names.
    pub async fn scan_schema_dir(
        &self,
        dir: &Path,
        issues: &mut Vec<ScanIssue>,
    ) -> ScanResult<SchemaDefinition> {
        check_format_version(dir).await?;

        let mut schema = SchemaDefinition::new(self.read_schema_fields(dir).await?);
        schema.source_dir = Some(dir.to_path_buf());

        for kind in FunctionKind::ALL {
            for function in self.scan_functions(dir, kind, issues).await {
                schema.functions.push(function);
            }
        }

        schema.validate().map_err(|e| match e {
            ModelError::DuplicateFunctionName {
                schema,
                name,
                kinds,
            } => ScanError::DuplicateFunctionName {
                schema,
                name,
                kinds,
            },
            _ => ScanError::MissingSchemaName(dir.join(SCHEMA_METADATA_FILE)),
        })?;

        Ok(schema)
    }

    async fn read_schema_fields(&self, dir: &Path) -> ScanResult<SchemaFields> {
        let metadata_path = dir.join(SCHEMA_METADATA_FILE);
        let raw = read_optional(&metadata_path)
            .await?
            .ok_or_else(|| ScanError::MissingSchemaName(metadata_path.clone()))?;
        let metadata: SchemaMetadata = serde_json::from_str(&raw)
            .map_err(|e| ScanError::invalid_metadata(&metadata_path, e.to_string()))?;

        let name = metadata.name.trim().to_string();
        if name.is_empty() {
            return Err(ScanError::MissingSchemaName(metadata_path));
        }

        let code_path = dir.join(SCHEMA_CODE_FILE);
        let code = match read_optional(&code_path).await? {
            Some(code) if !code.trim().is_empty() => code,
            Some(_) if !self.overlay => return Err(ScanError::EmptyCode(code_path)),
            None if !self.overlay => return Err(ScanError::MissingCode(code_path)),
            _ => String::new(),
        };

        let category = metadata
            .category
            .filter(|c| !c.trim().is_empty())
            .or_else(|| derive_category(&name));

        Ok(SchemaFields {
            name,
            category,
            description: metadata.description,
            link: metadata.link,
            color: metadata.color,
            code,
        })
    }

    async fn scan_functions(
        &self,
        schema_dir: &Path,
        kind: FunctionKind,
        issues: &mut Vec<ScanIssue>,
    ) -> Vec<FunctionDefinition> {
        let dir = schema_dir.join(kind.directory());
        let entries = match sorted_entries(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                report_issue(issues, dir.clone(), ScanError::io_error(&dir, e));
                return Vec::new();
            }
        };

        let mut code_files: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut metadata_files: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in entries.into_iter().filter(|e| !e.is_dir) {
            if let Some(stem) = metadata_stem(&entry.name) {
                metadata_files.insert(stem.to_string(), entry.path);
            } else if let Some(stem) = code_stem(&entry.name) {
                if code_files.contains_key(stem) {
                    tracing::debug!(path = %entry.path.display(), "ignoring second code file for function");
                    continue;
                }
                code_files.insert(stem.to_string(), entry.path);
            } else {
                tracing::trace!(path = %entry.path.display(), "ignoring non-function file");
            }
        }

        let stems: BTreeSet<&String> = code_files.keys().chain(metadata_files.keys()).collect();
        let mut functions = Vec::with_capacity(stems.len());
        for stem in stems {
            match self
                .read_function(kind, stem, code_files.get(stem), metadata_files.get(stem), &dir)
                .await
            {
                Ok(function) => functions.push(function),
                Err(error) => {
                    let path = code_files
                        .get(stem)
                        .or_else(|| metadata_files.get(stem))
                        .cloned()
                        .unwrap_or_else(|| dir.clone());
                    report_issue(issues, path, error);
                }
            }
        }
        functions
    }

    async fn read_function(
        &self,
        kind: FunctionKind,
        stem: &str,
        code_path: Option<&PathBuf>,
        metadata_path: Option<&PathBuf>,
        dir: &Path,
    ) -> ScanResult<FunctionDefinition> {
        let Some(code_path) = code_path else {
            return Err(ScanError::MissingCode(
                dir.join(format!("{stem}.{DEFAULT_CODE_EXTENSION}")),
            ));
        };
        let code = tokio::fs::read_to_string(code_path)
            .await
            .map_err(|e| ScanError::io_error(code_path, e))?;
        if code.trim().is_empty() {
            return Err(ScanError::EmptyCode(code_path.clone()));
        }

        let metadata = match metadata_path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| ScanError::io_error(path, e))?;
                serde_json::from_str::<FunctionMetadata>(&raw)
                    .map_err(|e| ScanError::invalid_metadata(path, e.to_string()))?
            }
            None => FunctionMetadata::default(),
        };

        // A verb in the sidecar wins over the one implied by the file stem.
        let class = match metadata.action_kind {
            Some(verb) => FunctionClass::from_parts(kind, Some(verb)).map_err(|source| {
                ScanError::InvalidFunctionKind {
                    path: metadata_path.cloned().unwrap_or_else(|| code_path.clone()),
                    source,
                }
            })?,
            None => FunctionClass::classify(kind, stem),
        };

        let name = metadata
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| stem.to_string());

        Ok(FunctionDefinition {
            name,
            display_name: metadata.display_name,
            description: metadata.description,
            code,
            class,
            is_overlay: self.overlay,
        })
    }
}

async fn check_format_version(dir: &Path) -> ScanResult<()> {
    let path = dir.join(FORMAT_VERSION_FILE);
    let raw = read_optional(&path)
        .await?
        .ok_or_else(|| ScanError::MissingFormatVersion(dir.to_path_buf()))?;
    let found = raw.trim();
    match found.parse::<u32>() {
        Ok(version) if version == SUPPORTED_FORMAT_VERSION => Ok(()),
        _ => Err(ScanError::UnsupportedFormatVersion {
            path,
            found: found.to_string(),
            supported: SUPPORTED_FORMAT_VERSION,
        }),
    }
}

fn drop_duplicate_schema_names(report: &mut ScanReport) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for schema in &report.schemas {
        *counts.entry(schema.key()).or_default() += 1;
    }

    let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut report.schemas)
        .into_iter()
        .partition(|s| counts.get(&s.key()).copied().unwrap_or(0) <= 1);

    report.schemas = kept;
    for schema in dropped {
        let path = schema.source_dir.clone().unwrap_or_default();
        report_issue(
            &mut report.issues,
            path,
            ScanError::DuplicateSchemaName {
                name: schema.fields.name,
            },
        );
    }
}

fn report_issue(issues: &mut Vec<ScanIssue>, path: PathBuf, error: ScanError) {
    tracing::warn!(path = %path.display(), error = %error, "skipping invalid entry");
    issues.push(ScanIssue { path, error });
}

struct DirEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

async fn sorted_entries(dir: &Path) -> std::io::Result<Vec<DirEntry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().await?.is_dir();
        entries.push(DirEntry {
            name,
            path: entry.path(),
            is_dir,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

async fn read_optional(path: &Path) -> ScanResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScanError::io_error(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_model::ActionKind;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn schema_dir(root: &Path, dir: &str, name: &str) -> PathBuf {
        let path = root.join(dir);
        write(&path.join(FORMAT_VERSION_FILE), "1\n");
        write(
            &path.join(SCHEMA_METADATA_FILE),
            &format!(r#"{{"name": "{name}"}}"#),
        );
        write(&path.join(SCHEMA_CODE_FILE), "function main() {}");
        path
    }

    #[tokio::test]
    async fn missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let result = TreeScanner::new().scan(tmp.path().join("nope")).await;
        assert!(matches!(result, Err(ScanError::RootNotFound(_))));
    }

    #[tokio::test]
    async fn missing_function_directories_yield_empty_sets() {
        let tmp = TempDir::new().unwrap();
        schema_dir(tmp.path(), "widget", "Widget");

        let report = TreeScanner::new().scan(tmp.path()).await.unwrap();
        assert!(!report.has_issues());
        assert_eq!(report.schemas.len(), 1);
        assert!(report.schemas[0].functions.is_empty());
    }

    #[tokio::test]
    async fn category_derived_from_namespaced_name() {
        let tmp = TempDir::new().unwrap();
        schema_dir(tmp.path(), "instance", "AWS::EC2::Instance");
        schema_dir(tmp.path(), "plain", "Plain");

        let report = TreeScanner::new().scan(tmp.path()).await.unwrap();
        let instance = report.schema("aws::ec2::instance").unwrap();
        assert_eq!(instance.fields.category.as_deref(), Some("AWS::EC2"));
        assert_eq!(report.schema("Plain").unwrap().fields.category, None);
    }

    #[tokio::test]
    async fn function_without_code_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let dir = schema_dir(tmp.path(), "widget", "Widget");
        write(
            &dir.join("qualifications/orphan.metadata.json"),
            r#"{"name": "orphan"}"#,
        );
        write(&dir.join("qualifications/blank.ts"), "   \n");
        write(&dir.join("qualifications/good.ts"), "function main() {}");

        let report = TreeScanner::new().scan(tmp.path()).await.unwrap();
        assert_eq!(report.schemas.len(), 1);
        let names: Vec<_> = report.schemas[0]
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["good"]);
        assert_eq!(report.issues.len(), 2);
    }

    #[tokio::test]
    async fn sidecar_verb_overrides_file_stem() {
        let tmp = TempDir::new().unwrap();
        let dir = schema_dir(tmp.path(), "widget", "Widget");
        write(&dir.join("actions/create-2.ts"), "function main() {}");
        write(
            &dir.join("actions/create-2.metadata.json"),
            r#"{"name": "Create Again", "actionKind": "create"}"#,
        );
        write(&dir.join("qualifications/q.ts"), "function main() {}");
        write(
            &dir.join("qualifications/q.metadata.json"),
            r#"{"actionKind": "destroy"}"#,
        );

        let report = TreeScanner::new().scan(tmp.path()).await.unwrap();
        let schema = &report.schemas[0];
        let action = &schema.functions.actions[0];
        assert_eq!(action.name, "Create Again");
        assert_eq!(action.action_kind(), Some(ActionKind::Create));

        assert!(schema.functions.qualifications.is_empty());
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            report.issues[0].error,
            ScanError::InvalidFunctionKind { .. }
        ));
    }

    #[tokio::test]
    async fn overlay_mode_flags_functions_and_allows_missing_code() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("widget");
        write(&dir.join(FORMAT_VERSION_FILE), "1");
        write(&dir.join(SCHEMA_METADATA_FILE), r#"{"name": "Widget"}"#);
        write(&dir.join("management/fix.ts"), "function main() {}");

        let report = TreeScanner::overlays().scan(tmp.path()).await.unwrap();
        assert!(!report.has_issues());
        let schema = &report.schemas[0];
        assert!(schema.fields.code.is_empty());
        assert!(schema.functions.iter().all(|f| f.is_overlay));
    }
}
