//! Overlay scaffolding
//!
//! Creates the files for a new overlay function under the overlays root,
//! adding the schema directory and its metadata when they do not exist yet.

use crate::error::{ScanError, ScanResult};
use crate::layout::{
    function_file_stem, schema_dir_name, SchemaMetadata, DEFAULT_CODE_EXTENSION,
    FORMAT_VERSION_FILE, METADATA_SUFFIX, SCHEMA_METADATA_FILE, SUPPORTED_FORMAT_VERSION,
};
use crate::writer::{create_dir, path_exists, write_file, write_function, write_json};
use converge_model::{FunctionClass, FunctionDefinition, FunctionKind};
use std::path::{Path, PathBuf};

/// Files created by [`scaffold_overlay`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayScaffold {
    /// Schema directory under the overlays root
    pub schema_dir: PathBuf,
    /// Generated code file
    pub code_path: PathBuf,
    /// Whether the schema directory was created by this call
    pub created_schema: bool,
}

/// Starting code for a new function of `class`
#[must_use]
pub fn template(class: &FunctionClass) -> &'static str {
    match class {
        FunctionClass::Action { .. } => {
            "async function main(component: Input): Promise<Output> {\n  return {\n    status: \"ok\",\n    payload: component.properties.resource?.payload,\n  };\n}\n"
        }
        FunctionClass::Qualification => {
            "async function main(component: Input): Promise<Output> {\n  return {\n    result: \"success\",\n    message: \"Component qualified\",\n  };\n}\n"
        }
        FunctionClass::CodeGeneration => {
            "async function main(component: Input): Promise<Output> {\n  return {\n    format: \"json\",\n    code: JSON.stringify(component.domain, null, 2),\n  };\n}\n"
        }
        FunctionClass::Management => {
            "async function main({ thisComponent, components }: Input): Promise<Output> {\n  return {\n    status: \"ok\",\n    ops: {},\n  };\n}\n"
        }
        FunctionClass::Authentication => {
            "async function main(secret: Input): Promise<Output> {\n  requestStorage.setEnv(\"TOKEN\", secret.token);\n}\n"
        }
    }
}

/// Scaffold an overlay function for `schema_name`
///
/// For actions the verb is taken from `function_name` the same way the
/// scanner takes it from a file stem.
///
/// # Errors
/// [`ScanError::AlreadyExists`] when the function's code or metadata file
/// already exists; IO errors otherwise.
pub async fn scaffold_overlay(
    overlays_root: &Path,
    schema_name: &str,
    kind: FunctionKind,
    function_name: &str,
) -> ScanResult<OverlayScaffold> {
    let class = FunctionClass::classify(kind, function_name);
    let function = FunctionDefinition::new(function_name, class, template(&class)).overlay();

    let schema_dir = overlays_root.join(schema_dir_name(schema_name));
    let kind_dir = schema_dir.join(kind.directory());
    let stem = function_file_stem(&function);
    for existing in [
        kind_dir.join(format!("{stem}.{DEFAULT_CODE_EXTENSION}")),
        kind_dir.join(format!("{stem}{METADATA_SUFFIX}")),
    ] {
        if path_exists(&existing).await? {
            return Err(ScanError::AlreadyExists(existing));
        }
    }

    let created_schema = !path_exists(&schema_dir.join(SCHEMA_METADATA_FILE)).await?;
    if created_schema {
        create_dir(&schema_dir).await?;
        write_json(
            &schema_dir.join(SCHEMA_METADATA_FILE),
            &SchemaMetadata {
                name: schema_name.to_string(),
                ..SchemaMetadata::default()
            },
        )
        .await?;
    }
    let version_path = schema_dir.join(FORMAT_VERSION_FILE);
    if !path_exists(&version_path).await? {
        write_file(&version_path, &format!("{SUPPORTED_FORMAT_VERSION}\n")).await?;
    }

    let code_path = write_function(&schema_dir, &function, &stem).await?;
    tracing::info!(
        schema = %schema_name,
        kind = %kind,
        path = %code_path.display(),
        "scaffolded overlay function"
    );

    Ok(OverlayScaffold {
        schema_dir,
        code_path,
        created_schema,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeScanner;
    use converge_model::ActionKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn scaffold_is_scannable_overlay() {
        let tmp = TempDir::new().unwrap();
        let out = scaffold_overlay(tmp.path(), "AWS::EC2::Instance", FunctionKind::Action, "refresh")
            .await
            .unwrap();
        assert!(out.created_schema);
        assert!(out.code_path.ends_with("actions/refresh.ts"));

        let report = TreeScanner::overlays().scan(tmp.path()).await.unwrap();
        assert!(!report.has_issues(), "{:?}", report.issues);
        let schema = report.schema("AWS::EC2::Instance").unwrap();
        let function = schema.functions.iter().next().unwrap();
        assert!(function.is_overlay);
        assert_eq!(function.action_kind(), Some(ActionKind::Refresh));
    }

    #[tokio::test]
    async fn second_function_reuses_schema_dir() {
        let tmp = TempDir::new().unwrap();
        scaffold_overlay(tmp.path(), "Widget", FunctionKind::Qualification, "ports")
            .await
            .unwrap();
        let out = scaffold_overlay(tmp.path(), "Widget", FunctionKind::Management, "import")
            .await
            .unwrap();
        assert!(!out.created_schema);
    }

    #[tokio::test]
    async fn refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        scaffold_overlay(tmp.path(), "Widget", FunctionKind::Qualification, "ports")
            .await
            .unwrap();
        let err = scaffold_overlay(tmp.path(), "Widget", FunctionKind::Qualification, "ports")
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::AlreadyExists(_)));
    }
}
