//! On-disk layout of a schema tree
//!
//! ```text
//! schemas/
//! └── AWS__EC2__Instance/
//!     ├── .format-version          # "1"
//!     ├── schema.metadata.json     # name, category, description, link, color
//!     ├── schema.ts
//!     ├── actions/
//!     │   ├── create.ts
//!     │   └── create.metadata.json
//!     ├── qualifications/
//!     ├── codeGenerators/
//!     ├── management/
//!     └── authFuncs/
//! ```

use converge_model::{ActionKind, FunctionDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the format-version marker file
pub const FORMAT_VERSION_FILE: &str = ".format-version";

/// The only format version this crate reads and writes
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Schema metadata file name
pub const SCHEMA_METADATA_FILE: &str = "schema.metadata.json";

/// Schema code file name
pub const SCHEMA_CODE_FILE: &str = "schema.ts";

/// Suffix of function metadata sidecars
pub const METADATA_SUFFIX: &str = ".metadata.json";

/// Extensions accepted for function code files
pub const CODE_EXTENSIONS: &[&str] = &["ts", "js"];

/// Extension used when writing code files
pub const DEFAULT_CODE_EXTENSION: &str = "ts";

/// Contents of `schema.metadata.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Contents of `<name>.metadata.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Action verb, present only when the file stem does not imply it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_kind: Option<ActionKind>,
}

impl FunctionMetadata {
    /// Metadata for `function` stored under `stem`
    #[must_use]
    pub fn for_stem(function: &FunctionDefinition, stem: &str) -> Self {
        let action_kind = function
            .action_kind()
            .filter(|verb| ActionKind::from_file_stem(stem) != *verb);
        Self {
            name: Some(function.name.clone()),
            display_name: function.display_name.clone(),
            description: function.description.clone(),
            action_kind,
        }
    }
}

/// Directory name for a schema
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, so `AWS::EC2::Instance`
/// is stored as `AWS__EC2__Instance`.
#[must_use]
pub fn schema_dir_name(schema_name: &str) -> String {
    sanitize(schema_name)
}

/// Base name for a function's files
///
/// Actions with a lifecycle verb are stored under the verb so that a rescan
/// recovers it. Manual actions whose name collides with a verb get a
/// `-manual` suffix.
#[must_use]
pub fn function_file_stem(function: &FunctionDefinition) -> String {
    match function.action_kind() {
        Some(ActionKind::Manual) | None => {
            let stem = sanitize(&function.name);
            if function.action_kind() == Some(ActionKind::Manual)
                && ActionKind::from_file_stem(&stem) != ActionKind::Manual
            {
                format!("{stem}-manual")
            } else {
                stem
            }
        }
        Some(verb) => verb.as_str().to_string(),
    }
}

/// File stems already taken inside one kind directory
///
/// Comparison ignores ASCII case so trees stay distinct on case-insensitive
/// filesystems.
#[derive(Debug, Default)]
pub struct StemRegistry {
    used: HashSet<String>,
}

impl StemRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `base`, or `base-2`, `base-3`, ... if it is already taken
    pub fn claim(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 2;
        while !self.used.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        candidate
    }
}

/// Strip the metadata suffix from a file name
#[must_use]
pub fn metadata_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(METADATA_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

/// Split a code file name into stem and extension, if it is a code file
#[must_use]
pub fn code_stem(file_name: &str) -> Option<&str> {
    if metadata_stem(file_name).is_some() {
        return None;
    }
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || !CODE_EXTENSIONS.contains(&ext) {
        return None;
    }
    Some(stem)
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('.') {
        format!("_{cleaned}")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_model::{FunctionClass, FunctionKind};

    #[test]
    fn schema_dir_name_sanitizes() {
        assert_eq!(schema_dir_name("AWS::EC2::Instance"), "AWS__EC2__Instance");
        assert_eq!(schema_dir_name("my widget/v2"), "my_widget_v2");
        assert_eq!(schema_dir_name(".hidden"), "_.hidden");
    }

    #[test]
    fn stems_for_code_and_metadata() {
        assert_eq!(metadata_stem("create.metadata.json"), Some("create"));
        assert_eq!(metadata_stem(".metadata.json"), None);
        assert_eq!(code_stem("create.ts"), Some("create"));
        assert_eq!(code_stem("create.js"), Some("create"));
        assert_eq!(code_stem("create.metadata.json"), None);
        assert_eq!(code_stem("README.md"), None);
        assert_eq!(code_stem("noext"), None);
    }

    #[test]
    fn action_stems_follow_verb() {
        let create = FunctionDefinition::new(
            "Create Instance",
            FunctionClass::classify(FunctionKind::Action, "create"),
            "code",
        );
        assert_eq!(function_file_stem(&create), "create");

        let manual = FunctionDefinition::new(
            "update",
            FunctionClass::Action {
                action_kind: ActionKind::Manual,
            },
            "code",
        );
        assert_eq!(function_file_stem(&manual), "update-manual");

        let qual = FunctionDefinition::new("check ports", FunctionClass::Qualification, "code");
        assert_eq!(function_file_stem(&qual), "check_ports");
    }

    #[test]
    fn registry_suffixes_colliding_stems() {
        let mut stems = StemRegistry::new();
        assert_eq!(stems.claim("check_ports"), "check_ports");
        assert_eq!(stems.claim("check_ports"), "check_ports-2");
        assert_eq!(stems.claim("Check_Ports"), "Check_Ports-3");
        assert_eq!(stems.claim("create"), "create");
    }

    #[test]
    fn metadata_records_verb_only_when_stem_loses_it() {
        let create = FunctionDefinition::new(
            "Create Instance",
            FunctionClass::classify(FunctionKind::Action, "create"),
            "code",
        );
        assert_eq!(FunctionMetadata::for_stem(&create, "create").action_kind, None);
        assert_eq!(
            FunctionMetadata::for_stem(&create, "create-2").action_kind,
            Some(ActionKind::Create)
        );

        let qual = FunctionDefinition::new("q", FunctionClass::Qualification, "code");
        assert_eq!(FunctionMetadata::for_stem(&qual, "q-2").action_kind, None);
    }
}
