//! Desired schema and function definitions
//!
//! These are produced by the local tree scanner and consumed by the planner.

use crate::kind::{ActionKind, FunctionClass, FunctionKind};
use crate::remote::FunctionBody;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Compare two optional text fields, treating absent and empty as equal
#[inline]
#[must_use]
pub fn optional_text_eq(a: Option<&str>, b: Option<&str>) -> bool {
    a.filter(|s| !s.is_empty()) == b.filter(|s| !s.is_empty())
}

/// Derive a category from a `Namespace::Namespace::Leaf` shaped name
///
/// Returns the first two segments joined by `::`, or `None` when the name has
/// fewer than three non-empty segments.
#[must_use]
pub fn derive_category(name: &str) -> Option<String> {
    let segments: Vec<&str> = name.split("::").collect();
    if segments.len() < 3 || segments.iter().any(|s| s.trim().is_empty()) {
        return None;
    }
    Some(format!("{}::{}", segments[0], segments[1]))
}

/// The schema's own fields (everything except its functions)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Opaque definition body
    #[serde(default)]
    pub code: String,
}

impl SchemaFields {
    /// Create fields with a name and code
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            ..Self::default()
        }
    }

    /// Field-wise inequality check
    ///
    /// Optional fields treat absent, null and empty as equivalent.
    #[must_use]
    pub fn differs_from(&self, other: &SchemaFields) -> bool {
        self.name != other.name
            || self.code != other.code
            || !optional_text_eq(self.category.as_deref(), other.category.as_deref())
            || !optional_text_eq(self.description.as_deref(), other.description.as_deref())
            || !optional_text_eq(self.link.as_deref(), other.link.as_deref())
            || !optional_text_eq(self.color.as_deref(), other.color.as_deref())
    }
}

/// A function definition read from disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub code: String,
    pub class: FunctionClass,
    /// Customization of a builtin schema rather than a user function
    #[serde(default)]
    pub is_overlay: bool,
}

impl FunctionDefinition {
    /// Create a non-overlay function with no display name or description
    #[must_use]
    pub fn new(name: impl Into<String>, class: FunctionClass, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            code: code.into(),
            class,
            is_overlay: false,
        }
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark as overlay
    #[inline]
    #[must_use]
    pub fn overlay(mut self) -> Self {
        self.is_overlay = true;
        self
    }

    /// Function kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FunctionKind {
        self.class.kind()
    }

    /// Action verb (actions only)
    #[inline]
    #[must_use]
    pub fn action_kind(&self) -> Option<ActionKind> {
        self.class.action_kind()
    }

    /// Whether the remote body differs in any compared field
    ///
    /// Compared fields: `name`, `displayName`, `code`, `description`.
    #[must_use]
    pub fn differs_from(&self, body: &FunctionBody) -> bool {
        self.name != body.name
            || self.code != body.code
            || !optional_text_eq(self.display_name.as_deref(), body.display_name.as_deref())
            || !optional_text_eq(self.description.as_deref(), body.description.as_deref())
    }
}

/// The five named function sets of a schema
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSets {
    pub actions: Vec<FunctionDefinition>,
    pub qualifications: Vec<FunctionDefinition>,
    pub code_generators: Vec<FunctionDefinition>,
    pub management_funcs: Vec<FunctionDefinition>,
    pub auth_funcs: Vec<FunctionDefinition>,
}

impl FunctionSets {
    /// Create empty sets
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The set holding functions of `kind`
    #[must_use]
    pub fn set(&self, kind: FunctionKind) -> &[FunctionDefinition] {
        match kind {
            FunctionKind::Action => &self.actions,
            FunctionKind::Qualification => &self.qualifications,
            FunctionKind::CodeGeneration => &self.code_generators,
            FunctionKind::Management => &self.management_funcs,
            FunctionKind::Authentication => &self.auth_funcs,
        }
    }

    fn set_mut(&mut self, kind: FunctionKind) -> &mut Vec<FunctionDefinition> {
        match kind {
            FunctionKind::Action => &mut self.actions,
            FunctionKind::Qualification => &mut self.qualifications,
            FunctionKind::CodeGeneration => &mut self.code_generators,
            FunctionKind::Management => &mut self.management_funcs,
            FunctionKind::Authentication => &mut self.auth_funcs,
        }
    }

    /// Add a function to the set matching its kind
    pub fn push(&mut self, function: FunctionDefinition) {
        self.set_mut(function.kind()).push(function);
    }

    /// Iterate all functions in kind order
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDefinition> {
        FunctionKind::ALL.into_iter().flat_map(|k| self.set(k).iter())
    }

    /// Total number of functions across all sets
    #[must_use]
    pub fn len(&self) -> usize {
        FunctionKind::ALL.iter().map(|k| self.set(*k).len()).sum()
    }

    /// Check if every set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names used by more than one function, with the kinds using them
    ///
    /// Checks across all five sets.
    #[must_use]
    pub fn duplicate_names(&self) -> Vec<DuplicateName> {
        let mut seen: BTreeMap<&str, Vec<FunctionKind>> = BTreeMap::new();
        for function in self.iter() {
            seen.entry(function.name.as_str())
                .or_default()
                .push(function.kind());
        }
        seen.into_iter()
            .filter(|(_, kinds)| kinds.len() > 1)
            .map(|(name, kinds)| DuplicateName {
                name: name.to_string(),
                kinds,
            })
            .collect()
    }
}

/// A function name shared by several functions of one schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateName {
    pub name: String,
    pub kinds: Vec<FunctionKind>,
}

/// A schema as described on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    pub fields: SchemaFields,
    pub functions: FunctionSets,
    /// Directory the definition was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
}

impl SchemaDefinition {
    /// Create a schema with no functions
    #[inline]
    #[must_use]
    pub fn new(fields: SchemaFields) -> Self {
        Self {
            fields,
            functions: FunctionSets::new(),
            source_dir: None,
        }
    }

    /// Add a function
    #[inline]
    #[must_use]
    pub fn with_function(mut self, function: FunctionDefinition) -> Self {
        self.functions.push(function);
        self
    }

    /// Schema name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.fields.name
    }

    /// Case-insensitive identity key
    #[inline]
    #[must_use]
    pub fn key(&self) -> String {
        self.fields.name.to_lowercase()
    }

    /// Reject schemas where two functions share a name
    ///
    /// # Errors
    /// Returns [`crate::ModelError::DuplicateFunctionName`] for the first
    /// shared name found.
    pub fn validate(&self) -> Result<(), crate::ModelError> {
        if self.fields.name.trim().is_empty() {
            return Err(crate::ModelError::MissingSchemaName);
        }
        if let Some(dup) = self.functions.duplicate_names().into_iter().next() {
            return Err(crate::ModelError::DuplicateFunctionName {
                schema: self.fields.name.clone(),
                name: dup.name,
                kinds: dup.kinds,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelError;
    use pretty_assertions::assert_eq;

    fn qualification(name: &str) -> FunctionDefinition {
        FunctionDefinition::new(name, FunctionClass::Qualification, "fn main() {}")
    }

    #[test]
    fn derive_category_from_namespaced_name() {
        assert_eq!(derive_category("AWS::EC2::Instance"), Some("AWS::EC2".to_string()));
        assert_eq!(derive_category("AWS::EC2::Instance::Extra"), Some("AWS::EC2".to_string()));
        assert_eq!(derive_category("AWS::EC2"), None);
        assert_eq!(derive_category("Widget"), None);
        assert_eq!(derive_category("AWS::::Instance"), None);
    }

    #[test]
    fn optional_text_treats_empty_as_absent() {
        assert!(optional_text_eq(None, Some("")));
        assert!(optional_text_eq(Some(""), None));
        assert!(optional_text_eq(Some("x"), Some("x")));
        assert!(!optional_text_eq(Some("x"), None));
    }

    #[test]
    fn schema_fields_differs_from() {
        let mut a = SchemaFields::new("Widget", "code");
        let mut b = a.clone();
        b.description = Some(String::new());
        assert!(!a.differs_from(&b));

        b.code = "other".to_string();
        assert!(a.differs_from(&b));

        a.code = "other".to_string();
        a.color = Some("#ff0000".to_string());
        assert!(a.differs_from(&b));
    }

    #[test]
    fn function_sets_route_by_kind() {
        let mut sets = FunctionSets::new();
        sets.push(qualification("q"));
        sets.push(FunctionDefinition::new(
            "create",
            FunctionClass::classify(FunctionKind::Action, "create"),
            "code",
        ));

        assert_eq!(sets.set(FunctionKind::Qualification).len(), 1);
        assert_eq!(sets.set(FunctionKind::Action).len(), 1);
        assert_eq!(sets.len(), 2);
        let names: Vec<_> = sets.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["create", "q"]);
    }

    #[test]
    fn duplicate_names_across_kinds() {
        let schema = SchemaDefinition::new(SchemaFields::new("Widget", "code"))
            .with_function(qualification("check"))
            .with_function(FunctionDefinition::new(
                "check",
                FunctionClass::Management,
                "code",
            ));

        let dups = schema.functions.duplicate_names();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].name, "check");

        let err = schema.validate().unwrap_err();
        assert!(matches!(err, ModelError::DuplicateFunctionName { .. }));
    }

    #[test]
    fn validate_requires_name() {
        let schema = SchemaDefinition::new(SchemaFields::new("  ", "code"));
        assert!(matches!(schema.validate(), Err(ModelError::MissingSchemaName)));
    }

    #[test]
    fn key_is_case_insensitive() {
        let a = SchemaDefinition::new(SchemaFields::new("Widget", ""));
        let b = SchemaDefinition::new(SchemaFields::new("WIDGET", ""));
        assert_eq!(a.key(), b.key());
    }
}
