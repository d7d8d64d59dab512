//! Request and response types of the remote API
//!
//! Field names follow the remote's camelCase JSON.

use converge_model::{
    ActionKind, AttributeMap, AttributePath, AttributeValue, ChangeSetId, ComponentId,
    FunctionDefinition, FunctionKind, RemoteFunction, SchemaFields, SchemaId, VariantId,
    SOURCE_KEY,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A change set as listed by the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetSummary {
    pub id: ChangeSetId,
    pub name: String,
    /// Marks the committed state every other change set branches from
    #[serde(default)]
    pub is_head: bool,
}

/// Result of a schema lookup by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSummary {
    pub schema_id: SchemaId,
    pub schema_name: String,
}

/// Default variant of a schema with its bound functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultVariant {
    pub variant_id: VariantId,
    #[serde(default)]
    pub installed_from_upstream: bool,
    #[serde(flatten)]
    pub fields: SchemaFields,
    #[serde(default)]
    pub variant_funcs: Vec<RemoteFunction>,
}

/// Identifiers allocated for a newly created schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSchema {
    pub schema_id: SchemaId,
    pub variant_id: VariantId,
}

/// Body of a function create request
///
/// The endpoint is chosen by kind; only actions send `actionKind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFunction {
    /// Selects the endpoint; not part of the body
    #[serde(skip)]
    pub kind: FunctionKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub code: String,
    pub is_overlay: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_kind: Option<ActionKind>,
}

impl From<&FunctionDefinition> for CreateFunction {
    fn from(function: &FunctionDefinition) -> Self {
        Self {
            kind: function.kind(),
            name: function.name.clone(),
            display_name: function.display_name.clone(),
            description: function.description.clone(),
            code: function.code.clone(),
            is_overlay: function.is_overlay,
            action_kind: function.action_kind(),
        }
    }
}

/// Body of a function update request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub code: String,
}

impl From<&FunctionDefinition> for UpdateFunction {
    fn from(function: &FunctionDefinition) -> Self {
        Self {
            name: function.name.clone(),
            display_name: function.display_name.clone(),
            description: function.description.clone(),
            code: function.code.clone(),
        }
    }
}

/// A component with its current attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentView {
    pub id: ComponentId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub attributes: AttributeMap,
}

/// Body of a component update request
///
/// `attributes` maps slash paths to literals, subscriptions, or an unset
/// marker (`{"$source": null}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ComponentUpdate {
    /// Create an empty update
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename the component
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a literal or subscription at `path`
    pub fn set(&mut self, path: &AttributePath, value: &AttributeValue) {
        self.attributes.insert(path.to_string(), value.to_json());
    }

    /// Remove whatever value is at `path`
    pub fn unset(&mut self, path: &AttributePath) {
        self.attributes.insert(path.to_string(), unset_marker());
    }

    /// Check if the update changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.attributes.is_empty()
    }
}

/// Wire value that clears an attribute
#[must_use]
pub fn unset_marker() -> Value {
    let mut marker = Map::new();
    marker.insert(SOURCE_KEY.to_string(), Value::Null);
    Value::Object(marker)
}

/// Whether a wire value is the unset marker
#[must_use]
pub fn is_unset_marker(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.len() == 1 && map.get(SOURCE_KEY) == Some(&Value::Null))
}
