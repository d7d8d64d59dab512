//! Observed remote state
//!
//! Identifiers are opaque strings allocated by the remote service.

use crate::kind::{ActionKind, FunctionKind};
use crate::schema::SchemaFields;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

macro_rules! remote_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from any string-like value
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow as `&str`
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

remote_id!(
    /// Remote schema identifier
    SchemaId
);
remote_id!(
    /// Remote schema variant identifier
    VariantId
);
remote_id!(
    /// Remote function identifier
    FuncId
);
remote_id!(
    /// Server-side change-set identifier
    ChangeSetId
);
remote_id!(
    /// Remote component identifier
    ComponentId
);

/// A function bound to a remote schema variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFunction {
    pub func_id: FuncId,
    pub name: String,
    pub kind: FunctionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_kind: Option<ActionKind>,
    #[serde(default)]
    pub is_overlay: bool,
}

/// Full body of a remote function, fetched for content comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionBody {
    pub func_id: FuncId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub code: String,
    pub kind: FunctionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_kind: Option<ActionKind>,
    #[serde(default)]
    pub is_overlay: bool,
}

/// A schema as observed on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSchemaState {
    pub schema_id: SchemaId,
    /// Default variant
    pub variant_id: VariantId,
    /// Builtin, installed from the upstream catalog
    pub installed_from_upstream: bool,
    /// Current variant fields
    pub fields: SchemaFields,
    /// Functions bound to the default variant
    pub bound: Vec<RemoteFunction>,
    /// Bodies of bound functions, keyed by function id
    pub bodies: HashMap<FuncId, FunctionBody>,
}

impl RemoteSchemaState {
    /// Create state with no bound functions
    #[must_use]
    pub fn new(schema_id: SchemaId, variant_id: VariantId, fields: SchemaFields) -> Self {
        Self {
            schema_id,
            variant_id,
            installed_from_upstream: false,
            fields,
            bound: Vec::new(),
            bodies: HashMap::new(),
        }
    }

    /// Mark as builtin
    #[inline]
    #[must_use]
    pub fn builtin(mut self) -> Self {
        self.installed_from_upstream = true;
        self
    }

    /// Bind a function together with its body
    #[must_use]
    pub fn with_function(mut self, body: FunctionBody) -> Self {
        self.bound.push(RemoteFunction {
            func_id: body.func_id.clone(),
            name: body.name.clone(),
            kind: body.kind,
            action_kind: body.action_kind,
            is_overlay: body.is_overlay,
        });
        self.bodies.insert(body.func_id.clone(), body);
        self
    }

    /// Body of a bound function, if fetched
    #[inline]
    #[must_use]
    pub fn body(&self, func_id: &FuncId) -> Option<&FunctionBody> {
        self.bodies.get(func_id)
    }
}

/// Observed state for a set of schema names
///
/// A name missing from the map was looked up and not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    schemas: HashMap<String, RemoteSchemaState>,
}

impl ObservedState {
    /// Create empty observed state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a found schema under its case-insensitive name
    pub fn insert(&mut self, name: &str, state: RemoteSchemaState) {
        self.schemas.insert(name.to_lowercase(), state);
    }

    /// With a found schema
    #[inline]
    #[must_use]
    pub fn with(mut self, name: &str, state: RemoteSchemaState) -> Self {
        self.insert(name, state);
        self
    }

    /// Look up a schema by case-insensitive name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RemoteSchemaState> {
        self.schemas.get(&name.to_lowercase())
    }

    /// Number of found schemas
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if nothing was found
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Summary of a remote component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub id: ComponentId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(id: &str, name: &str) -> FunctionBody {
        FunctionBody {
            func_id: FuncId::new(id),
            name: name.to_string(),
            display_name: None,
            description: None,
            code: "code".to_string(),
            kind: FunctionKind::Qualification,
            action_kind: None,
            is_overlay: false,
        }
    }

    #[test]
    fn with_function_binds_and_stores_body() {
        let state = RemoteSchemaState::new(
            SchemaId::new("s1"),
            VariantId::new("v1"),
            SchemaFields::new("Widget", "code"),
        )
        .with_function(body("f1", "check"));

        assert_eq!(state.bound.len(), 1);
        assert_eq!(state.bound[0].name, "check");
        assert!(state.body(&FuncId::new("f1")).is_some());
        assert!(!state.installed_from_upstream);
    }

    #[test]
    fn observed_state_lookup_is_case_insensitive() {
        let state = RemoteSchemaState::new(
            SchemaId::new("s1"),
            VariantId::new("v1"),
            SchemaFields::new("Widget", "code"),
        );
        let observed = ObservedState::new().with("Widget", state);
        assert!(observed.get("widget").is_some());
        assert!(observed.get("WIDGET").is_some());
        assert!(observed.get("Gadget").is_none());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = FuncId::new("01HZX");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"01HZX\"");
        assert_eq!(id.to_string(), "01HZX");
    }
}
