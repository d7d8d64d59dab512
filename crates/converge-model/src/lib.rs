//! Converge Model
//!
//! Desired and observed state for schema/function and component/attribute
//! reconciliation.
//!
//! # Core Concepts
//!
//! - [`SchemaDefinition`]: A schema read from disk, with its five [`FunctionSets`]
//! - [`FunctionClass`]: Closed tagged union over the five function kinds
//! - [`RemoteSchemaState`]: A schema as observed on the remote side
//! - [`AttributeMap`]: Flat path → value map of a component's attributes
//! - [`Subscription`]: An attribute supplied by another component
//!
//! # Example
//!
//! ```rust,ignore
//! use converge_model::{FunctionClass, FunctionDefinition, FunctionKind, SchemaDefinition, SchemaFields};
//!
//! let schema = SchemaDefinition::new(SchemaFields::new("AWS::EC2::Instance", "function main() {}"))
//!     .with_function(FunctionDefinition::new(
//!         "create",
//!         FunctionClass::classify(FunctionKind::Action, "create"),
//!         "async function main() {}",
//!     ));
//! schema.validate()?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod attribute;
mod kind;
mod path;
mod remote;
mod schema;

pub use attribute::{
    is_subscription, AttributeMap, AttributeValue, Subscription, SubscriptionSource, NAME_PATH,
    SOURCE_KEY,
};
pub use kind::{ActionKind, FunctionClass, FunctionKind, KindError};
pub use path::{AttributePath, PathError};
pub use remote::{
    ChangeSetId, ComponentId, ComponentSummary, FuncId, FunctionBody, ObservedState,
    RemoteFunction, RemoteSchemaState, SchemaId, VariantId,
};
pub use schema::{
    derive_category, optional_text_eq, DuplicateName, FunctionDefinition, FunctionSets,
    SchemaDefinition, SchemaFields,
};

/// Errors raised while building or validating model values
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Schema without a usable name
    #[error("schema name is missing or empty")]
    MissingSchemaName,

    /// Two functions of one schema share a name
    #[error("schema '{schema}' has more than one function named '{name}' ({kinds:?})")]
    DuplicateFunctionName {
        schema: String,
        name: String,
        kinds: Vec<FunctionKind>,
    },

    /// Malformed attribute path
    #[error("invalid attribute path: {0}")]
    Path(#[from] PathError),

    /// Invalid function kind or verb
    #[error("invalid function kind: {0}")]
    Kind(#[from] KindError),

    /// Subscription-shaped value that cannot be decoded
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// Malformed attribute document
    #[error("invalid attribute document: {0}")]
    InvalidDocument(String),

    /// Same path given twice in one document
    #[error("attribute path given more than once: {0}")]
    DuplicatePath(AttributePath),
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scanned_schema_validates() {
        let schema = SchemaDefinition::new(SchemaFields::new("AWS::EC2::Instance", "code"))
            .with_function(FunctionDefinition::new(
                "create",
                FunctionClass::classify(FunctionKind::Action, "create"),
                "code",
            ))
            .with_function(FunctionDefinition::new(
                "qualifyInstance",
                FunctionClass::Qualification,
                "code",
            ));

        assert!(schema.validate().is_ok());
        assert_eq!(
            derive_category(schema.name()),
            Some("AWS::EC2".to_string())
        );
    }

    #[test]
    fn attribute_document_roundtrip_through_json() {
        let map = AttributeMap::new()
            .with("/domain/a", json!(1))
            .with("/domain/b", Subscription::new("db", "/domain/host"));

        let json = serde_json::to_value(&map).unwrap();
        let back: AttributeMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }
}
